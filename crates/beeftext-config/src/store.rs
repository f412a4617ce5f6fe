//! Preferences store
//!
//! Holds the current preferences as an immutable snapshot. Every write goes to
//! disk and then swaps the snapshot, so readers on the keystroke path only
//! clone an `Arc` and never touch the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::model::{LogLevel, Preferences};
use crate::parser::parse_preferences;
use crate::paths;
use crate::writer::write_preferences;

/// Keys accepted by [`PreferencesStore::set_field`].
pub const PREFERENCE_KEYS: &[&str] = &[
    "substitution.automatic",
    "substitution.use-clipboard",
    "substitution.trigger-shortcut",
    "substitution.paste-shortcut",
    "substitution.keystroke-delay-ms",
    "substitution.clipboard-restore-delay-ms",
    "combo-list.folder",
    "combo-list.auto-backup",
    "combo-list.last-import-export-path",
    "input.keyboards",
    "application.log-level",
];

#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    current: Arc<Preferences>,
}

impl PreferencesStore {
    /// Load the store from `path`. A missing file gives the defaults and is
    /// not created until the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let prefs = parse_preferences(&path)?;
        Ok(Self {
            path,
            current: Arc::new(prefs),
        })
    }

    /// Store backed by a file, starting from the given values.
    pub fn with_preferences(path: impl Into<PathBuf>, prefs: Preferences) -> Self {
        Self {
            path: path.into(),
            current: Arc::new(prefs),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot.
    pub fn get(&self) -> Arc<Preferences> {
        Arc::clone(&self.current)
    }

    /// Re-read the file, replacing the snapshot.
    pub fn reload(&mut self) -> Result<Arc<Preferences>, ConfigError> {
        self.current = Arc::new(parse_preferences(&self.path)?);
        Ok(self.get())
    }

    /// Apply `edit` to a copy of the preferences, persist it, then publish it.
    /// The snapshot is unchanged if the write fails.
    pub fn update<F>(&mut self, edit: F) -> Result<Arc<Preferences>, ConfigError>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut next = (*self.current).clone();
        edit(&mut next);
        if next != *self.current {
            write_preferences(&next, &self.path)?;
            self.current = Arc::new(next);
        }
        Ok(self.get())
    }

    /// Restore user-facing preferences to their defaults. Bookkeeping values
    /// (first launch flag, pending file deletion) survive.
    pub fn reset(&mut self) -> Result<Arc<Preferences>, ConfigError> {
        self.update(|prefs| {
            let application = std::mem::take(&mut prefs.application);
            *prefs = Preferences::default();
            prefs.application.already_launched = application.already_launched;
            prefs.application.file_marked_for_deletion = application.file_marked_for_deletion;
        })
    }

    pub fn set_already_launched(&mut self) -> Result<(), ConfigError> {
        self.update(|prefs| prefs.application.already_launched = true)?;
        Ok(())
    }

    /// Remove the pending deletion entry and return it.
    pub fn take_file_marked_for_deletion(&mut self) -> Result<Option<PathBuf>, ConfigError> {
        let pending = self.current.application.file_marked_for_deletion.clone();
        if pending.is_some() {
            self.update(|prefs| prefs.application.file_marked_for_deletion = None)?;
        }
        Ok(pending)
    }

    /// Set a single preference from its dotted key and a textual value.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<Arc<Preferences>, ConfigError> {
        let mut next = (*self.current).clone();
        apply_field(&mut next, key, value)?;
        self.update(|prefs| *prefs = next)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid {
            message: format!("{} expects true or false, got '{}'", key, value),
        }),
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        message: format!("{} expects a number of milliseconds, got '{}'", key, value),
    })
}

fn apply_field(prefs: &mut Preferences, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "substitution.automatic" => prefs.substitution.automatic = parse_bool(key, value)?,
        "substitution.use-clipboard" => prefs.substitution.use_clipboard = parse_bool(key, value)?,
        "substitution.trigger-shortcut" => prefs.substitution.trigger_shortcut = value.to_string(),
        "substitution.paste-shortcut" => prefs.substitution.paste_shortcut = value.to_string(),
        "substitution.keystroke-delay-ms" => {
            prefs.substitution.keystroke_delay_ms = parse_ms(key, value)?
        }
        "substitution.clipboard-restore-delay-ms" => {
            prefs.substitution.clipboard_restore_delay_ms = parse_ms(key, value)?
        }
        "combo-list.folder" => prefs.combo_list.folder = paths::expand(value),
        "combo-list.auto-backup" => prefs.combo_list.auto_backup = parse_bool(key, value)?,
        "combo-list.last-import-export-path" => {
            prefs.combo_list.last_import_export_path = paths::expand(value)
        }
        "input.keyboards" => {
            prefs.input.keyboards = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        }
        "application.log-level" => {
            prefs.application.log_level = value
                .parse::<LogLevel>()
                .map_err(|message| ConfigError::Invalid { message })?
        }
        _ => {
            return Err(ConfigError::UnknownKey {
                key: key.to_string(),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> PreferencesStore {
        PreferencesStore::open(dir.path().join("preferences.kdl")).unwrap()
    }

    #[test]
    fn test_open_missing_file_does_not_create_it() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert_eq!(*store.get(), Preferences::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_update_persists_and_refreshes_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let before = store.get();

        store
            .update(|p| p.substitution.use_clipboard = false)
            .unwrap();

        // Old snapshots are immutable
        assert!(before.substitution.use_clipboard);
        assert!(!store.get().substitution.use_clipboard);

        let reopened = store_in(&dir);
        assert!(!reopened.get().substitution.use_clipboard);
    }

    #[test]
    fn test_reset_keeps_bookkeeping() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store
            .update(|p| {
                p.substitution.automatic = false;
                p.application.already_launched = true;
                p.application.log_level = LogLevel::Debug;
            })
            .unwrap();

        store.reset().unwrap();
        let prefs = store.get();
        assert!(prefs.substitution.automatic);
        assert!(prefs.application.already_launched);
        assert_eq!(prefs.application.log_level, LogLevel::Info);
    }

    #[test]
    fn test_take_file_marked_for_deletion() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let marked = dir.path().join("old-installer.bin");
        store
            .update(|p| p.application.file_marked_for_deletion = Some(marked.clone()))
            .unwrap();

        assert_eq!(store.take_file_marked_for_deletion().unwrap(), Some(marked));
        assert_eq!(store.take_file_marked_for_deletion().unwrap(), None);
        assert_eq!(store_in(&dir).get().application.file_marked_for_deletion, None);
    }

    #[test]
    fn test_set_field() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.set_field("substitution.automatic", "off").unwrap();
        store.set_field("substitution.keystroke-delay-ms", "12").unwrap();
        store.set_field("input.keyboards", "Kbd A, Kbd B").unwrap();

        let prefs = store.get();
        assert!(!prefs.substitution.automatic);
        assert_eq!(prefs.substitution.keystroke_delay_ms, 12);
        assert_eq!(prefs.input.keyboards, vec!["Kbd A", "Kbd B"]);
    }

    #[test]
    fn test_set_field_errors() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        match store.set_field("substitution.automatic", "maybe") {
            Err(ConfigError::Invalid { message }) => assert!(message.contains("true or false")),
            other => panic!("Expected ConfigError::Invalid, got {:?}", other),
        }
        match store.set_field("substitution.colour", "red") {
            Err(ConfigError::UnknownKey { key }) => assert_eq!(key, "substitution.colour"),
            other => panic!("Expected ConfigError::UnknownKey, got {:?}", other),
        }
        assert_eq!(*store.get(), Preferences::default());
    }

    #[test]
    fn test_every_listed_key_is_settable() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        for key in PREFERENCE_KEYS {
            let value = match *key {
                k if k.ends_with("-ms") => "1",
                "application.log-level" => "warn",
                "substitution.automatic" | "substitution.use-clipboard" | "combo-list.auto-backup" => "true",
                _ => "/tmp/x",
            };
            store.set_field(key, value).unwrap();
        }
    }
}
