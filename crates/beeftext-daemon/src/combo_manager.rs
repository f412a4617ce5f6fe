//! Combo manager: owns the combo list and publishes matcher snapshots
//!
//! Edits are made on a copy of the list, saved, and only then committed and
//! published. The matcher only ever sees complete [`ComboSnapshot`]s through a
//! watch channel, and a failed load or save leaves both the in-memory list and
//! the published snapshot untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use beeftext_config::{
    backup_combo_list, load_combo_list, save_combo_list, ComboList, ComboListError, Preferences,
};
use tokio::sync::watch;

use crate::matcher::ComboSnapshot;

pub struct ComboManager {
    path: PathBuf,
    backup_folder: PathBuf,
    auto_backup: bool,
    list: ComboList,
    publisher: watch::Sender<Arc<ComboSnapshot>>,
}

impl ComboManager {
    /// A manager with an empty dictionary. Call [`ComboManager::load`] to
    /// read the list.
    pub fn new(path: impl Into<PathBuf>, backup_folder: impl Into<PathBuf>, auto_backup: bool) -> Self {
        let (publisher, _) = watch::channel(Arc::new(ComboSnapshot::empty()));
        Self {
            path: path.into(),
            backup_folder: backup_folder.into(),
            auto_backup,
            list: ComboList::default(),
            publisher,
        }
    }

    pub fn from_preferences(prefs: &Preferences) -> Self {
        Self::new(
            prefs.combo_list_path(),
            prefs.backup_folder(),
            prefs.combo_list.auto_backup,
        )
    }

    /// Follow a preference change. Returns true when the list location moved,
    /// in which case the caller should load again.
    pub fn apply_preferences(&mut self, prefs: &Preferences) -> bool {
        self.auto_backup = prefs.combo_list.auto_backup;
        self.backup_folder = prefs.backup_folder();
        let path = prefs.combo_list_path();
        if path == self.path {
            return false;
        }
        tracing::info!("Combo list moved to {}", path.display());
        self.path = path;
        true
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> &ComboList {
        &self.list
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ComboSnapshot>> {
        self.publisher.subscribe()
    }

    /// Currently published snapshot.
    pub fn snapshot(&self) -> Arc<ComboSnapshot> {
        Arc::clone(&self.publisher.borrow())
    }

    fn publish(&self) {
        let snapshot = ComboSnapshot::from_list(&self.list);
        tracing::debug!(
            "Publishing {} active combos (longest keyword {})",
            snapshot.len(),
            snapshot.max_trigger_len()
        );
        self.publisher.send_replace(Arc::new(snapshot));
    }

    /// Replace the dictionary with the list on disk. On failure the previous
    /// dictionary stays in place.
    pub fn load(&mut self) -> Result<usize, ComboListError> {
        match load_combo_list(&self.path) {
            Ok(list) => {
                self.list = list;
                self.publish();
                Ok(self.list.combos.len())
            }
            Err(e) => {
                tracing::error!("{}. Keeping the {} combos loaded before", e, self.list.combos.len());
                Err(e)
            }
        }
    }

    pub fn reload(&mut self) -> Result<usize, ComboListError> {
        tracing::info!("Reloading combo list from {}", self.path.display());
        self.load()
    }

    /// Write the dictionary to disk, backing up the file it replaces.
    pub fn save(&self) -> Result<(), ComboListError> {
        Self::write(&self.list, &self.path, self.auto_backup.then_some(self.backup_folder.as_path()))
    }

    fn write(list: &ComboList, path: &Path, backup_folder: Option<&Path>) -> Result<(), ComboListError> {
        if let Some(folder) = backup_folder {
            // A failed backup should not stop the save
            if let Err(e) = backup_combo_list(path, folder) {
                tracing::warn!("Combo list backup failed: {}", e);
            }
        }
        save_combo_list(list, path)
    }

    /// Edit a copy of the list, save it, then commit and publish.
    fn edit<F>(&mut self, edit: F) -> Result<(), ComboListError>
    where
        F: FnOnce(&mut ComboList) -> Result<(), ComboListError>,
    {
        let mut list = self.list.clone();
        edit(&mut list)?;
        Self::write(&list, &self.path, self.auto_backup.then_some(self.backup_folder.as_path()))?;
        self.list = list;
        self.publish();
        Ok(())
    }

    pub fn set_enabled(&mut self, combo_id: &str, enabled: bool) -> Result<(), ComboListError> {
        self.edit(|list| list.set_combo_enabled(combo_id, enabled))?;
        tracing::info!(
            "Combo '{}' {}",
            combo_id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub fn set_group_enabled(&mut self, group_id: &str, enabled: bool) -> Result<(), ComboListError> {
        self.edit(|list| list.set_group_enabled(group_id, enabled))?;
        tracing::info!(
            "Group '{}' {}",
            group_id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Save a copy of the list somewhere else.
    pub fn export(&self, path: &Path) -> Result<(), ComboListError> {
        save_combo_list(&self.list, path)?;
        tracing::info!("Exported {} combos to {}", self.list.combos.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchMode;
    use beeftext_config::list_backups;
    use tempfile::TempDir;

    const LIST: &str = r#"{
        "version": 1,
        "groups": [ { "id": "g", "name": "Greetings" } ],
        "combos": [
            { "id": "hi", "trigger": { "keyword": "hi" }, "group": "g",
              "fragments": [ { "type": "text", "text": "hello" } ] },
            { "id": "btw", "trigger": { "keyword": "btw", "word_boundary": true },
              "snippet": "by the way" }
        ]
    }"#;

    fn manager(dir: &TempDir) -> ComboManager {
        std::fs::write(dir.path().join("comboList.json"), LIST).unwrap();
        let mut manager = ComboManager::new(
            dir.path().join("comboList.json"),
            dir.path().join("backup"),
            true,
        );
        manager.load().unwrap();
        manager
    }

    fn finds(snapshot: &ComboSnapshot, typed: &str) -> bool {
        let chars: Vec<char> = typed.chars().collect();
        snapshot.find(&chars, MatchMode::Automatic).is_some()
    }

    #[test]
    fn test_load_publishes_snapshot() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let rx = manager.subscribe();
        assert_eq!(rx.borrow().len(), 2);
        assert!(finds(&manager.snapshot(), "a btw"));
    }

    #[test]
    fn test_corrupt_list_keeps_previous_dictionary() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir);
        let rx = manager.subscribe();

        // Second combo lacks its trigger
        std::fs::write(
            manager.path(),
            r#"{ "version": 1, "combos": [
                { "id": "a", "trigger": { "keyword": "a" }, "snippet": "x" },
                { "id": "b", "snippet": "y" }
            ] }"#,
        )
        .unwrap();

        let err = manager.reload().unwrap_err();
        assert!(matches!(err, ComboListError::Corrupt { .. }));
        assert_eq!(manager.list().combos.len(), 2);
        assert_eq!(manager.list().combos[0].id, "hi");
        assert_eq!(rx.borrow().len(), 2);
        assert!(finds(&rx.borrow(), "hi"));
    }

    #[test]
    fn test_missing_file_creates_empty_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/comboList.json");
        let mut manager = ComboManager::new(&path, dir.path().join("backup"), false);
        assert_eq!(manager.load().unwrap(), 0);
        assert!(path.exists());
        assert!(manager.snapshot().is_empty());
    }

    #[test]
    fn test_set_enabled_persists_and_publishes() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir);
        let mut rx = manager.subscribe();
        rx.borrow_and_update();

        manager.set_enabled("btw", false).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!finds(&rx.borrow_and_update(), "a btw"));

        let mut reloaded = ComboManager::new(manager.path(), dir.path().join("backup"), false);
        reloaded.load().unwrap();
        assert!(!reloaded.list().combo("btw").unwrap().enabled);
    }

    #[test]
    fn test_unknown_combo_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir);
        let before = std::fs::read_to_string(manager.path()).unwrap();
        assert!(matches!(
            manager.set_enabled("nope", false),
            Err(ComboListError::UnknownCombo { .. })
        ));
        assert_eq!(std::fs::read_to_string(manager.path()).unwrap(), before);
    }

    #[test]
    fn test_disabled_group_hides_its_combos() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir);
        manager.set_group_enabled("g", false).unwrap();
        let snapshot = manager.snapshot();
        assert!(!finds(&snapshot, "hi"));
        assert!(finds(&snapshot, "btw"));

        manager.set_group_enabled("g", true).unwrap();
        assert!(finds(&manager.snapshot(), "hi"));
    }

    #[test]
    fn test_save_backs_up_previous_file() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir);
        manager.set_enabled("hi", false).unwrap();
        let backups = list_backups(&dir.path().join("backup")).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), LIST);
    }

    #[test]
    fn test_export() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let target = dir.path().join("export/Combos.json");
        manager.export(&target).unwrap();
        let exported = beeftext_config::load_combo_list(&target).unwrap();
        assert_eq!(exported.combos.len(), 2);
    }

    #[test]
    fn test_apply_preferences_detects_move() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir);
        let mut prefs = Preferences::default();
        prefs.combo_list.folder = dir.path().to_path_buf();
        assert!(!manager.apply_preferences(&prefs));
        prefs.combo_list.folder = dir.path().join("elsewhere");
        assert!(manager.apply_preferences(&prefs));
        assert_eq!(manager.path(), dir.path().join("elsewhere/comboList.json"));
    }
}
