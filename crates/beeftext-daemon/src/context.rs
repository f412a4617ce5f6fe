//! Process-wide daemon state
//!
//! Built once at startup and shared by reference with the control socket.
//! The engine only gets the pieces it reads on the hot path: the enabled
//! flag, the stats and the watch channels carrying preference and combo
//! snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use beeftext_config::{ConfigError, Preferences, PreferencesStore};
use tokio::sync::watch;

use crate::combo_manager::ComboManager;
use crate::engine::EngineStats;
use crate::ipc::DaemonStatus;
use crate::matcher::ComboSnapshot;

#[derive(Debug, Default)]
struct HookState {
    keyboards: Vec<String>,
    error: Option<String>,
}

pub struct DaemonContext {
    preferences: Mutex<PreferencesStore>,
    prefs_tx: watch::Sender<Arc<Preferences>>,
    combos: Mutex<ComboManager>,
    enabled: Arc<AtomicBool>,
    stats: Arc<EngineStats>,
    hook: Mutex<HookState>,
    started: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DaemonContext {
    pub fn new(preferences: PreferencesStore, combos: ComboManager) -> Self {
        let (prefs_tx, _) = watch::channel(preferences.get());
        Self {
            preferences: Mutex::new(preferences),
            prefs_tx,
            combos: Mutex::new(combos),
            enabled: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(EngineStats::default()),
            hook: Mutex::new(HookState::default()),
            started: Instant::now(),
        }
    }

    /// Current preferences snapshot.
    pub fn preferences(&self) -> Arc<Preferences> {
        Arc::clone(&self.prefs_tx.borrow())
    }

    pub fn subscribe_preferences(&self) -> watch::Receiver<Arc<Preferences>> {
        self.prefs_tx.subscribe()
    }

    pub fn subscribe_combos(&self) -> watch::Receiver<Arc<ComboSnapshot>> {
        lock(&self.combos).subscribe()
    }

    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Returns the previous state.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            tracing::info!("Substitution {}", if enabled { "enabled" } else { "disabled" });
        }
        was
    }

    pub fn with_combos<T>(&self, f: impl FnOnce(&mut ComboManager) -> T) -> T {
        f(&mut lock(&self.combos))
    }

    /// Edit the preferences, persist them and publish the new snapshot.
    pub fn update_preferences<T>(
        &self,
        f: impl FnOnce(&mut PreferencesStore) -> Result<T, ConfigError>,
    ) -> Result<T, ConfigError> {
        let mut store = lock(&self.preferences);
        let result = f(&mut store)?;
        self.prefs_tx.send_replace(store.get());
        Ok(result)
    }

    /// Re-read the preferences file and the combo list. A bad preferences
    /// file keeps the current preferences; a corrupt list keeps the current
    /// dictionary.
    pub fn reload(&self) -> Result<usize, String> {
        let prefs = self
            .update_preferences(|store| store.reload())
            .map_err(|e| format!("Preferences not reloaded: {}", e))?;

        let mut combos = lock(&self.combos);
        combos.apply_preferences(&prefs);
        combos.reload().map_err(|e| e.to_string())
    }

    pub fn set_hook_installed(&self, keyboards: Vec<String>) {
        let mut hook = lock(&self.hook);
        hook.keyboards = keyboards;
        hook.error = None;
    }

    /// Record why the keyboard hook is missing and switch substitution off.
    pub fn set_hook_failed(&self, error: impl std::fmt::Display) {
        tracing::error!("Keyboard hook not installed, substitution disabled: {}", error);
        self.enabled.store(false, Ordering::SeqCst);
        let mut hook = lock(&self.hook);
        hook.keyboards.clear();
        hook.error = Some(error.to_string());
    }

    pub fn status(&self) -> DaemonStatus {
        let prefs = self.preferences();
        let hook = lock(&self.hook);
        let combos = lock(&self.combos);
        DaemonStatus {
            enabled: self.is_enabled(),
            automatic: prefs.substitution.automatic,
            use_clipboard: prefs.substitution.use_clipboard,
            trigger_shortcut: prefs.substitution.trigger_shortcut.clone(),
            active_combos: combos.snapshot().len(),
            total_combos: combos.list().combos.len(),
            combo_list: combos.path().to_path_buf(),
            keyboards: hook.keyboards.clone(),
            hook_error: hook.error.clone(),
            substituting: self.stats.is_busy(),
            substitutions: self.stats.substitutions(),
            failed_fragments: self.stats.failed_fragments(),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::daemon_context as context;
    use tempfile::TempDir;

    #[test]
    fn test_hook_failure_disables_substitution() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        assert!(ctx.is_enabled());
        ctx.set_hook_failed("No keyboard found to listen to");
        assert!(!ctx.is_enabled());
        let status = ctx.status();
        assert_eq!(status.hook_error.as_deref(), Some("No keyboard found to listen to"));
        assert!(status.keyboards.is_empty());
    }

    #[test]
    fn test_preference_updates_are_published() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let mut rx = ctx.subscribe_preferences();
        rx.borrow_and_update();

        ctx.update_preferences(|store| store.set_field("substitution.automatic", "false"))
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().substitution.automatic);
        assert!(!ctx.status().automatic);
        let on_disk = beeftext_config::parse_preferences(&dir.path().join("preferences.kdl")).unwrap();
        assert!(!on_disk.substitution.automatic);
    }

    #[test]
    fn test_set_enabled_reports_previous_state() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        assert!(ctx.set_enabled(false));
        assert!(!ctx.set_enabled(false));
        assert!(!ctx.set_enabled(true));
        assert!(ctx.is_enabled());
    }
}
