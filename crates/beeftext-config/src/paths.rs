//! Default file locations

use std::path::PathBuf;

/// Expand a leading `~` in a path.
pub fn expand(path: &str) -> PathBuf {
    shellexpand::tilde(path).into_owned().into()
}

/// Application data folder (`$XDG_DATA_HOME/beeftext`, falls back to `~/.local/share/beeftext`).
pub fn default_data_dir() -> PathBuf {
    match std::env::var("XDG_DATA_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join("beeftext"),
        _ => expand("~/.local/share/beeftext"),
    }
}

/// Preferences file (`$XDG_CONFIG_HOME/beeftext/preferences.kdl`).
pub fn default_preferences_path() -> PathBuf {
    match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join("beeftext/preferences.kdl"),
        _ => expand("~/.config/beeftext/preferences.kdl"),
    }
}

/// Folder holding the daemon log files.
pub fn log_dir() -> PathBuf {
    default_data_dir().join("logs")
}
