//! Preferences data model

use std::path::PathBuf;

/// Default shortcut that triggers a substitution when automatic substitution is off.
pub const DEFAULT_TRIGGER_SHORTCUT: &str = "Ctrl+Alt+Shift+B";
/// Default shortcut synthesized to paste the clipboard.
pub const DEFAULT_PASTE_SHORTCUT: &str = "Ctrl+V";
/// Name of the combo list file inside the combo list folder.
pub const COMBO_LIST_FILE_NAME: &str = "comboList.json";

/// User preferences, as stored in `preferences.kdl`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub substitution: SubstitutionPreferences,
    pub combo_list: ComboListPreferences,
    pub input: InputPreferences,
    pub application: ApplicationPreferences,
}

impl Preferences {
    /// Path of the combo list file.
    pub fn combo_list_path(&self) -> PathBuf {
        self.combo_list.folder.join(COMBO_LIST_FILE_NAME)
    }

    /// Folder receiving automatic combo list backups.
    pub fn backup_folder(&self) -> PathBuf {
        self.combo_list.folder.join("backup")
    }
}

/// How combos are matched and substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionPreferences {
    /// Expand as soon as a trigger is typed. When off, only the trigger
    /// shortcut performs a substitution.
    pub automatic: bool,
    /// Insert text fragments by pasting rather than typing
    pub use_clipboard: bool,
    pub trigger_shortcut: String,
    pub paste_shortcut: String,
    /// Pause between synthesized keystrokes
    pub keystroke_delay_ms: u64,
    /// Wait before putting the previous clipboard content back
    pub clipboard_restore_delay_ms: u64,
}

impl Default for SubstitutionPreferences {
    fn default() -> Self {
        Self {
            automatic: true,
            use_clipboard: true,
            trigger_shortcut: DEFAULT_TRIGGER_SHORTCUT.to_string(),
            paste_shortcut: DEFAULT_PASTE_SHORTCUT.to_string(),
            keystroke_delay_ms: 0,
            clipboard_restore_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboListPreferences {
    pub folder: PathBuf,
    pub auto_backup: bool,
    pub last_import_export_path: PathBuf,
}

impl Default for ComboListPreferences {
    fn default() -> Self {
        Self {
            folder: crate::paths::default_data_dir(),
            auto_backup: true,
            last_import_export_path: crate::paths::expand("~/Desktop/Combos.json"),
        }
    }
}

/// Which keyboards the daemon listens to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputPreferences {
    /// Device names to grab. Empty means every keyboard.
    pub keyboards: Vec<String>,
}

/// Process bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationPreferences {
    pub log_level: LogLevel,
    pub already_launched: bool,
    pub file_marked_for_deletion: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}
