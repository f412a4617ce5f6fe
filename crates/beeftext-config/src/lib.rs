//! Preferences and combo list storage for Beeftext
//!
//! Preferences live in a KDL file; the combo list is a JSON document. Both are
//! replaced atomically on write.

mod backup;
mod combo_list;
mod error;
mod model;
mod parser;
pub mod paths;
mod snippet;
mod store;
mod writer;

pub use backup::{backup_combo_list, list_backups, MAX_BACKUPS};
pub use combo_list::{
    load_combo_list, parse_combo_list, save_combo_list, Combo, ComboList, Fragment, Group,
    Trigger, COMBO_LIST_VERSION, MAX_DELAY_MS, VARIABLE_NAMES,
};
pub use error::{ComboListError, ConfigError};
pub use model::*;
pub use parser::{parse_preferences, parse_preferences_str};
pub use snippet::parse_snippet;
pub use store::{PreferencesStore, PREFERENCE_KEYS};
pub use writer::{generate_preferences, write_atomic, write_preferences};
