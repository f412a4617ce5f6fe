use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(beeftext::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid preference: {message}")]
    #[diagnostic(code(beeftext::config::invalid))]
    Invalid { message: String },

    #[error("Unknown preference key: {key}")]
    #[diagnostic(
        code(beeftext::config::unknown_key),
        help("run `beeftext prefs show` to list the known keys")
    )]
    UnknownKey { key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading, saving or editing a combo list.
#[derive(Error, Diagnostic, Debug)]
pub enum ComboListError {
    /// The combo list on disk is malformed. The caller keeps whatever it
    /// loaded last.
    #[error("Combo list {path} is corrupt: {message}")]
    #[diagnostic(code(beeftext::combo_list::corrupt))]
    Corrupt { path: PathBuf, message: String },

    #[error("No combo with id '{id}'")]
    #[diagnostic(code(beeftext::combo_list::unknown_combo))]
    UnknownCombo { id: String },

    #[error("No group with id '{id}'")]
    #[diagnostic(code(beeftext::combo_list::unknown_group))]
    UnknownGroup { id: String },

    #[error("Failed to serialize combo list: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ComboListError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }
}
