//! Failure kinds of the substitution machinery
//!
//! None of these terminate the daemon. A hook failure disables substitution;
//! clipboard and synthesis failures are logged and playback continues.

use std::path::PathBuf;

use thiserror::Error;

/// The keystroke source could not be set up.
#[derive(Debug, Error)]
pub enum HookInstallationError {
    #[error("Failed to enumerate input devices: {0}")]
    Enumerate(#[source] std::io::Error),

    #[error("No keyboard found to listen to")]
    NoKeyboards,

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to grab '{name}' for exclusive access: {source}. Is another application using it?")]
    Grab {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create the virtual keyboard (is /dev/uinput writable?): {0}")]
    VirtualDevice(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ClipboardAccessError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read the clipboard: {0}")]
    Read(String),

    #[error("Failed to write the clipboard: {0}")]
    Write(String),
}

/// A synthesized key action did not apply.
#[derive(Debug, Error)]
pub enum SynthesisFailure {
    #[error("Failed to emit key event: {0}")]
    Emit(#[from] std::io::Error),

    #[error("No key produces '{0}' on the virtual keyboard")]
    Untypeable(char),
}
