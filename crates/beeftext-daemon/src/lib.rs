//! beeftext daemon
//!
//! Watches the keyboards, matches what is typed against the combo list and
//! replaces triggers with their expansion.

pub mod buffer;
pub mod clipboard;
pub mod combo_manager;
pub mod context;
pub mod control;
pub mod device;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod hook;
pub mod injector;
pub mod input;
pub mod instance;
pub mod ipc;
pub mod keymap;
pub mod logging;
pub mod matcher;
pub mod substitution;

#[cfg(test)]
mod testing;

pub use combo_manager::ComboManager;
pub use context::DaemonContext;
pub use engine::{Engine, EngineEvent, EngineStats};
pub use error::{ClipboardAccessError, HookInstallationError, SynthesisFailure};
pub use input::{KeyEvent, Origin, Shortcut};
pub use ipc::{IpcRequest, IpcResponse};
pub use matcher::{ComboSnapshot, MatchMode, MatchResult};
