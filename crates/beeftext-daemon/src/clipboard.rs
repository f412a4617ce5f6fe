//! System clipboard access and scoped save/restore

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::ClipboardAccessError;

pub trait ClipboardAccess: Send + Sync {
    /// Current text content; `None` when the clipboard holds no text.
    fn read_text(&self) -> Result<Option<String>, ClipboardAccessError>;
    fn write_text(&self, text: &str) -> Result<(), ClipboardAccessError>;
    fn clear(&self) -> Result<(), ClipboardAccessError>;
}

pub type SharedClipboard = Arc<dyn ClipboardAccess>;

/// The desktop clipboard through `arboard`.
///
/// The handle is kept for the process lifetime: on X11 the content we set is
/// only served while it is alive.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Mutex<Option<arboard::Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(
        &self,
        op: impl FnOnce(&mut arboard::Clipboard) -> Result<T, ClipboardAccessError>,
    ) -> Result<T, ClipboardAccessError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ClipboardAccessError::Unavailable("clipboard lock poisoned".to_string()))?;
        if guard.is_none() {
            let clipboard = arboard::Clipboard::new()
                .map_err(|e| ClipboardAccessError::Unavailable(e.to_string()))?;
            *guard = Some(clipboard);
        }
        match guard.as_mut() {
            Some(clipboard) => op(clipboard),
            None => Err(ClipboardAccessError::Unavailable("no clipboard".to_string())),
        }
    }
}

impl ClipboardAccess for SystemClipboard {
    fn read_text(&self) -> Result<Option<String>, ClipboardAccessError> {
        self.with(|c| match c.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardAccessError::Read(e.to_string())),
        })
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardAccessError> {
        self.with(|c| {
            c.set_text(text)
                .map_err(|e| ClipboardAccessError::Write(e.to_string()))
        })
    }

    fn clear(&self) -> Result<(), ClipboardAccessError> {
        self.with(|c| c.clear().map_err(|e| ClipboardAccessError::Write(e.to_string())))
    }
}

/// Clipboard use during one substitution.
///
/// The user's clipboard is saved before the first write and put back by
/// [`ClipboardSession::finish`], unless someone else replaced our content in
/// the meantime. Dropping an unfinished session restores immediately.
pub struct ClipboardSession {
    clipboard: SharedClipboard,
    /// Time the pasting application gets before the content changes again
    settle: Duration,
    saved: Option<Option<String>>,
    written: Option<String>,
    last_paste: Option<Instant>,
    finished: bool,
}

impl ClipboardSession {
    pub fn new(clipboard: SharedClipboard, settle: Duration) -> Self {
        Self {
            clipboard,
            settle,
            saved: None,
            written: None,
            last_paste: None,
            finished: false,
        }
    }

    /// The clipboard text as the user left it before this substitution.
    pub fn original_text(&self) -> Result<Option<String>, ClipboardAccessError> {
        match &self.saved {
            Some(saved) => Ok(saved.clone()),
            None => self.clipboard.read_text(),
        }
    }

    /// Put `text` on the clipboard for pasting.
    pub async fn set(&mut self, text: &str) -> Result<(), ClipboardAccessError> {
        self.wait_for_settle().await;
        if self.saved.is_none() {
            self.saved = Some(self.clipboard.read_text()?);
        }
        self.clipboard.write_text(text)?;
        self.written = Some(text.to_string());
        Ok(())
    }

    /// Record that a paste was just synthesized.
    pub fn pasted(&mut self) {
        self.last_paste = Some(Instant::now());
    }

    async fn wait_for_settle(&mut self) {
        if let Some(at) = self.last_paste.take() {
            let elapsed = at.elapsed();
            if elapsed < self.settle {
                tokio::time::sleep(self.settle - elapsed).await;
            }
        }
    }

    /// Restore the saved clipboard once pasting is over.
    pub async fn finish(mut self) {
        self.wait_for_settle().await;
        self.restore();
    }

    fn restore(&mut self) {
        self.finished = true;
        let Some(saved) = self.saved.take() else {
            return;
        };

        match self.clipboard.read_text() {
            Ok(current) if current == self.written => {}
            Ok(_) => {
                tracing::debug!("Clipboard changed during substitution, not restoring it");
                return;
            }
            Err(e) => {
                tracing::warn!("Could not check clipboard before restoring it: {}", e);
                return;
            }
        }

        let result = match saved {
            Some(text) => self.clipboard.write_text(&text),
            None => self.clipboard.clear(),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to restore clipboard: {}", e);
        }
    }
}

impl Drop for ClipboardSession {
    fn drop(&mut self) {
        if !self.finished {
            self.restore();
        }
    }
}
