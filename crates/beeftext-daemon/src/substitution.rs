//! Substitution playback
//!
//! A substitution goes `Idle -> Erasing -> Playing -> Idle`. The [`Player`]
//! runs as its own task so a delay fragment only holds up the substitution,
//! never the event loop. Everything it puts on screen is echoed back into the
//! engine's event queue as `Synthetic` input, in the order it was applied,
//! which keeps the typing buffer in step with the screen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beeftext_config::{Fragment, Preferences, DEFAULT_PASTE_SHORTCUT};
use evdev::Key;
use tokio::sync::{mpsc, oneshot};

use crate::clipboard::{ClipboardSession, SharedClipboard};
use crate::engine::EngineEvent;
use crate::error::SynthesisFailure;
use crate::fragment::{render, FragmentError};
use crate::injector::SharedSynthesizer;
use crate::input::{KeyEvent, Shortcut};
use crate::keymap::key_to_char;
use crate::matcher::ComboSnapshot;

#[derive(Debug)]
pub enum SubstitutionState {
    Idle,
    /// Backspaces are being sent for job `job`. `generation` is the buffer
    /// generation when the match was found.
    Erasing { job: u64, generation: u64 },
    Playing { job: u64 },
}

impl SubstitutionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SubstitutionState::Idle)
    }

    pub fn job(&self) -> Option<u64> {
        match self {
            SubstitutionState::Idle => None,
            SubstitutionState::Erasing { job, .. } | SubstitutionState::Playing { job } => Some(*job),
        }
    }
}

/// Playback options taken from the preferences when a substitution starts.
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub use_clipboard: bool,
    pub paste_shortcut: Shortcut,
    pub keystroke_delay: Duration,
    /// Also the pause between two pastes
    pub clipboard_restore_delay: Duration,
}

impl PlaybackSettings {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        let sub = &prefs.substitution;
        let paste_shortcut = Shortcut::parse(&sub.paste_shortcut)
            .or_else(|e| {
                tracing::warn!("{}, pasting with {}", e, DEFAULT_PASTE_SHORTCUT);
                Shortcut::parse(DEFAULT_PASTE_SHORTCUT)
            })
            .unwrap_or_else(|_| Shortcut::new(Key::KEY_PASTE));
        Self {
            use_clipboard: sub.use_clipboard,
            paste_shortcut,
            keystroke_delay: Duration::from_millis(sub.keystroke_delay_ms),
            clipboard_restore_delay: Duration::from_millis(sub.clipboard_restore_delay_ms),
        }
    }
}

/// One substitution to perform.
#[derive(Debug, Clone)]
pub struct SubstitutionJob {
    pub id: u64,
    pub combo_id: String,
    pub fragments: Arc<[Fragment]>,
    /// Characters to erase before playing
    pub erase: usize,
    /// Typed again once the fragments are played
    pub delimiter: Option<char>,
    /// Keys the user still holds, released before playing
    pub release_keys: Vec<Key>,
    pub caps_lock: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub job: u64,
    pub combo_id: String,
    pub fragments_played: usize,
    pub failures: usize,
    /// Substitution was disabled before every fragment was played
    pub cancelled: bool,
}

impl PlaybackReport {
    pub fn aborted(job: &SubstitutionJob) -> Self {
        Self {
            job: job.id,
            combo_id: job.combo_id.clone(),
            cancelled: true,
            ..Self::default()
        }
    }
}

pub struct Player {
    job: SubstitutionJob,
    settings: PlaybackSettings,
    synth: SharedSynthesizer,
    clipboard: Option<ClipboardSession>,
    events: mpsc::UnboundedSender<EngineEvent>,
    combos: Arc<ComboSnapshot>,
    enabled: Arc<AtomicBool>,
    report: PlaybackReport,
}

impl Player {
    pub fn new(
        job: SubstitutionJob,
        settings: PlaybackSettings,
        synth: SharedSynthesizer,
        clipboard: SharedClipboard,
        events: mpsc::UnboundedSender<EngineEvent>,
        combos: Arc<ComboSnapshot>,
        enabled: Arc<AtomicBool>,
    ) -> Self {
        let session = ClipboardSession::new(clipboard, settings.clipboard_restore_delay);
        let report = PlaybackReport {
            job: job.id,
            combo_id: job.combo_id.clone(),
            ..PlaybackReport::default()
        };
        Self {
            job,
            settings,
            synth,
            clipboard: Some(session),
            events,
            combos,
            enabled,
            report,
        }
    }

    /// Erase the keyword, play the fragments, restore the clipboard.
    pub async fn run(mut self) -> PlaybackReport {
        tracing::debug!(
            "Substitution {}: erasing {} characters for combo '{}'",
            self.job.id,
            self.job.erase,
            self.job.combo_id
        );

        self.release_held_keys().await;
        self.erase().await;

        // The engine answers once every echoed backspace is in the buffer
        let (ack, erased) = oneshot::channel();
        if self
            .events
            .send(EngineEvent::ErasureComplete { job: self.job.id, ack })
            .is_err()
            || erased.await.is_err()
        {
            tracing::debug!("Engine gone, dropping substitution {}", self.job.id);
            self.report.cancelled = true;
            return self.report;
        }

        let fragments = Arc::clone(&self.job.fragments);
        for fragment in fragments.iter() {
            if !self.enabled.load(Ordering::SeqCst) {
                tracing::info!("Substitution disabled, stopping combo '{}'", self.job.combo_id);
                self.report.cancelled = true;
                break;
            }
            match render(fragment, &mut self).await {
                Ok(()) => self.report.fragments_played += 1,
                Err(e) => {
                    tracing::warn!("Fragment of combo '{}' failed: {}", self.job.combo_id, e);
                    self.report.failures += 1;
                }
            }
        }

        if let Some(delimiter) = self.job.delimiter {
            if let Err(e) = self.type_text(&delimiter.to_string()).await {
                tracing::warn!("Failed to type delimiter: {}", e);
                self.report.failures += 1;
            }
        }

        if let Some(session) = self.clipboard.take() {
            session.finish().await;
        }

        self.report
    }

    fn echo(&self, event: EngineEvent) {
        // A closed channel means the engine is shutting down
        let _ = self.events.send(event);
    }

    async fn pause(&self) {
        if !self.settings.keystroke_delay.is_zero() {
            tokio::time::sleep(self.settings.keystroke_delay).await;
        }
    }

    async fn release_held_keys(&mut self) {
        if self.job.release_keys.is_empty() {
            return;
        }
        let mut synth = self.synth.lock().await;
        for key in &self.job.release_keys {
            if let Err(e) = synth.release_key(*key) {
                tracing::warn!("Failed to release {:?}: {}", key, e);
            }
        }
    }

    async fn erase(&mut self) {
        for _ in 0..self.job.erase {
            let result = self.synth.lock().await.tap_key(Key::KEY_BACKSPACE);
            match result {
                Ok(()) => self.echo(EngineEvent::Key(KeyEvent::synthetic(Key::KEY_BACKSPACE, None))),
                Err(e) => {
                    tracing::warn!("Failed to erase keyword: {}", e);
                    self.report.failures += 1;
                }
            }
            self.pause().await;
        }
    }

    pub fn combos(&self) -> &ComboSnapshot {
        &self.combos
    }

    /// Clipboard text from before this substitution touched it.
    pub fn original_clipboard_text(&self) -> Option<String> {
        let session = self.clipboard.as_ref()?;
        match session.original_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }

    /// Insert text the configured way.
    pub async fn insert_text(&mut self, text: &str) -> Result<(), FragmentError> {
        if text.is_empty() {
            return Ok(());
        }
        if self.settings.use_clipboard {
            self.paste_text(text).await
        } else {
            self.type_text(text).await
        }
    }

    /// Type text key by key. Characters the keyboard cannot produce are pasted.
    pub async fn type_text(&mut self, text: &str) -> Result<(), FragmentError> {
        for c in text.chars() {
            let result = self.synth.lock().await.type_char(c, self.job.caps_lock);
            match result {
                Ok(key) => self.echo(EngineEvent::Key(KeyEvent::synthetic(key, Some(c)))),
                Err(SynthesisFailure::Untypeable(c)) => self.paste_text(&c.to_string()).await?,
                Err(e) => return Err(e.into()),
            }
            self.pause().await;
        }
        Ok(())
    }

    /// Put text on the clipboard and synthesize the paste shortcut.
    pub async fn paste_text(&mut self, text: &str) -> Result<(), FragmentError> {
        let Some(session) = self.clipboard.as_mut() else {
            return Ok(());
        };
        session.set(text).await?;
        self.synth.lock().await.chord(&self.settings.paste_shortcut)?;
        if let Some(session) = self.clipboard.as_mut() {
            session.pasted();
        }
        self.echo(EngineEvent::Pasted {
            text: text.to_string(),
        });
        self.pause().await;
        Ok(())
    }

    pub async fn press_shortcut(&mut self, shortcut: &Shortcut) -> Result<(), FragmentError> {
        self.synth.lock().await.chord(shortcut)?;
        let text = if shortcut.modifiers.is_command() {
            None
        } else {
            key_to_char(shortcut.key, shortcut.modifiers.shift)
        };
        let mut event = KeyEvent::synthetic(shortcut.key, text);
        event.modifiers = shortcut.modifiers;
        self.echo(EngineEvent::Key(event));
        self.pause().await;
        Ok(())
    }

    /// Move the caret; negative offsets go left.
    pub async fn move_cursor(&mut self, offset: i32) -> Result<(), FragmentError> {
        let key = if offset < 0 { Key::KEY_LEFT } else { Key::KEY_RIGHT };
        for _ in 0..offset.unsigned_abs() {
            self.synth.lock().await.tap_key(key)?;
            self.echo(EngineEvent::Key(KeyEvent::synthetic(key, None)));
            self.pause().await;
        }
        Ok(())
    }

    pub async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
