//! Substitution engine event loop
//!
//! All input reaches the engine through one ordered channel: user keystrokes
//! from the hook, the echoes of what a substitution synthesizes, and the
//! player's progress notifications. Processing them in arrival order is what
//! keeps the typing buffer consistent with the screen.
//!
//! Synthetic echoes update the buffer but never run the matcher. User
//! keystrokes that arrive while a substitution is running are queued and
//! replayed, in order, once it finishes.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use beeftext_config::Preferences;
use evdev::Key;
use tokio::sync::{mpsc, oneshot, watch};

use crate::buffer::{TypingBuffer, BUFFER_MARGIN};
use crate::clipboard::SharedClipboard;
use crate::injector::SharedSynthesizer;
use crate::input::{KeyAction, KeyEvent, Shortcut};
use crate::keymap::is_modifier_key;
use crate::matcher::{ComboSnapshot, MatchMode};
use crate::substitution::{PlaybackReport, PlaybackSettings, Player, SubstitutionJob, SubstitutionState};

#[derive(Debug)]
pub enum EngineEvent {
    Key(KeyEvent),
    /// Text the engine pasted
    Pasted { text: String },
    /// Every backspace of job `job` has been echoed. The player waits for
    /// `ack` before playing fragments.
    ErasureComplete { job: u64, ack: oneshot::Sender<()> },
    PlaybackFinished(PlaybackReport),
}

/// Counters shared with the control socket.
#[derive(Debug, Default)]
pub struct EngineStats {
    substitutions: AtomicU64,
    failed_fragments: AtomicU64,
    cancelled: AtomicU64,
    busy: AtomicBool,
}

impl EngineStats {
    pub fn substitutions(&self) -> u64 {
        self.substitutions.load(Ordering::Relaxed)
    }

    pub fn failed_fragments(&self) -> u64 {
        self.failed_fragments.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// A substitution is in progress.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    fn record(&self, report: &PlaybackReport) {
        self.substitutions.fetch_add(1, Ordering::Relaxed);
        self.failed_fragments
            .fetch_add(report.failures as u64, Ordering::Relaxed);
        if report.cancelled {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub struct Engine {
    events: mpsc::UnboundedReceiver<EngineEvent>,
    /// Handed to players; weak so the loop ends once every input source is gone
    sender: mpsc::WeakUnboundedSender<EngineEvent>,
    synth: SharedSynthesizer,
    clipboard: SharedClipboard,
    combos_rx: watch::Receiver<Arc<ComboSnapshot>>,
    prefs_rx: watch::Receiver<Arc<Preferences>>,
    combos: Arc<ComboSnapshot>,
    prefs: Arc<Preferences>,
    trigger: Option<Shortcut>,
    enabled: Arc<AtomicBool>,
    stats: Arc<EngineStats>,

    buffer: TypingBuffer,
    state: SubstitutionState,
    pending: VecDeque<KeyEvent>,
    /// Keys pressed on the virtual keyboard on the user's behalf
    forwarded_pressed: HashSet<Key>,
    /// Keys whose press was eaten, so their repeats and release are too
    swallowed: HashSet<Key>,
    caps_lock: bool,
    next_job: u64,
}

impl Engine {
    /// Build the engine and the sender input sources feed it through.
    pub fn new(
        synth: SharedSynthesizer,
        clipboard: SharedClipboard,
        mut combos_rx: watch::Receiver<Arc<ComboSnapshot>>,
        mut prefs_rx: watch::Receiver<Arc<Preferences>>,
        enabled: Arc<AtomicBool>,
        stats: Arc<EngineStats>,
    ) -> (Self, mpsc::UnboundedSender<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let combos = Arc::clone(&combos_rx.borrow_and_update());
        let prefs = Arc::clone(&prefs_rx.borrow_and_update());

        let mut engine = Self {
            events: rx,
            sender: tx.downgrade(),
            synth,
            clipboard,
            combos_rx,
            prefs_rx,
            buffer: TypingBuffer::new(combos.max_trigger_len() + BUFFER_MARGIN),
            combos,
            prefs,
            trigger: None,
            enabled,
            stats,
            state: SubstitutionState::Idle,
            pending: VecDeque::new(),
            forwarded_pressed: HashSet::new(),
            swallowed: HashSet::new(),
            caps_lock: false,
            next_job: 1,
        };
        engine.trigger = engine.parse_trigger();
        (engine, tx)
    }

    fn parse_trigger(&self) -> Option<Shortcut> {
        let source = &self.prefs.substitution.trigger_shortcut;
        match Shortcut::parse(source) {
            Ok(shortcut) => Some(shortcut),
            Err(e) => {
                tracing::warn!("Trigger shortcut disabled: {}", e);
                None
            }
        }
    }

    /// Pick up published combo and preference changes.
    fn refresh(&mut self) {
        if self.combos_rx.has_changed().unwrap_or(false) {
            self.combos = Arc::clone(&self.combos_rx.borrow_and_update());
            self.buffer
                .set_capacity(self.combos.max_trigger_len() + BUFFER_MARGIN);
            tracing::debug!("Engine now matching {} combos", self.combos.len());
        }
        if self.prefs_rx.has_changed().unwrap_or(false) {
            self.prefs = Arc::clone(&self.prefs_rx.borrow_and_update());
            self.trigger = self.parse_trigger();
        }
    }

    /// Process events until every input source has hung up.
    pub async fn run(mut self) {
        tracing::info!("Substitution engine started");
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
        }
        tracing::info!("Substitution engine stopped");
    }

    async fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Key(event) if event.is_synthetic() => self.apply_to_buffer(&event),
            EngineEvent::Key(event) => {
                if self.state.is_idle() {
                    self.process_user(event).await;
                } else {
                    self.defer(event).await;
                }
            }
            EngineEvent::Pasted { text } => self.buffer.append_str(&text),
            EngineEvent::ErasureComplete { job, ack } => {
                match self.state {
                    SubstitutionState::Erasing { job: current, generation } if current == job => {
                        if generation != self.buffer.generation() {
                            tracing::warn!("User input was applied during erasure of job {}", job);
                        }
                        self.state = SubstitutionState::Playing { job };
                    }
                    _ => tracing::warn!("Erasure of unknown job {} (state {:?})", job, self.state),
                }
                let _ = ack.send(());
            }
            EngineEvent::PlaybackFinished(report) => self.finish(report).await,
        }
    }

    async fn defer(&mut self, event: KeyEvent) {
        if event.action == KeyAction::Release {
            if self.swallowed.remove(&event.key) {
                return;
            }
            // Forwarded now, so the key is not left stuck down
            if self.forwarded_pressed.contains(&event.key) {
                self.forward(&event).await;
                return;
            }
        }
        tracing::trace!("Queueing {:?} {:?} during substitution", event.key, event.action);
        self.pending.push_back(event);
    }

    async fn finish(&mut self, report: PlaybackReport) {
        if self.state.job() != Some(report.job) {
            tracing::warn!("Playback report for job {} while in {:?}", report.job, self.state);
        }
        tracing::debug!(
            "Substitution {} of combo '{}' done: {} fragments, {} failures{}",
            report.job,
            report.combo_id,
            report.fragments_played,
            report.failures,
            if report.cancelled { ", cancelled" } else { "" }
        );
        self.stats.record(&report);
        self.state = SubstitutionState::Idle;
        self.stats.busy.store(false, Ordering::Relaxed);

        // Replay queued keystrokes until one of them starts a new substitution
        while self.state.is_idle() {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            self.process_user(event).await;
        }
    }

    async fn process_user(&mut self, event: KeyEvent) {
        self.refresh();
        self.caps_lock = event.modifiers.caps_lock;
        let enabled = self.enabled.load(Ordering::SeqCst);

        if self.swallowed.contains(&event.key) {
            if event.action == KeyAction::Release {
                self.swallowed.remove(&event.key);
            }
            return;
        }

        if enabled
            && event.action == KeyAction::Press
            && self.trigger.as_ref().is_some_and(|t| t.matches(&event))
        {
            tracing::debug!("Trigger shortcut pressed");
            self.swallowed.insert(event.key);
            self.try_substitute(MatchMode::Shortcut);
            return;
        }

        self.forward(&event).await;
        self.apply_to_buffer(&event);
        self.buffer.bump_generation();

        if enabled
            && self.prefs.substitution.automatic
            && event.action.is_down()
            && event.text.is_some()
        {
            self.try_substitute(MatchMode::Automatic);
        }
    }

    async fn forward(&mut self, event: &KeyEvent) {
        let result = self.synth.lock().await.forward(event);
        match result {
            Ok(()) => match event.action {
                KeyAction::Press | KeyAction::Repeat => {
                    self.forwarded_pressed.insert(event.key);
                }
                KeyAction::Release => {
                    self.forwarded_pressed.remove(&event.key);
                }
            },
            Err(e) => tracing::warn!("Failed to forward {:?}: {}", event.key, e),
        }
    }

    fn apply_to_buffer(&mut self, event: &KeyEvent) {
        if !event.action.is_down() {
            return;
        }
        match (event.key, event.text) {
            (Key::KEY_BACKSPACE, _) => self.buffer.append_backspace(),
            (_, Some(c)) => self.buffer.append(c),
            (key, None) if is_modifier_key(key) => {}
            _ => self.buffer.reset(),
        }
    }

    fn try_substitute(&mut self, mode: MatchMode) -> bool {
        let combos = Arc::clone(&self.combos);
        let Some(found) = combos.find(self.buffer.as_slice(), mode) else {
            return false;
        };
        let Some(events) = self.sender.upgrade() else {
            return false;
        };

        let id = self.next_job;
        self.next_job += 1;
        tracing::info!(
            "Substituting combo '{}' (keyword '{}')",
            found.combo.id,
            found.combo.trigger.keyword
        );

        let job = SubstitutionJob {
            id,
            combo_id: found.combo.id.clone(),
            fragments: found.fragments,
            erase: found.matched_length,
            delimiter: found.delimiter,
            release_keys: self.forwarded_pressed.drain().collect(),
            caps_lock: self.caps_lock,
        };
        self.state = SubstitutionState::Erasing {
            job: id,
            generation: self.buffer.generation(),
        };
        self.stats.busy.store(true, Ordering::Relaxed);

        let player = Player::new(
            job.clone(),
            PlaybackSettings::from_preferences(&self.prefs),
            Arc::clone(&self.synth),
            Arc::clone(&self.clipboard),
            events.clone(),
            combos,
            Arc::clone(&self.enabled),
        );
        tokio::spawn(async move {
            let report = match tokio::spawn(player.run()).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!("Substitution {} failed: {}", job.id, e);
                    PlaybackReport::aborted(&job)
                }
            };
            let _ = events.send(EngineEvent::PlaybackFinished(report));
        });
        true
    }
}
