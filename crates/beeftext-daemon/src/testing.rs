//! Test doubles for the platform layer

use std::sync::{Arc, Mutex};

use beeftext_config::{write_preferences, Preferences, PreferencesStore};
use evdev::Key;

use crate::clipboard::mock::MockClipboard;
use crate::clipboard::ClipboardAccess;
use crate::combo_manager::ComboManager;
use crate::context::DaemonContext;
use crate::error::SynthesisFailure;
use crate::injector::{KeySynthesizer, SharedSynthesizer};
use crate::keymap::key_to_char;

#[derive(Default)]
struct Screen {
    text: Vec<char>,
    cursor: usize,
    shift: bool,
    ctrl: bool,
    events: Vec<(Key, i32)>,
    clipboard: Option<Arc<MockClipboard>>,
}

impl Screen {
    fn insert(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn apply(&mut self, key: Key, value: i32) {
        self.events.push((key, value));
        match key {
            Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => self.shift = value != 0,
            Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => self.ctrl = value != 0,
            _ if value == 0 => {}
            Key::KEY_BACKSPACE => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.text.remove(self.cursor);
                }
            }
            Key::KEY_LEFT => self.cursor = self.cursor.saturating_sub(1),
            Key::KEY_RIGHT => self.cursor = (self.cursor + 1).min(self.text.len()),
            Key::KEY_V if self.ctrl => {
                let pasted = self
                    .clipboard
                    .as_ref()
                    .and_then(|c| c.read_text().ok().flatten())
                    .unwrap_or_default();
                for c in pasted.chars() {
                    self.insert(c);
                }
            }
            _ if self.ctrl => {}
            _ => {
                if let Some(c) = key_to_char(key, self.shift) {
                    self.insert(c);
                }
            }
        }
    }
}

struct ScreenDevice {
    screen: Arc<Mutex<Screen>>,
}

impl KeySynthesizer for ScreenDevice {
    fn emit_key(&mut self, key: Key, value: i32) -> Result<(), SynthesisFailure> {
        self.screen.lock().unwrap().apply(key, value);
        Ok(())
    }
}

/// A keyboard that types into a simulated text field, caret at the end.
#[derive(Clone)]
pub struct MockKeyboard {
    screen: Arc<Mutex<Screen>>,
}

impl MockKeyboard {
    pub fn with_screen(text: &str) -> Self {
        let text: Vec<char> = text.chars().collect();
        let screen = Screen {
            cursor: text.len(),
            text,
            ..Screen::default()
        };
        Self {
            screen: Arc::new(Mutex::new(screen)),
        }
    }

    /// Ctrl+V pastes from `clipboard`.
    pub fn attach_clipboard(&self, clipboard: Arc<MockClipboard>) {
        self.screen.lock().unwrap().clipboard = Some(clipboard);
    }

    pub fn shared(&self) -> SharedSynthesizer {
        Arc::new(tokio::sync::Mutex::new(ScreenDevice {
            screen: Arc::clone(&self.screen),
        }))
    }

    pub fn screen(&self) -> String {
        self.screen.lock().unwrap().text.iter().collect()
    }

    /// Every key event emitted, in order.
    pub fn events(&self) -> Vec<(Key, i32)> {
        self.screen.lock().unwrap().events.clone()
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    condition()
}

/// A context whose preferences and combo list live in `dir`.
pub fn daemon_context(dir: &tempfile::TempDir) -> DaemonContext {
    let mut prefs = Preferences::default();
    prefs.combo_list.folder = dir.path().join("data");
    let path = dir.path().join("preferences.kdl");
    write_preferences(&prefs, &path).unwrap();
    let store = PreferencesStore::with_preferences(path, prefs.clone());
    let mut combos = ComboManager::from_preferences(&prefs);
    combos.load().unwrap();
    DaemonContext::new(store, combos)
}
