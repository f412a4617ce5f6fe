//! Virtual keyboard injection via uinput
//!
//! Every key the daemon puts on screen goes through a [`KeySynthesizer`]:
//! user keystrokes forwarded from the grabbed keyboards as well as the
//! backspaces and text of a substitution. The trait lets tests replace the
//! uinput device with a recording keyboard.

use std::sync::Arc;

use evdev::{uinput::VirtualDeviceBuilder, AttributeSet, EventType, InputEvent, Key};
use tokio::sync::Mutex;

use crate::error::{HookInstallationError, SynthesisFailure};
use crate::input::{KeyEvent, Shortcut};
use crate::keymap::{char_to_key, is_letter_key};

/// Name of our uinput device. Device enumeration skips it so the daemon never
/// grabs its own output.
pub const VIRTUAL_DEVICE_NAME: &str = "beeftext virtual keyboard";

/// Something that can put key events on screen.
pub trait KeySynthesizer: Send {
    /// Emit one key event (value 0 release, 1 press, 2 repeat).
    fn emit_key(&mut self, key: Key, value: i32) -> Result<(), SynthesisFailure>;

    fn press_key(&mut self, key: Key) -> Result<(), SynthesisFailure> {
        self.emit_key(key, 1)
    }

    fn release_key(&mut self, key: Key) -> Result<(), SynthesisFailure> {
        self.emit_key(key, 0)
    }

    fn tap_key(&mut self, key: Key) -> Result<(), SynthesisFailure> {
        self.press_key(key)?;
        self.release_key(key)
    }

    /// Press the modifiers, tap the key, release the modifiers in reverse.
    fn chord(&mut self, shortcut: &Shortcut) -> Result<(), SynthesisFailure> {
        let modifiers = shortcut.modifier_keys();
        for modifier in &modifiers {
            self.press_key(*modifier)?;
        }
        let result = self.tap_key(shortcut.key);
        for modifier in modifiers.iter().rev() {
            self.release_key(*modifier)?;
        }
        result
    }

    /// Re-emit a keystroke from a grabbed keyboard.
    fn forward(&mut self, event: &KeyEvent) -> Result<(), SynthesisFailure> {
        self.emit_key(event.key, event.action.value())
    }

    /// Type one character. With caps lock on, letters are typed with the
    /// opposite shift state so they come out as asked.
    fn type_char(&mut self, c: char, caps_lock: bool) -> Result<Key, SynthesisFailure> {
        let (key, shift) = char_to_key(c).ok_or(SynthesisFailure::Untypeable(c))?;
        let shift = shift ^ (caps_lock && is_letter_key(key));
        if shift {
            self.press_key(Key::KEY_LEFTSHIFT)?;
        }
        let result = self.tap_key(key);
        if shift {
            self.release_key(Key::KEY_LEFTSHIFT)?;
        }
        result.map(|_| key)
    }
}

/// A synthesizer shared by the engine and the substitution player.
pub type SharedSynthesizer = Arc<Mutex<dyn KeySynthesizer>>;

/// Create the uinput keyboard, ready to share.
pub fn create_shared_virtual_device(name: &str) -> Result<SharedSynthesizer, HookInstallationError> {
    let device = VirtualDevice::new_keyboard(name).map_err(HookInstallationError::VirtualDevice)?;
    Ok(Arc::new(Mutex::new(device)))
}

/// A virtual input device for injecting events
pub struct VirtualDevice {
    device: evdev::uinput::VirtualDevice,
}

impl VirtualDevice {
    pub fn new_keyboard(name: &str) -> std::io::Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 0..256u16 {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()?
            .name(name)
            .with_keys(&keys)?
            .build()?;

        tracing::info!("Created virtual keyboard '{}'", name);
        Ok(Self { device })
    }
}

impl KeySynthesizer for VirtualDevice {
    fn emit_key(&mut self, key: Key, value: i32) -> Result<(), SynthesisFailure> {
        let event = InputEvent::new(EventType::KEY, key.code(), value);
        let syn = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);
        self.device.emit(&[event, syn])?;
        Ok(())
    }
}
