//! Keystroke events, modifiers and shortcuts
//!
//! Raw evdev key codes are turned into [`KeyEvent`]s by a [`KeyTranslator`],
//! which follows the modifier and caps lock state of one keyboard and works
//! out the character a key produces on a US layout.

use std::collections::HashSet;
use std::fmt;

use evdev::Key;
use thiserror::Error;

use crate::keymap::{is_letter_key, key_to_char, key_name, parse_key};

/// Normalized modifier: left and right variants are the same modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Super,
}

impl Modifier {
    pub const ALL: [Modifier; 4] = [Modifier::Ctrl, Modifier::Shift, Modifier::Alt, Modifier::Super];

    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => Some(Modifier::Ctrl),
            Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => Some(Modifier::Shift),
            Key::KEY_LEFTALT | Key::KEY_RIGHTALT => Some(Modifier::Alt),
            Key::KEY_LEFTMETA | Key::KEY_RIGHTMETA => Some(Modifier::Super),
            _ => None,
        }
    }

    /// Parse a modifier name (case-insensitive).
    pub fn from_str_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "CTRL" | "CONTROL" => Some(Modifier::Ctrl),
            "SHIFT" => Some(Modifier::Shift),
            "ALT" => Some(Modifier::Alt),
            "SUPER" | "META" | "MOD" | "WIN" | "WINDOWS" => Some(Modifier::Super),
            _ => None,
        }
    }

    /// Left variant, used when synthesizing.
    pub fn to_key(self) -> Key {
        match self {
            Modifier::Ctrl => Key::KEY_LEFTCTRL,
            Modifier::Shift => Key::KEY_LEFTSHIFT,
            Modifier::Alt => Key::KEY_LEFTALT,
            Modifier::Super => Key::KEY_LEFTMETA,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Ctrl => write!(f, "Ctrl"),
            Modifier::Shift => write!(f, "Shift"),
            Modifier::Alt => write!(f, "Alt"),
            Modifier::Super => write!(f, "Super"),
        }
    }
}

/// Modifier state attached to a key event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub super_key: bool,
    pub caps_lock: bool,
}

impl Modifiers {
    pub fn contains(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Ctrl => self.ctrl,
            Modifier::Shift => self.shift,
            Modifier::Alt => self.alt,
            Modifier::Super => self.super_key,
        }
    }

    pub fn insert(&mut self, modifier: Modifier) -> bool {
        let slot = match modifier {
            Modifier::Ctrl => &mut self.ctrl,
            Modifier::Shift => &mut self.shift,
            Modifier::Alt => &mut self.alt,
            Modifier::Super => &mut self.super_key,
        };
        !std::mem::replace(slot, true)
    }

    /// Ctrl, Alt or Super held: keys run commands rather than type text.
    pub fn is_command(&self) -> bool {
        self.ctrl || self.alt || self.super_key
    }

    /// Same chord, lock keys aside.
    pub fn same_chord(&self, other: &Modifiers) -> bool {
        Modifier::ALL
            .iter()
            .all(|m| self.contains(*m) == other.contains(*m))
    }

    pub fn iter(&self) -> impl Iterator<Item = Modifier> + '_ {
        Modifier::ALL.into_iter().filter(|m| self.contains(*m))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Press,
    Release,
    Repeat,
}

impl KeyAction {
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyAction::Release),
            1 => Some(KeyAction::Press),
            2 => Some(KeyAction::Repeat),
            _ => None,
        }
    }

    /// evdev event value
    pub fn value(self) -> i32 {
        match self {
            KeyAction::Release => 0,
            KeyAction::Press => 1,
            KeyAction::Repeat => 2,
        }
    }

    /// Press or auto-repeat: the key takes effect.
    pub fn is_down(self) -> bool {
        !matches!(self, KeyAction::Release)
    }
}

/// Who generated a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    User,
    /// Injected by the substitution engine itself
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub action: KeyAction,
    pub modifiers: Modifiers,
    /// Character the event puts on screen, if any
    pub text: Option<char>,
    pub origin: Origin,
}

impl KeyEvent {
    pub fn user(key: Key, action: KeyAction, modifiers: Modifiers, text: Option<char>) -> Self {
        Self {
            key,
            action,
            modifiers,
            text,
            origin: Origin::User,
        }
    }

    /// A synthesized key press producing `text`.
    pub fn synthetic(key: Key, text: Option<char>) -> Self {
        Self {
            key,
            action: KeyAction::Press,
            modifiers: Modifiers::default(),
            text,
            origin: Origin::Synthetic,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == Origin::Synthetic
    }
}

/// Follows modifier and lock state for one keyboard.
#[derive(Debug, Default)]
pub struct KeyTranslator {
    held_modifiers: HashSet<Key>,
    caps_lock: bool,
}

impl KeyTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known caps lock state (read from the device LEDs).
    pub fn with_caps_lock(caps_lock: bool) -> Self {
        Self {
            caps_lock,
            ..Self::default()
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        let mut modifiers = Modifiers {
            caps_lock: self.caps_lock,
            ..Modifiers::default()
        };
        for key in &self.held_modifiers {
            if let Some(m) = Modifier::from_key(*key) {
                modifiers.insert(m);
            }
        }
        modifiers
    }

    /// Translate a raw key event. Returns `None` for values that are not
    /// press, release or repeat.
    pub fn translate(&mut self, key: Key, value: i32) -> Option<KeyEvent> {
        let action = KeyAction::from_value(value)?;

        if Modifier::from_key(key).is_some() {
            match action {
                KeyAction::Press | KeyAction::Repeat => {
                    self.held_modifiers.insert(key);
                }
                KeyAction::Release => {
                    self.held_modifiers.remove(&key);
                }
            }
        } else if key == Key::KEY_CAPSLOCK && action == KeyAction::Press {
            self.caps_lock = !self.caps_lock;
        }

        let modifiers = self.modifiers();
        let text = if action.is_down() && !modifiers.is_command() {
            let shift = modifiers.shift ^ (modifiers.caps_lock && is_letter_key(key));
            key_to_char(key, shift)
        } else {
            None
        };

        Some(KeyEvent::user(key, action, modifiers, text))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse shortcut '{input}': {reason}")]
pub struct ShortcutParseError {
    pub input: String,
    pub reason: String,
}

/// A key chord such as `Ctrl+Alt+Shift+B`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl Shortcut {
    pub fn new(key: Key) -> Self {
        Self {
            modifiers: Modifiers::default(),
            key,
        }
    }

    /// Parse `[Modifier+]...Key`. Modifier order does not matter; a lone
    /// modifier name is a key of its own.
    pub fn parse(input: &str) -> Result<Self, ShortcutParseError> {
        let input = input.trim();
        let error = |reason: String| ShortcutParseError {
            input: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(error("empty input".to_string()));
        }

        // A trailing '+' is the plus key itself ("Ctrl++")
        let (head, plus_key) = match input.strip_suffix("++") {
            Some(head) => (head, true),
            None if input == "+" => ("", true),
            None => (input, false),
        };

        let mut parts: Vec<&str> = if head.is_empty() {
            Vec::new()
        } else {
            head.split('+').map(str::trim).collect()
        };
        if parts.iter().any(|p| p.is_empty()) {
            return Err(error("empty component in shortcut".to_string()));
        }

        let key_name = if plus_key {
            "="
        } else {
            parts.pop().ok_or_else(|| error("no key".to_string()))?
        };

        let mut modifiers = Modifiers::default();
        for part in &parts {
            let modifier = Modifier::from_str_name(part)
                .ok_or_else(|| error(format!("'{}' is not a modifier", part)))?;
            if !modifiers.insert(modifier) {
                return Err(error(format!("duplicate modifier: {}", modifier)));
            }
        }

        let key = match Modifier::from_str_name(key_name) {
            Some(modifier) => modifier.to_key(),
            None => parse_key(key_name).ok_or_else(|| error(format!("unknown key: '{}'", key_name)))?,
        };
        if plus_key {
            modifiers.insert(Modifier::Shift);
        }

        Ok(Self { modifiers, key })
    }

    /// Does a key press trigger this shortcut?
    pub fn matches(&self, event: &KeyEvent) -> bool {
        event.key == self.key && event.modifiers.same_chord(&self.modifiers)
    }

    /// Keys to hold while tapping [`Shortcut::key`], in press order.
    pub fn modifier_keys(&self) -> Vec<Key> {
        self.modifiers.iter().map(Modifier::to_key).collect()
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in self.modifiers.iter() {
            write!(f, "{}+", modifier)?;
        }
        write!(f, "{}", key_name(self.key))
    }
}

impl std::str::FromStr for Shortcut {
    type Err = ShortcutParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Translation
    // ========================================================================

    #[test]
    fn test_translate_plain_letter() {
        let mut t = KeyTranslator::new();
        let ev = t.translate(Key::KEY_A, 1).unwrap();
        assert_eq!(ev.text, Some('a'));
        assert_eq!(ev.action, KeyAction::Press);
        assert_eq!(ev.origin, Origin::User);

        let ev = t.translate(Key::KEY_A, 0).unwrap();
        assert_eq!(ev.text, None);
        assert_eq!(ev.action, KeyAction::Release);
    }

    #[test]
    fn test_translate_shift_and_caps_lock() {
        let mut t = KeyTranslator::new();
        t.translate(Key::KEY_RIGHTSHIFT, 1);
        assert_eq!(t.translate(Key::KEY_A, 1).unwrap().text, Some('A'));
        assert_eq!(t.translate(Key::KEY_1, 1).unwrap().text, Some('!'));
        t.translate(Key::KEY_RIGHTSHIFT, 0);

        t.translate(Key::KEY_CAPSLOCK, 1);
        t.translate(Key::KEY_CAPSLOCK, 0);
        assert_eq!(t.translate(Key::KEY_A, 1).unwrap().text, Some('A'));
        // Caps lock does not shift digits
        assert_eq!(t.translate(Key::KEY_1, 1).unwrap().text, Some('1'));

        t.translate(Key::KEY_LEFTSHIFT, 1);
        assert_eq!(t.translate(Key::KEY_A, 1).unwrap().text, Some('a'));
    }

    #[test]
    fn test_translate_command_chord_has_no_text() {
        let mut t = KeyTranslator::new();
        t.translate(Key::KEY_LEFTCTRL, 1);
        let ev = t.translate(Key::KEY_C, 1).unwrap();
        assert!(ev.modifiers.ctrl);
        assert_eq!(ev.text, None);
    }

    #[test]
    fn test_right_alt_is_plain_alt() {
        let mut t = KeyTranslator::new();
        t.translate(Key::KEY_RIGHTALT, 1);
        let ev = t.translate(Key::KEY_E, 1).unwrap();
        assert!(ev.modifiers.alt);
        assert!(ev.modifiers.is_command());
        assert_eq!(ev.text, None);
    }

    #[test]
    fn test_left_and_right_modifiers_are_tracked_separately() {
        let mut t = KeyTranslator::new();
        t.translate(Key::KEY_LEFTSHIFT, 1);
        t.translate(Key::KEY_RIGHTSHIFT, 1);
        t.translate(Key::KEY_LEFTSHIFT, 0);
        assert!(t.modifiers().shift);
        t.translate(Key::KEY_RIGHTSHIFT, 0);
        assert!(!t.modifiers().shift);
    }

    #[test]
    fn test_translate_ignores_unknown_values() {
        let mut t = KeyTranslator::new();
        assert!(t.translate(Key::KEY_A, 7).is_none());
    }

    // ========================================================================
    // Shortcuts
    // ========================================================================

    #[test]
    fn test_parse_shortcut() {
        let s = Shortcut::parse("Ctrl+Alt+Shift+B").unwrap();
        assert!(s.modifiers.ctrl && s.modifiers.alt && s.modifiers.shift);
        assert!(!s.modifiers.super_key);
        assert_eq!(s.key, Key::KEY_B);
        assert_eq!(s.to_string(), "Ctrl+Shift+Alt+B");
        assert_eq!(
            s.modifier_keys(),
            vec![Key::KEY_LEFTCTRL, Key::KEY_LEFTSHIFT, Key::KEY_LEFTALT]
        );
    }

    #[test]
    fn test_parse_shortcut_order_independent() {
        assert_eq!(
            Shortcut::parse("Shift+Ctrl+V").unwrap(),
            Shortcut::parse("ctrl+shift+v").unwrap()
        );
    }

    #[test]
    fn test_parse_single_keys() {
        assert_eq!(Shortcut::parse("Enter").unwrap(), Shortcut::new(Key::KEY_ENTER));
        assert_eq!(Shortcut::parse("Ctrl").unwrap(), Shortcut::new(Key::KEY_LEFTCTRL));
        let plus = Shortcut::parse("Ctrl++").unwrap();
        assert_eq!(plus.key, Key::KEY_EQUAL);
        assert!(plus.modifiers.ctrl && plus.modifiers.shift);
    }

    #[test]
    fn test_parse_shortcut_errors() {
        assert!(Shortcut::parse("").is_err());
        assert!(Shortcut::parse("Ctrl+").is_err());
        assert!(Shortcut::parse("Ctrl+Ctrl+A").is_err());
        assert!(Shortcut::parse("A+B").is_err());
        let err = Shortcut::parse("Ctrl+Blorp").unwrap_err();
        assert!(err.reason.contains("unknown key"));
    }

    #[test]
    fn test_shortcut_matches_exact_chord() {
        let shortcut = Shortcut::parse("Ctrl+Alt+Shift+B").unwrap();
        let mut t = KeyTranslator::new();
        t.translate(Key::KEY_LEFTCTRL, 1);
        t.translate(Key::KEY_RIGHTALT, 1);
        t.translate(Key::KEY_LEFTSHIFT, 1);
        let ev = t.translate(Key::KEY_B, 1).unwrap();
        assert!(shortcut.matches(&ev));

        // Extra modifier: no match
        t.translate(Key::KEY_LEFTMETA, 1);
        let ev = t.translate(Key::KEY_B, 1).unwrap();
        assert!(!shortcut.matches(&ev));
    }

    #[test]
    fn test_shortcut_ignores_caps_lock() {
        let shortcut = Shortcut::parse("Ctrl+B").unwrap();
        let mut t = KeyTranslator::with_caps_lock(true);
        t.translate(Key::KEY_LEFTCTRL, 1);
        assert!(shortcut.matches(&t.translate(Key::KEY_B, 1).unwrap()));
    }
}
