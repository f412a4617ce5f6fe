//! Key name and character tables (US layout)

use std::str::FromStr;

use evdev::Key;

/// Keys producing text, with their unshifted and shifted characters.
const US_LAYOUT: &[(Key, char, char)] = &[
    (Key::KEY_A, 'a', 'A'),
    (Key::KEY_B, 'b', 'B'),
    (Key::KEY_C, 'c', 'C'),
    (Key::KEY_D, 'd', 'D'),
    (Key::KEY_E, 'e', 'E'),
    (Key::KEY_F, 'f', 'F'),
    (Key::KEY_G, 'g', 'G'),
    (Key::KEY_H, 'h', 'H'),
    (Key::KEY_I, 'i', 'I'),
    (Key::KEY_J, 'j', 'J'),
    (Key::KEY_K, 'k', 'K'),
    (Key::KEY_L, 'l', 'L'),
    (Key::KEY_M, 'm', 'M'),
    (Key::KEY_N, 'n', 'N'),
    (Key::KEY_O, 'o', 'O'),
    (Key::KEY_P, 'p', 'P'),
    (Key::KEY_Q, 'q', 'Q'),
    (Key::KEY_R, 'r', 'R'),
    (Key::KEY_S, 's', 'S'),
    (Key::KEY_T, 't', 'T'),
    (Key::KEY_U, 'u', 'U'),
    (Key::KEY_V, 'v', 'V'),
    (Key::KEY_W, 'w', 'W'),
    (Key::KEY_X, 'x', 'X'),
    (Key::KEY_Y, 'y', 'Y'),
    (Key::KEY_Z, 'z', 'Z'),
    (Key::KEY_1, '1', '!'),
    (Key::KEY_2, '2', '@'),
    (Key::KEY_3, '3', '#'),
    (Key::KEY_4, '4', '$'),
    (Key::KEY_5, '5', '%'),
    (Key::KEY_6, '6', '^'),
    (Key::KEY_7, '7', '&'),
    (Key::KEY_8, '8', '*'),
    (Key::KEY_9, '9', '('),
    (Key::KEY_0, '0', ')'),
    (Key::KEY_MINUS, '-', '_'),
    (Key::KEY_EQUAL, '=', '+'),
    (Key::KEY_LEFTBRACE, '[', '{'),
    (Key::KEY_RIGHTBRACE, ']', '}'),
    (Key::KEY_SEMICOLON, ';', ':'),
    (Key::KEY_APOSTROPHE, '\'', '"'),
    (Key::KEY_GRAVE, '`', '~'),
    (Key::KEY_BACKSLASH, '\\', '|'),
    (Key::KEY_COMMA, ',', '<'),
    (Key::KEY_DOT, '.', '>'),
    (Key::KEY_SLASH, '/', '?'),
    (Key::KEY_SPACE, ' ', ' '),
    (Key::KEY_ENTER, '\n', '\n'),
    (Key::KEY_KPENTER, '\n', '\n'),
    (Key::KEY_TAB, '\t', '\t'),
];

/// Character produced by `key`, given the effective shift state.
pub fn key_to_char(key: Key, shift: bool) -> Option<char> {
    US_LAYOUT
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, plain, shifted)| if shift { *shifted } else { *plain })
}

/// Key and shift state that type `c`.
pub fn char_to_key(c: char) -> Option<(Key, bool)> {
    US_LAYOUT.iter().find_map(|(key, plain, shifted)| {
        if *plain == c {
            Some((*key, false))
        } else if *shifted == c {
            Some((*key, true))
        } else {
            None
        }
    })
}

pub fn is_letter_key(key: Key) -> bool {
    key_to_char(key, false).is_some_and(|c| c.is_ascii_alphabetic())
}

pub fn is_modifier_key(key: Key) -> bool {
    matches!(
        key,
        Key::KEY_LEFTCTRL
            | Key::KEY_RIGHTCTRL
            | Key::KEY_LEFTSHIFT
            | Key::KEY_RIGHTSHIFT
            | Key::KEY_LEFTALT
            | Key::KEY_RIGHTALT
            | Key::KEY_LEFTMETA
            | Key::KEY_RIGHTMETA
            | Key::KEY_CAPSLOCK
            | Key::KEY_NUMLOCK
    )
}

/// Parse a key name (`Enter`, `F5`, `a`, `KEY_HOME`...) to an evdev key.
pub fn parse_key(name: &str) -> Option<Key> {
    let upper = name.to_uppercase();

    let named = match upper.as_str() {
        "ESCAPE" | "ESC" => Some(Key::KEY_ESC),
        "ENTER" | "RETURN" => Some(Key::KEY_ENTER),
        "TAB" => Some(Key::KEY_TAB),
        "SPACE" => Some(Key::KEY_SPACE),
        "BACKSPACE" => Some(Key::KEY_BACKSPACE),
        "CAPSLOCK" | "CAPS_LOCK" | "CAPS" => Some(Key::KEY_CAPSLOCK),
        "UP" | "UPARROW" => Some(Key::KEY_UP),
        "DOWN" | "DOWNARROW" => Some(Key::KEY_DOWN),
        "LEFT" | "LEFTARROW" => Some(Key::KEY_LEFT),
        "RIGHT" | "RIGHTARROW" => Some(Key::KEY_RIGHT),
        "HOME" => Some(Key::KEY_HOME),
        "END" => Some(Key::KEY_END),
        "PAGEUP" | "PGUP" => Some(Key::KEY_PAGEUP),
        "PAGEDOWN" | "PGDN" | "PGDOWN" => Some(Key::KEY_PAGEDOWN),
        "INSERT" | "INS" => Some(Key::KEY_INSERT),
        "DELETE" | "DEL" => Some(Key::KEY_DELETE),
        "MINUS" => Some(Key::KEY_MINUS),
        "EQUALS" | "EQUAL" => Some(Key::KEY_EQUAL),
        "COMMA" => Some(Key::KEY_COMMA),
        "DOT" | "PERIOD" => Some(Key::KEY_DOT),
        "SLASH" => Some(Key::KEY_SLASH),
        "BACKSLASH" => Some(Key::KEY_BACKSLASH),
        "SEMICOLON" => Some(Key::KEY_SEMICOLON),
        "APOSTROPHE" => Some(Key::KEY_APOSTROPHE),
        "GRAVE" => Some(Key::KEY_GRAVE),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    // F1-F24
    if let Some(n) = upper.strip_prefix('F').and_then(|n| n.parse::<u16>().ok()) {
        return match n {
            1..=10 => Some(Key::new(Key::KEY_F1.code() + n - 1)),
            11 => Some(Key::KEY_F11),
            12 => Some(Key::KEY_F12),
            13..=24 => Some(Key::new(Key::KEY_F13.code() + n - 13)),
            _ => None,
        };
    }

    // Single printable character
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some((key, _)) = char_to_key(c.to_ascii_lowercase()) {
            return Some(key);
        }
    }

    // Raw kernel names as an escape hatch
    if upper.starts_with("KEY_") {
        return Key::from_str(&upper).ok();
    }

    tracing::warn!("Unknown key: {}", name);
    None
}

/// Display name of a key, without the `KEY_` prefix.
pub fn key_name(key: Key) -> String {
    let name = format!("{:?}", key);
    match name.strip_prefix("KEY_") {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_to_key() {
        assert_eq!(char_to_key('a'), Some((Key::KEY_A, false)));
        assert_eq!(char_to_key('A'), Some((Key::KEY_A, true)));
        assert_eq!(char_to_key('?'), Some((Key::KEY_SLASH, true)));
        assert_eq!(char_to_key(' '), Some((Key::KEY_SPACE, false)));
        assert_eq!(char_to_key('\n'), Some((Key::KEY_ENTER, false)));
        assert_eq!(char_to_key('é'), None);
    }

    #[test]
    fn test_key_to_char() {
        assert_eq!(key_to_char(Key::KEY_B, false), Some('b'));
        assert_eq!(key_to_char(Key::KEY_B, true), Some('B'));
        assert_eq!(key_to_char(Key::KEY_1, true), Some('!'));
        assert_eq!(key_to_char(Key::KEY_LEFT, false), None);
    }

    #[test]
    fn test_every_printable_ascii_is_typeable() {
        for c in (0x20u8..0x7f).map(char::from) {
            let (key, shift) = char_to_key(c).unwrap();
            assert_eq!(key_to_char(key, shift), Some(c));
        }
    }

    #[test]
    fn test_parse_key_basic() {
        assert_eq!(parse_key("CapsLock"), Some(Key::KEY_CAPSLOCK));
        assert_eq!(parse_key("Escape"), Some(Key::KEY_ESC));
        assert_eq!(parse_key("A"), Some(Key::KEY_A));
        assert_eq!(parse_key("b"), Some(Key::KEY_B));
        assert_eq!(parse_key("5"), Some(Key::KEY_5));
        assert_eq!(parse_key("Return"), Some(Key::KEY_ENTER));
    }

    #[test]
    fn test_parse_function_keys() {
        assert_eq!(parse_key("F1"), Some(Key::KEY_F1));
        assert_eq!(parse_key("F10"), Some(Key::KEY_F10));
        assert_eq!(parse_key("F11"), Some(Key::KEY_F11));
        assert_eq!(parse_key("F13"), Some(Key::KEY_F13));
        assert_eq!(parse_key("F24"), Some(Key::KEY_F24));
        assert_eq!(parse_key("F25"), None);
    }

    #[test]
    fn test_parse_raw_kernel_names() {
        assert_eq!(parse_key("KEY_HOME"), Some(Key::KEY_HOME));
        assert_eq!(parse_key("key_volumeup"), Some(Key::KEY_VOLUMEUP));
        assert_eq!(parse_key("KEY_NOT_A_KEY"), None);
        assert_eq!(parse_key("Blorp"), None);
    }

    #[test]
    fn test_key_name() {
        assert_eq!(key_name(Key::KEY_ENTER), "ENTER");
    }
}
