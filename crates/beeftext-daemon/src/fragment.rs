//! Fragment rendering
//!
//! [`render`] is the one place that knows what each fragment kind does. It
//! drives a [`Player`], which owns the keyboard and clipboard for the length
//! of a substitution.

use std::fmt::Write as _;
use std::time::Duration;

use beeftext_config::Fragment;
use chrono::{DateTime, Local};
use thiserror::Error;

use crate::error::{ClipboardAccessError, SynthesisFailure};
use crate::input::{Shortcut, ShortcutParseError};
use crate::matcher::ComboSnapshot;
use crate::substitution::Player;

/// How deep `#{combo:...}` may nest before expansion stops.
pub const MAX_NESTING_DEPTH: usize = 8;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M:%S";
pub const DEFAULT_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum FragmentError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisFailure),

    #[error(transparent)]
    Clipboard(#[from] ClipboardAccessError),

    #[error(transparent)]
    Shortcut(#[from] ShortcutParseError),

    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Variable '{0}' needs an argument")]
    MissingArgument(String),
}

/// What a variable expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    Text(String),
    Keys(Shortcut),
}

/// Inputs variables are resolved against.
pub struct Variables<'a> {
    pub combos: &'a ComboSnapshot,
    pub clipboard: &'a dyn Fn() -> Option<String>,
    pub now: DateTime<Local>,
}

fn format_time(now: &DateTime<Local>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() {
        tracing::warn!("Invalid date/time format '{}'", format);
        out.clear();
        let _ = write!(out, "{}", now.format(DEFAULT_DATE_TIME_FORMAT));
    }
    out
}

fn required<'s>(name: &str, arg: Option<&'s str>) -> Result<&'s str, FragmentError> {
    arg.filter(|a| !a.is_empty())
        .ok_or_else(|| FragmentError::MissingArgument(name.to_string()))
}

/// Resolve a variable. `depth` counts enclosing combo expansions.
pub fn resolve_variable(
    name: &str,
    arg: Option<&str>,
    vars: &Variables<'_>,
    depth: usize,
) -> Result<VariableValue, FragmentError> {
    let text = match name {
        "clipboard" => (vars.clipboard)().unwrap_or_default(),
        "date" => format_time(&vars.now, arg.unwrap_or(DEFAULT_DATE_FORMAT)),
        "time" => format_time(&vars.now, arg.unwrap_or(DEFAULT_TIME_FORMAT)),
        "dateTime" => format_time(&vars.now, arg.unwrap_or(DEFAULT_DATE_TIME_FORMAT)),
        "key" => return Ok(VariableValue::Keys(Shortcut::parse(required(name, arg)?)?)),
        "envVar" => std::env::var(required(name, arg)?).unwrap_or_default(),
        "combo" => nested_text(required(name, arg)?, vars, depth),
        "upper" => nested_text(required(name, arg)?, vars, depth).to_uppercase(),
        "lower" => nested_text(required(name, arg)?, vars, depth).to_lowercase(),
        "trim" => nested_text(required(name, arg)?, vars, depth).trim().to_string(),
        _ => return Err(FragmentError::UnknownVariable(name.to_string())),
    };
    Ok(VariableValue::Text(text))
}

/// Text of another combo. Delays, cursor moves and key presses have no text
/// and are dropped.
fn nested_text(keyword: &str, vars: &Variables<'_>, depth: usize) -> String {
    if depth >= MAX_NESTING_DEPTH {
        tracing::warn!(
            "Combo nesting deeper than {} levels at '{}', expanding to nothing",
            MAX_NESTING_DEPTH,
            keyword
        );
        return String::new();
    }

    let Some(fragments) = vars.combos.lookup_keyword(keyword) else {
        tracing::debug!("No combo with keyword '{}' to insert", keyword);
        return String::new();
    };

    let mut out = String::new();
    for fragment in fragments.iter() {
        match fragment {
            Fragment::Text { text } | Fragment::ClipboardPaste { text } => out.push_str(text),
            Fragment::Variable { name, arg } => {
                match resolve_variable(name, arg.as_deref(), vars, depth + 1) {
                    Ok(VariableValue::Text(text)) => out.push_str(&text),
                    Ok(VariableValue::Keys(_)) => {}
                    Err(e) => tracing::warn!("In nested combo '{}': {}", keyword, e),
                }
            }
            Fragment::Delay { .. } | Fragment::CursorMove { .. } => {}
        }
    }
    out
}

/// Play one fragment.
pub async fn render(fragment: &Fragment, player: &mut Player) -> Result<(), FragmentError> {
    match fragment {
        Fragment::Text { text } => player.insert_text(text).await,
        Fragment::Delay { ms } => {
            player.delay(Duration::from_millis(*ms)).await;
            Ok(())
        }
        Fragment::ClipboardPaste { text } => player.paste_text(text).await,
        Fragment::CursorMove { offset } => player.move_cursor(*offset).await,
        Fragment::Variable { name, arg } => {
            let value = {
                let clipboard = || player.original_clipboard_text();
                let vars = Variables {
                    combos: player.combos(),
                    clipboard: &clipboard,
                    now: Local::now(),
                };
                resolve_variable(name, arg.as_deref(), &vars, 0)?
            };
            match value {
                VariableValue::Text(text) => player.insert_text(&text).await,
                VariableValue::Keys(shortcut) => player.press_shortcut(&shortcut).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beeftext_config::{Combo, ComboList};
    use chrono::TimeZone;
    use evdev::Key;

    fn snapshot(combos: Vec<Combo>) -> ComboSnapshot {
        ComboSnapshot::from_list(&ComboList {
            combos,
            ..ComboList::default()
        })
    }

    fn snippet_combo(keyword: &str, snippet: &str) -> Combo {
        Combo {
            fragments: Vec::new(),
            snippet: Some(snippet.to_string()),
            ..Combo::new(keyword, keyword, "")
        }
    }

    fn resolve(name: &str, arg: Option<&str>, combos: &ComboSnapshot) -> Result<VariableValue, FragmentError> {
        let clipboard = || Some("clip".to_string());
        let vars = Variables {
            combos,
            clipboard: &clipboard,
            now: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
        };
        resolve_variable(name, arg, &vars, 0)
    }

    fn text(s: &str) -> VariableValue {
        VariableValue::Text(s.to_string())
    }

    #[test]
    fn test_date_and_time() {
        let empty = ComboSnapshot::empty();
        assert_eq!(resolve("date", None, &empty).unwrap(), text("2024-03-09"));
        assert_eq!(resolve("time", None, &empty).unwrap(), text("14:05:07"));
        assert_eq!(resolve("dateTime", None, &empty).unwrap(), text("2024-03-09 14:05:07"));
        assert_eq!(resolve("dateTime", Some("%d/%m"), &empty).unwrap(), text("09/03"));
    }

    #[test]
    fn test_invalid_format_falls_back() {
        let empty = ComboSnapshot::empty();
        assert_eq!(
            resolve("dateTime", Some("%Q%"), &empty).unwrap(),
            text("2024-03-09 14:05:07")
        );
    }

    #[test]
    fn test_clipboard_and_env() {
        let empty = ComboSnapshot::empty();
        assert_eq!(resolve("clipboard", None, &empty).unwrap(), text("clip"));
        std::env::set_var("BEEFTEXT_FRAGMENT_TEST", "value");
        assert_eq!(
            resolve("envVar", Some("BEEFTEXT_FRAGMENT_TEST"), &empty).unwrap(),
            text("value")
        );
        assert_eq!(resolve("envVar", Some("BEEFTEXT_UNSET_VAR"), &empty).unwrap(), text(""));
    }

    #[test]
    fn test_key_variable() {
        let empty = ComboSnapshot::empty();
        match resolve("key", Some("Ctrl+A"), &empty).unwrap() {
            VariableValue::Keys(s) => {
                assert_eq!(s.key, Key::KEY_A);
                assert!(s.modifiers.ctrl);
            }
            other => panic!("Expected keys, got {:?}", other),
        }
        assert!(matches!(
            resolve("key", Some("Ctrl+Nope"), &empty),
            Err(FragmentError::Shortcut(_))
        ));
        assert!(matches!(
            resolve("key", None, &empty),
            Err(FragmentError::MissingArgument(_))
        ));
    }

    #[test]
    fn test_nested_combos() {
        let combos = snapshot(vec![
            Combo::new("name", "nm", "  Jane Doe "),
            snippet_combo("sig", "Regards,#{delay:10} #{combo:nm}"),
        ]);
        assert_eq!(resolve("combo", Some("nm"), &combos).unwrap(), text("  Jane Doe "));
        assert_eq!(resolve("trim", Some("nm"), &combos).unwrap(), text("Jane Doe"));
        assert_eq!(resolve("upper", Some("nm"), &combos).unwrap(), text("  JANE DOE "));
        assert_eq!(resolve("lower", Some("nm"), &combos).unwrap(), text("  jane doe "));
        assert_eq!(
            resolve("combo", Some("sig"), &combos).unwrap(),
            text("Regards,   Jane Doe ")
        );
        assert_eq!(resolve("combo", Some("missing"), &combos).unwrap(), text(""));
    }

    #[test]
    fn test_recursive_combo_terminates() {
        let combos = snapshot(vec![
            snippet_combo("a", "a#{combo:b}"),
            snippet_combo("b", "b#{combo:a}"),
        ]);
        let VariableValue::Text(out) = resolve("combo", Some("a"), &combos).unwrap() else {
            panic!("Expected text");
        };
        assert_eq!(out.len(), MAX_NESTING_DEPTH);
        assert!(out.starts_with("abab"));
    }

    #[test]
    fn test_unknown_variable() {
        let empty = ComboSnapshot::empty();
        assert!(matches!(
            resolve("weather", None, &empty),
            Err(FragmentError::UnknownVariable(name)) if name == "weather"
        ));
    }
}
