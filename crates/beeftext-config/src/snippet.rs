//! Snippet strings
//!
//! A snippet is plain text with `#{...}` placeholders, turned into the same
//! fragment sequence an explicit `fragments` array would give:
//!
//! - `#{delay:MS}` pauses playback
//! - `#{cursor}` leaves the caret at that position once the text is typed
//! - `#{key:SHORTCUT}` presses a key or shortcut
//! - `#{clipboard}`, `#{date}`, `#{time}`, `#{dateTime}`, `#{dateTime:FMT}`
//! - `#{combo:KW}`, `#{upper:KW}`, `#{lower:KW}`, `#{trim:KW}` insert another combo
//! - `#{envVar:NAME}` inserts an environment variable
//!
//! `##{` stands for a literal `#{`. Anything not recognised stays literal.

use crate::combo_list::Fragment;

#[derive(Default)]
struct Builder {
    fragments: Vec<Fragment>,
    text: String,
    /// Characters of literal text produced since the cursor marker
    after_cursor: Option<usize>,
}

impl Builder {
    fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
        if let Some(count) = self.after_cursor.as_mut() {
            *count += s.chars().count();
        }
    }

    fn flush(&mut self) {
        if !self.text.is_empty() {
            self.fragments.push(Fragment::Text {
                text: std::mem::take(&mut self.text),
            });
        }
    }

    fn push(&mut self, fragment: Fragment) {
        self.flush();
        self.fragments.push(fragment);
    }

    fn finish(mut self) -> Vec<Fragment> {
        self.flush();
        if let Some(count) = self.after_cursor.filter(|n| *n > 0) {
            let offset = i32::try_from(count).unwrap_or(i32::MAX);
            self.fragments.push(Fragment::CursorMove { offset: -offset });
        }
        self.fragments
    }
}

fn variable(name: &str, arg: Option<&str>) -> Fragment {
    Fragment::Variable {
        name: name.to_string(),
        arg: arg.map(String::from),
    }
}

/// Map the inside of a placeholder to a fragment. `None` for the cursor
/// marker, `Err(())` when the placeholder is not recognised.
fn placeholder(body: &str) -> Result<Option<Fragment>, ()> {
    let (name, arg) = match body.split_once(':') {
        Some((name, arg)) => (name.trim(), Some(arg)),
        None => (body.trim(), None),
    };

    match (name, arg) {
        ("cursor", None) => Ok(None),
        ("delay", Some(ms)) => ms
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Fragment::Delay { ms }))
            .map_err(|_| ()),
        ("clipboard" | "date" | "time", None) => Ok(Some(variable(name, None))),
        ("dateTime", arg) => Ok(Some(variable(name, arg.filter(|a| !a.is_empty())))),
        ("key" | "combo" | "upper" | "lower" | "trim" | "envVar", Some(arg)) if !arg.is_empty() => {
            Ok(Some(variable(name, Some(arg))))
        }
        _ => Err(()),
    }
}

/// Parse a snippet into fragments.
pub fn parse_snippet(snippet: &str) -> Vec<Fragment> {
    let mut builder = Builder::default();
    let mut rest = snippet;

    while let Some(pos) = rest.find("#{") {
        // `##{` escapes the placeholder opener
        if pos > 0 && rest.as_bytes()[pos - 1] == b'#' {
            builder.push_str(&rest[..pos - 1]);
            builder.push_str("#{");
            rest = &rest[pos + 2..];
            continue;
        }

        builder.push_str(&rest[..pos]);
        let after_open = &rest[pos + 2..];
        let Some(close) = after_open.find('}') else {
            builder.push_str(&rest[pos..]);
            rest = "";
            break;
        };

        let body = &after_open[..close];
        match placeholder(body) {
            Ok(Some(fragment)) => builder.push(fragment),
            Ok(None) => {
                if builder.after_cursor.is_none() {
                    builder.after_cursor = Some(0);
                }
            }
            Err(()) => {
                tracing::debug!("Keeping unknown snippet placeholder #{{{}}} as text", body);
                builder.push_str(&rest[pos..pos + 2 + close + 1]);
            }
        }
        rest = &after_open[close + 1..];
    }

    builder.push_str(rest);
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, arg: Option<&str>) -> Fragment {
        variable(name, arg)
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(parse_snippet("hello"), vec![Fragment::text("hello")]);
        assert!(parse_snippet("").is_empty());
    }

    #[test]
    fn test_delay_splits_text() {
        assert_eq!(
            parse_snippet("wait#{delay:500}done"),
            vec![
                Fragment::text("wait"),
                Fragment::Delay { ms: 500 },
                Fragment::text("done"),
            ]
        );
    }

    #[test]
    fn test_cursor_moves_back_over_trailing_text() {
        assert_eq!(
            parse_snippet("<b>#{cursor}</b>"),
            vec![
                Fragment::text("<b></b>"),
                Fragment::CursorMove { offset: -4 },
            ]
        );
        // Nothing after the marker means no move
        assert_eq!(parse_snippet("end#{cursor}"), vec![Fragment::text("end")]);
    }

    #[test]
    fn test_variables() {
        assert_eq!(
            parse_snippet("#{date} #{dateTime:%H:%M} #{envVar:HOME}#{key:Ctrl+A}"),
            vec![
                var("date", None),
                Fragment::text(" "),
                var("dateTime", Some("%H:%M")),
                Fragment::text(" "),
                var("envVar", Some("HOME")),
                var("key", Some("Ctrl+A")),
            ]
        );
        assert_eq!(parse_snippet("#{dateTime}"), vec![var("dateTime", None)]);
        assert_eq!(parse_snippet("#{upper:sig}"), vec![var("upper", Some("sig"))]);
    }

    #[test]
    fn test_escaped_opener() {
        assert_eq!(parse_snippet("a ##{date} b"), vec![Fragment::text("a #{date} b")]);
    }

    #[test]
    fn test_unknown_placeholders_stay_literal() {
        assert_eq!(
            parse_snippet("x #{bogus} #{delay:soon} #{envVar:} y"),
            vec![Fragment::text("x #{bogus} #{delay:soon} #{envVar:} y")]
        );
    }

    #[test]
    fn test_unterminated_placeholder() {
        assert_eq!(parse_snippet("a #{date"), vec![Fragment::text("a #{date")]);
    }
}
