//! KDL preferences parser
//!
//! Reading is forgiving about values: a preference whose value has the wrong
//! type falls back to its default with a warning, so one bad line never costs
//! the user the rest of their settings. Only a document that is not valid KDL
//! is an error.

use std::path::Path;

use crate::error::ConfigError;
use crate::model::*;
use crate::paths;

/// Parse the preferences file at `path`. A missing file yields the defaults.
pub fn parse_preferences(path: &Path) -> Result<Preferences, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_preferences_str(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(
                "No preferences file at {}, using defaults",
                path.display()
            );
            Ok(Preferences::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Parse preferences from a string
pub fn parse_preferences_str(content: &str) -> Result<Preferences, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl uses an older miette version, so rebuild the span from offset/len
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut prefs = Preferences::default();

    for node in doc.nodes() {
        match node.name().value() {
            "substitution" => parse_substitution(node, &mut prefs.substitution),
            "combo-list" => parse_combo_list(node, &mut prefs.combo_list),
            "input" => parse_input(node, &mut prefs.input),
            "application" => parse_application(node, &mut prefs.application),
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(prefs)
}

fn parse_substitution(node: &kdl::KdlNode, out: &mut SubstitutionPreferences) {
    for child in children(node) {
        match child.name().value() {
            "automatic" => read_bool(child, &mut out.automatic),
            "use-clipboard" => read_bool(child, &mut out.use_clipboard),
            "trigger-shortcut" => read_string(child, &mut out.trigger_shortcut),
            "paste-shortcut" => read_string(child, &mut out.paste_shortcut),
            "keystroke-delay-ms" => read_u64(child, &mut out.keystroke_delay_ms),
            "clipboard-restore-delay-ms" => read_u64(child, &mut out.clipboard_restore_delay_ms),
            name => {
                tracing::warn!("Unknown substitution option: {}", name);
            }
        }
    }
}

fn parse_combo_list(node: &kdl::KdlNode, out: &mut ComboListPreferences) {
    for child in children(node) {
        match child.name().value() {
            "folder" => read_path(child, &mut out.folder),
            "auto-backup" => read_bool(child, &mut out.auto_backup),
            "last-import-export-path" => read_path(child, &mut out.last_import_export_path),
            name => {
                tracing::warn!("Unknown combo-list option: {}", name);
            }
        }
    }
}

fn parse_input(node: &kdl::KdlNode, out: &mut InputPreferences) {
    for child in children(node) {
        match child.name().value() {
            "keyboard" => match first_string(child) {
                Some(name) => out.keyboards.push(name.to_string()),
                None => warn_type(child, "a device name"),
            },
            name => {
                tracing::warn!("Unknown input option: {}", name);
            }
        }
    }
}

fn parse_application(node: &kdl::KdlNode, out: &mut ApplicationPreferences) {
    for child in children(node) {
        match child.name().value() {
            "log-level" => match first_string(child).map(str::parse::<LogLevel>) {
                Some(Ok(level)) => out.log_level = level,
                Some(Err(e)) => tracing::warn!("{}, keeping {}", e, out.log_level),
                None => warn_type(child, "a string"),
            },
            "already-launched" => read_bool(child, &mut out.already_launched),
            "file-marked-for-deletion" => match first_string(child) {
                Some(path) if !path.is_empty() => {
                    out.file_marked_for_deletion = Some(paths::expand(path))
                }
                Some(_) => out.file_marked_for_deletion = None,
                None => warn_type(child, "a path"),
            },
            name => {
                tracing::warn!("Unknown application option: {}", name);
            }
        }
    }
}

fn children(node: &kdl::KdlNode) -> impl Iterator<Item = &kdl::KdlNode> {
    node.children()
        .map(|doc| doc.nodes())
        .unwrap_or_default()
        .iter()
}

fn first_string(node: &kdl::KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

fn warn_type(node: &kdl::KdlNode, expected: &str) {
    tracing::warn!(
        "Preference '{}' should be {}, using the default value",
        node.name().value(),
        expected
    );
}

fn read_bool(node: &kdl::KdlNode, out: &mut bool) {
    match node.entries().first().and_then(|e| e.value().as_bool()) {
        Some(value) => *out = value,
        None => warn_type(node, "true or false"),
    }
}

fn read_u64(node: &kdl::KdlNode, out: &mut u64) {
    match node
        .entries()
        .first()
        .and_then(|e| e.value().as_i64())
        .and_then(|v| u64::try_from(v).ok())
    {
        Some(value) => *out = value,
        None => warn_type(node, "a non-negative integer"),
    }
}

fn read_string(node: &kdl::KdlNode, out: &mut String) {
    match first_string(node) {
        Some(value) => *out = value.to_string(),
        None => warn_type(node, "a string"),
    }
}

fn read_path(node: &kdl::KdlNode, out: &mut std::path::PathBuf) {
    match first_string(node) {
        Some(value) => *out = paths::expand(value),
        None => warn_type(node, "a path"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_basic_preferences() {
        let config = r#"
            substitution {
                automatic false
                use-clipboard false
                trigger-shortcut "Ctrl+Space"
                keystroke-delay-ms 5
            }

            combo-list {
                folder "/srv/beeftext"
                auto-backup false
            }

            application {
                log-level "debug"
                already-launched true
            }
        "#;

        let prefs = parse_preferences_str(config).unwrap();
        assert!(!prefs.substitution.automatic);
        assert!(!prefs.substitution.use_clipboard);
        assert_eq!(prefs.substitution.trigger_shortcut, "Ctrl+Space");
        assert_eq!(prefs.substitution.keystroke_delay_ms, 5);
        assert_eq!(prefs.combo_list.folder, PathBuf::from("/srv/beeftext"));
        assert!(!prefs.combo_list.auto_backup);
        assert_eq!(prefs.application.log_level, LogLevel::Debug);
        assert!(prefs.application.already_launched);
        assert_eq!(
            prefs.combo_list_path(),
            PathBuf::from("/srv/beeftext/comboList.json")
        );
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        let prefs = parse_preferences_str("").unwrap();
        assert_eq!(prefs, Preferences::default());
        assert!(prefs.substitution.automatic);
        assert!(prefs.substitution.use_clipboard);
        assert_eq!(prefs.substitution.trigger_shortcut, DEFAULT_TRIGGER_SHORTCUT);
    }

    #[test]
    fn test_wrong_value_type_falls_back_to_default() {
        let config = r#"
            substitution {
                automatic "yes"
                keystroke-delay-ms -4
                clipboard-restore-delay-ms 150
            }
        "#;

        let prefs = parse_preferences_str(config).unwrap();
        // Bad values keep their defaults, good ones still apply
        assert!(prefs.substitution.automatic);
        assert_eq!(prefs.substitution.keystroke_delay_ms, 0);
        assert_eq!(prefs.substitution.clipboard_restore_delay_ms, 150);
    }

    #[test]
    fn test_unknown_log_level_keeps_default() {
        let config = r#"
            application {
                log-level "chatty"
            }
        "#;

        let prefs = parse_preferences_str(config).unwrap();
        assert_eq!(prefs.application.log_level, LogLevel::Info);
    }

    #[test]
    fn test_multiple_keyboards() {
        let config = r#"
            input {
                keyboard "AT Translated Set 2 keyboard"
                keyboard "Keychron K3 Pro"
            }
        "#;

        let prefs = parse_preferences_str(config).unwrap();
        assert_eq!(
            prefs.input.keyboards,
            vec![
                "AT Translated Set 2 keyboard".to_string(),
                "Keychron K3 Pro".to_string()
            ]
        );
    }

    #[test]
    fn test_file_marked_for_deletion() {
        let config = r#"
            application {
                file-marked-for-deletion "/tmp/beeftext-update.bin"
            }
        "#;

        let prefs = parse_preferences_str(config).unwrap();
        assert_eq!(
            prefs.application.file_marked_for_deletion,
            Some(PathBuf::from("/tmp/beeftext-update.bin"))
        );
    }

    #[test]
    fn test_invalid_kdl_is_an_error() {
        let result = parse_preferences_str("substitution {\n    automatic true\n");
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefs = parse_preferences(&dir.path().join("missing.kdl")).unwrap();
        assert_eq!(prefs, Preferences::default());
    }
}
