//! Render preferences back to KDL and write them atomically

use std::io;
use std::path::Path;

use chrono::Utc;

use crate::error::ConfigError;
use crate::model::Preferences;

/// Quote a string as a KDL string literal.
fn kdl_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn kdl_path(path: &Path) -> String {
    kdl_string(&path.to_string_lossy())
}

/// Generate the preferences document.
pub fn generate_preferences(prefs: &Preferences) -> String {
    let mut output = String::new();

    output.push_str("// Beeftext preferences\n");
    output.push_str(&format!(
        "// Written: {}\n\n",
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    ));

    let sub = &prefs.substitution;
    output.push_str("substitution {\n");
    output.push_str(&format!("    automatic {}\n", sub.automatic));
    output.push_str(&format!("    use-clipboard {}\n", sub.use_clipboard));
    output.push_str(&format!(
        "    trigger-shortcut {}\n",
        kdl_string(&sub.trigger_shortcut)
    ));
    output.push_str(&format!(
        "    paste-shortcut {}\n",
        kdl_string(&sub.paste_shortcut)
    ));
    output.push_str(&format!("    keystroke-delay-ms {}\n", sub.keystroke_delay_ms));
    output.push_str(&format!(
        "    clipboard-restore-delay-ms {}\n",
        sub.clipboard_restore_delay_ms
    ));
    output.push_str("}\n\n");

    let list = &prefs.combo_list;
    output.push_str("combo-list {\n");
    output.push_str(&format!("    folder {}\n", kdl_path(&list.folder)));
    output.push_str(&format!("    auto-backup {}\n", list.auto_backup));
    output.push_str(&format!(
        "    last-import-export-path {}\n",
        kdl_path(&list.last_import_export_path)
    ));
    output.push_str("}\n\n");

    if !prefs.input.keyboards.is_empty() {
        output.push_str("input {\n");
        for keyboard in &prefs.input.keyboards {
            output.push_str(&format!("    keyboard {}\n", kdl_string(keyboard)));
        }
        output.push_str("}\n\n");
    }

    let app = &prefs.application;
    output.push_str("application {\n");
    output.push_str(&format!("    log-level {}\n", kdl_string(app.log_level.as_str())));
    output.push_str(&format!("    already-launched {}\n", app.already_launched));
    if let Some(path) = &app.file_marked_for_deletion {
        output.push_str(&format!("    file-marked-for-deletion {}\n", kdl_path(path)));
    }
    output.push_str("}\n");

    output
}

/// Check that generated KDL parses back.
fn validate_kdl(content: &str) -> Result<(), ConfigError> {
    content
        .parse::<kdl::KdlDocument>()
        .map_err(|e| ConfigError::Invalid {
            message: format!("Generated preferences are not valid KDL: {}", e),
        })?;
    Ok(())
}

/// Replace `path` with `content`: write a sibling temp file, then rename it
/// over the target. The original file survives any failure.
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let extension = match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    };
    let temp_path = path.with_extension(extension);

    if let Err(e) = std::fs::write(&temp_path, content) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

/// Write preferences to `path`.
pub fn write_preferences(prefs: &Preferences, path: &Path) -> Result<(), ConfigError> {
    let content = generate_preferences(prefs);
    validate_kdl(&content)?;
    write_atomic(path, content.as_bytes())?;
    tracing::debug!("Wrote preferences to {}", path.display());
    Ok(())
}
