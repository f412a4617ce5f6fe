//! Combo list model and JSON storage

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ComboListError;
use crate::snippet::parse_snippet;
use crate::writer::write_atomic;

/// Combo list file format version written by this crate.
pub const COMBO_LIST_VERSION: u32 = 1;

/// Longest delay a single fragment may request.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Variable names a `variable` fragment may carry.
pub const VARIABLE_NAMES: &[&str] = &[
    "clipboard",
    "date",
    "time",
    "dateTime",
    "key",
    "combo",
    "upper",
    "lower",
    "trim",
    "envVar",
];

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    COMBO_LIST_VERSION
}

/// The whole combo list document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboList {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub combos: Vec<Combo>,
}

impl Default for ComboList {
    fn default() -> Self {
        Self {
            version: COMBO_LIST_VERSION,
            groups: Vec::new(),
            combos: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub keyword: String,
    #[serde(default)]
    pub case_sensitive: bool,
    /// The character before the keyword must not be alphanumeric.
    #[serde(default)]
    pub word_boundary: bool,
    /// When false the keyword only fires once followed by a delimiter.
    #[serde(default = "default_true")]
    pub exact_end: bool,
}

impl Trigger {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            case_sensitive: false,
            word_boundary: false,
            exact_end: true,
        }
    }
}

/// One step of a combo's expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fragment {
    Text { text: String },
    Delay { ms: u64 },
    ClipboardPaste { text: String },
    /// Move the caret horizontally; negative is left.
    CursorMove { offset: i32 },
    Variable {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<String>,
    },
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<Fragment>,
    /// Text with `#{...}` placeholders, used when `fragments` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl Combo {
    /// A combo expanding `keyword` to plain text.
    pub fn new(id: impl Into<String>, keyword: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            trigger: Trigger::new(keyword),
            group: None,
            enabled: true,
            fragments: vec![Fragment::text(text)],
            snippet: None,
            created: None,
            modified: None,
        }
    }

    /// The fragment sequence to play, parsing the snippet if needed.
    pub fn resolved_fragments(&self) -> Vec<Fragment> {
        if !self.fragments.is_empty() {
            return self.fragments.clone();
        }
        match &self.snippet {
            Some(snippet) => parse_snippet(snippet),
            None => Vec::new(),
        }
    }

    /// Timestamp used to order combos, newest edit first.
    pub fn last_edited(&self) -> Option<DateTime<Utc>> {
        self.modified.or(self.created)
    }
}

impl ComboList {
    pub fn combo(&self, id: &str) -> Option<&Combo> {
        self.combos.iter().find(|c| c.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// A combo takes part in matching when it and its group are enabled.
    pub fn is_active(&self, combo: &Combo) -> bool {
        combo.enabled
            && combo
                .group
                .as_deref()
                .and_then(|id| self.group(id))
                .map_or(true, |g| g.enabled)
    }

    /// Combos taking part in matching, in list order.
    pub fn active_combos(&self) -> impl Iterator<Item = &Combo> {
        self.combos.iter().filter(|c| self.is_active(c))
    }

    pub fn set_combo_enabled(&mut self, id: &str, enabled: bool) -> Result<(), ComboListError> {
        let combo = self
            .combos
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ComboListError::UnknownCombo { id: id.to_string() })?;
        combo.enabled = enabled;
        combo.modified = Some(Utc::now());
        Ok(())
    }

    pub fn set_group_enabled(&mut self, id: &str, enabled: bool) -> Result<(), ComboListError> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| ComboListError::UnknownGroup { id: id.to_string() })?;
        group.enabled = enabled;
        Ok(())
    }

    /// Check structural rules that JSON decoding alone cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.version > COMBO_LIST_VERSION {
            return Err(format!(
                "unsupported version {} (newest known is {})",
                self.version, COMBO_LIST_VERSION
            ));
        }

        let mut group_ids = HashSet::new();
        for group in &self.groups {
            if group.id.is_empty() {
                return Err("group with an empty id".to_string());
            }
            if !group_ids.insert(group.id.as_str()) {
                return Err(format!("duplicate group id '{}'", group.id));
            }
        }

        let mut combo_ids = HashSet::new();
        for combo in &self.combos {
            if combo.id.is_empty() {
                return Err("combo with an empty id".to_string());
            }
            if !combo_ids.insert(combo.id.as_str()) {
                return Err(format!("duplicate combo id '{}'", combo.id));
            }
            if combo.trigger.keyword.is_empty() {
                return Err(format!("combo '{}' has an empty keyword", combo.id));
            }
            if let Some(group) = &combo.group {
                if !group_ids.contains(group.as_str()) {
                    return Err(format!(
                        "combo '{}' refers to unknown group '{}'",
                        combo.id, group
                    ));
                }
            }
            if combo.fragments.is_empty() && combo.snippet.is_none() {
                return Err(format!("combo '{}' has no fragments or snippet", combo.id));
            }
            // Snippets are checked as the fragments they expand to
            for fragment in &combo.resolved_fragments() {
                match fragment {
                    Fragment::Delay { ms } if *ms > MAX_DELAY_MS => {
                        return Err(format!(
                            "combo '{}' has a {} ms delay (limit is {} ms)",
                            combo.id, ms, MAX_DELAY_MS
                        ));
                    }
                    Fragment::Variable { name, .. } if !VARIABLE_NAMES.contains(&name.as_str()) => {
                        return Err(format!(
                            "combo '{}' uses unknown variable '{}'",
                            combo.id, name
                        ));
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

/// Decode and validate a combo list document.
pub fn parse_combo_list(content: &str, path: &Path) -> Result<ComboList, ComboListError> {
    let list: ComboList = serde_json::from_str(content)
        .map_err(|e| ComboListError::corrupt(path, e.to_string()))?;
    list.validate()
        .map_err(|message| ComboListError::corrupt(path, message))?;
    Ok(list)
}

/// Load the combo list at `path`. A missing file yields an empty list, which
/// is written out so the next launch finds it.
pub fn load_combo_list(path: &Path) -> Result<ComboList, ComboListError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let list = parse_combo_list(&content, path)?;
            tracing::info!(
                "Loaded {} combos in {} groups from {}",
                list.combos.len(),
                list.groups.len(),
                path.display()
            );
            Ok(list)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No combo list at {}, creating an empty one", path.display());
            let list = ComboList::default();
            save_combo_list(&list, path)?;
            Ok(list)
        }
        Err(e) => Err(ComboListError::io(path, e)),
    }
}

/// Write the combo list to `path`, replacing any existing file atomically.
pub fn save_combo_list(list: &ComboList, path: &Path) -> Result<(), ComboListError> {
    let content = serde_json::to_string_pretty(list)?;
    write_atomic(path, content.as_bytes()).map_err(|e| ComboListError::io(path, e))?;
    tracing::debug!("Saved {} combos to {}", list.combos.len(), path.display());
    Ok(())
}
