//! Combo matcher
//!
//! Matching is by suffix: a combo fires when its keyword ends the typing
//! buffer. When several keywords end the buffer the longest one wins, then
//! the most recently edited combo, then the one listed last.
//!
//! The dictionary is an immutable [`ComboSnapshot`] indexed by the last
//! character of each keyword (case-folded), which is all suffix matching needs
//! to narrow the candidates on each keystroke.

use std::collections::HashMap;
use std::sync::Arc;

use beeftext_config::{Combo, ComboList, Fragment};

/// How a match was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// On each typed character. Delimiter-terminated keywords need their
    /// delimiter.
    Automatic,
    /// From the trigger shortcut. Delimiter requirements are ignored.
    Shortcut,
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub combo: Arc<Combo>,
    pub fragments: Arc<[Fragment]>,
    /// Trailing buffer characters to erase
    pub matched_length: usize,
    /// Delimiter consumed by the match, typed again after the expansion
    pub delimiter: Option<char>,
}

#[derive(Debug)]
struct Entry {
    combo: Arc<Combo>,
    fragments: Arc<[Fragment]>,
    keyword: Vec<char>,
    folded: Vec<char>,
    position: usize,
}

/// Read-only view of the active combos, published on every change.
#[derive(Debug, Default)]
pub struct ComboSnapshot {
    entries: Vec<Entry>,
    by_last_char: HashMap<char, Vec<usize>>,
    /// Every combo, active or not, for nested expansion
    by_keyword: HashMap<String, Arc<[Fragment]>>,
    max_trigger_len: usize,
}

pub fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Characters that terminate a delimiter-terminated keyword.
pub fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation()
}

impl ComboSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_list(list: &ComboList) -> Self {
        let mut snapshot = Self::default();

        for combo in &list.combos {
            let fragments: Arc<[Fragment]> = combo.resolved_fragments().into();
            snapshot
                .by_keyword
                .entry(combo.trigger.keyword.clone())
                .or_insert_with(|| Arc::clone(&fragments));

            if !list.is_active(combo) {
                continue;
            }

            let keyword: Vec<char> = combo.trigger.keyword.chars().collect();
            let folded: Vec<char> = keyword.iter().copied().map(fold).collect();
            let Some(&last) = folded.last() else {
                continue;
            };

            let index = snapshot.entries.len();
            snapshot.max_trigger_len = snapshot.max_trigger_len.max(keyword.len());
            snapshot.by_last_char.entry(last).or_default().push(index);
            snapshot.entries.push(Entry {
                combo: Arc::new(combo.clone()),
                fragments,
                keyword,
                folded,
                position: index,
            });
        }

        snapshot
    }

    /// Number of combos taking part in matching.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_trigger_len(&self) -> usize {
        self.max_trigger_len
    }

    /// Fragments of the combo with this keyword, exact match first.
    pub fn lookup_keyword(&self, keyword: &str) -> Option<Arc<[Fragment]>> {
        if let Some(fragments) = self.by_keyword.get(keyword) {
            return Some(Arc::clone(fragments));
        }
        self.by_keyword
            .iter()
            .find(|(k, _)| k.to_lowercase() == keyword.to_lowercase())
            .map(|(_, f)| Arc::clone(f))
    }

    fn candidates(&self, last: char) -> impl Iterator<Item = &Entry> {
        self.by_last_char
            .get(&fold(last))
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|i| &self.entries[*i])
    }

    /// Find the winning combo for the buffer contents.
    pub fn find(&self, buffer: &[char], mode: MatchMode) -> Option<MatchResult> {
        let &last = buffer.last()?;
        let mut best: Option<(&Entry, Option<char>)> = None;

        for entry in self.candidates(last) {
            let wants_delimiter = !entry.combo.trigger.exact_end && mode == MatchMode::Automatic;
            if !wants_delimiter && suffix_matches(buffer, entry) {
                keep_best(&mut best, entry, None);
            }
        }

        if mode == MatchMode::Automatic && is_delimiter(last) && buffer.len() >= 2 {
            let body = &buffer[..buffer.len() - 1];
            for entry in self.candidates(body[body.len() - 1]) {
                if !entry.combo.trigger.exact_end && suffix_matches(body, entry) {
                    keep_best(&mut best, entry, Some(last));
                }
            }
        }

        best.map(|(entry, delimiter)| MatchResult {
            combo: Arc::clone(&entry.combo),
            fragments: Arc::clone(&entry.fragments),
            matched_length: entry.keyword.len() + usize::from(delimiter.is_some()),
            delimiter,
        })
    }
}

fn keep_best<'a>(best: &mut Option<(&'a Entry, Option<char>)>, entry: &'a Entry, delimiter: Option<char>) {
    let better = match *best {
        None => true,
        Some((current, _)) => rank(entry) > rank(current),
    };
    if better {
        *best = Some((entry, delimiter));
    }
}

fn rank(entry: &Entry) -> (usize, Option<chrono::DateTime<chrono::Utc>>, usize) {
    (entry.keyword.len(), entry.combo.last_edited(), entry.position)
}

fn suffix_matches(text: &[char], entry: &Entry) -> bool {
    let k = entry.keyword.len();
    if k == 0 || text.len() < k {
        return false;
    }
    let start = text.len() - k;
    let tail = &text[start..];

    let same = if entry.combo.trigger.case_sensitive {
        tail == entry.keyword.as_slice()
    } else {
        tail.iter().zip(&entry.folded).all(|(a, b)| fold(*a) == *b)
    };
    if !same {
        return false;
    }

    !entry.combo.trigger.word_boundary || start == 0 || !text[start - 1].is_alphanumeric()
}
