//! Label records and comma-separated label list handling

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A persisted label counter row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Label {
    /// Row identifier assigned by the store
    pub id: i64,

    /// Trimmed display text, compared case-sensitively
    pub name: String,

    /// Number of post references counted so far
    pub count: i64,
}

/// Which counter table a label lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Tag,
    Category,
}

impl LabelKind {
    /// Backing table name. Only ever one of two static identifiers.
    pub fn table(&self) -> &'static str {
        match self {
            LabelKind::Tag => "tags",
            LabelKind::Category => "categories",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Tag => "tag",
            LabelKind::Category => "category",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest label name the counter tables accept, in characters
pub const MAX_LABEL_CHARS: usize = 100;

/// First label in `labels` longer than [`MAX_LABEL_CHARS`]
pub fn find_oversized_label(labels: &[String]) -> Option<&str> {
    labels
        .iter()
        .map(String::as_str)
        .find(|label| label.chars().count() > MAX_LABEL_CHARS)
}

/// Trim a raw label, returning `None` when nothing meaningful is left
pub fn normalize_label(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Split a comma-separated label list.
///
/// Entries are trimmed and empty entries dropped. Order and duplicates are kept.
pub fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(normalize_label)
        .map(str::to_string)
        .collect()
}

/// Join labels back into the denormalized form stored on a post
pub fn join_labels(labels: &[String]) -> String {
    labels.join(",")
}

/// Count occurrences of each label, in first-seen order.
///
/// Blank entries are skipped; names are not case-folded.
pub fn tally_labels<I, N>(names: I) -> Vec<(String, i64)>
where
    I: IntoIterator<Item = N>,
    N: AsRef<str>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut tallies: Vec<(String, i64)> = Vec::new();

    for raw in names {
        let Some(name) = normalize_label(raw.as_ref()) else {
            continue;
        };

        match positions.get(name) {
            Some(&idx) => tallies[idx].1 += 1,
            None => {
                positions.insert(name.to_string(), tallies.len());
                tallies.push((name.to_string(), 1));
            }
        }
    }

    tallies
}
