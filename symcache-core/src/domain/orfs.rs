//! Overrides and failsafes: append-only logs of manual datapoints.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::index::IndexValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrfKind {
    Override,
    FailSafe,
}

impl OrfKind {
    pub fn name(&self) -> &'static str {
        match self {
            OrfKind::Override => "override",
            OrfKind::FailSafe => "failsafe",
        }
    }
}

impl fmt::Display for OrfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One logged override or failsafe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrfEntry {
    pub symbol: String,
    pub kind: OrfKind,
    /// Sequence number within (symbol, kind), assigned by storage.
    pub seq: u64,
    pub index: IndexValue,
    pub value: f64,
    pub logged_at: NaiveDateTime,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// An entry before storage assigns its sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrfDraft {
    pub index: IndexValue,
    pub value: f64,
    #[serde(default)]
    pub logged_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl OrfDraft {
    pub fn new(index: impl Into<IndexValue>, value: f64) -> Self {
        Self {
            index: index.into(),
            value,
            logged_at: None,
            user: None,
            comment: None,
        }
    }

    pub fn at(mut self, logged_at: NaiveDateTime) -> Self {
        self.logged_at = Some(logged_at);
        self
    }

    pub fn by(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Stamp with `seq`. A missing timestamp is taken from the local clock.
    pub fn into_entry(self, symbol: &str, kind: OrfKind, seq: u64) -> OrfEntry {
        OrfEntry {
            symbol: symbol.to_string(),
            kind,
            seq,
            index: self.index,
            value: self.value,
            logged_at: self
                .logged_at
                .unwrap_or_else(|| chrono::Local::now().naive_local()),
            user: self.user,
            comment: self.comment,
        }
    }
}

/// The winning entry per index value: latest `logged_at`, ties broken by
/// the higher `seq`.
pub fn latest_per_index(entries: &[OrfEntry]) -> BTreeMap<IndexValue, &OrfEntry> {
    let mut winners: BTreeMap<IndexValue, &OrfEntry> = BTreeMap::new();
    for entry in entries {
        match winners.get(&entry.index) {
            Some(current) if (current.logged_at, current.seq) >= (entry.logged_at, entry.seq) => {}
            _ => {
                winners.insert(entry.index.clone(), entry);
            }
        }
    }
    winners
}
