//! Report tree returned by caching calls.
//!
//! `BatchReport` ⊃ `SymbolReport` ⊃ {`FeedReport`, `ReportPoint`,
//! `HandleRecord`}. Reports are built fresh per call and never stored as
//! domain state.

use serde::{Deserialize, Serialize};

use crate::handling::{Checkpoint, HandleRecord};
use crate::pipeline::CacheState;

/// A labelled observation made while caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPoint {
    /// Stage that produced the point, e.g. `readmeta`, `finish`, `validation`.
    pub location: String,
    pub name: String,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl ReportPoint {
    pub fn new(
        location: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
            value: value.into(),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedReport {
    pub fnum: u32,
    pub column: String,
    pub points: Vec<ReportPoint>,
    pub handles: Vec<HandleRecord>,
    /// Failures absorbed at this feed's checkpoints, silent ones included.
    pub absorbed: usize,
}

impl FeedReport {
    pub fn new(fnum: u32) -> Self {
        Self {
            fnum,
            column: crate::domain::column_name(fnum),
            points: Vec::new(),
            handles: Vec::new(),
            absorbed: 0,
        }
    }

    pub fn add_point(&mut self, point: ReportPoint) {
        self.points.push(point);
    }

    /// Record an absorbed failure. The record is attached only when its
    /// policy has the `report` flag.
    pub fn absorb(&mut self, outcome: Option<HandleRecord>) {
        self.absorbed += 1;
        if let Some(record) = outcome.filter(HandleRecord::reportable) {
            self.handles.push(record);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub feeds: Vec<FeedReport>,
    pub points: Vec<ReportPoint>,
    pub handles: Vec<HandleRecord>,
    pub absorbed: usize,
    /// Last state the cache call entered.
    pub reached: CacheState,
    pub rows: usize,
    /// BLAKE3 of the persisted table.
    pub table_hash: Option<String>,
    /// Validity result, when validators were run.
    pub valid: Option<bool>,
}

impl SymbolReport {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            feeds: Vec::new(),
            points: Vec::new(),
            handles: Vec::new(),
            absorbed: 0,
            reached: CacheState::Sourcing,
            rows: 0,
            table_hash: None,
            valid: None,
        }
    }

    pub fn add_point(&mut self, point: ReportPoint) {
        self.points.push(point);
    }

    pub fn absorb(&mut self, outcome: Option<HandleRecord>) {
        self.absorbed += 1;
        if let Some(record) = outcome.filter(HandleRecord::reportable) {
            self.handles.push(record);
        }
    }

    /// True when nothing was absorbed anywhere in the call.
    pub fn is_clean(&self) -> bool {
        self.absorbed == 0 && self.feeds.iter().all(|f| f.absorbed == 0)
    }

    /// Every attached handle record, symbol level first.
    pub fn all_handles(&self) -> impl Iterator<Item = &HandleRecord> + '_ {
        self.handles
            .iter()
            .chain(self.feeds.iter().flat_map(|f| f.handles.iter()))
    }

    pub fn has_handle(&self, checkpoint: impl Into<Checkpoint>) -> bool {
        let checkpoint = checkpoint.into();
        self.all_handles().any(|h| h.checkpoint == checkpoint)
    }

    pub fn points_at<'a>(&'a self, location: &'a str) -> impl Iterator<Item = &'a ReportPoint> + 'a {
        self.points
            .iter()
            .chain(self.feeds.iter().flat_map(|f| f.points.iter()))
            .filter(move |p| p.location == location)
    }

    pub fn summary(&self) -> String {
        let status = if self.is_clean() { "clean" } else { "partial" };
        let valid = match self.valid {
            Some(true) => "valid",
            Some(false) => "INVALID",
            None => "unchecked",
        };
        format!(
            "{}: {} rows, {} feeds, {} ({} absorbed, {} reported), {}, reached {}",
            self.symbol,
            self.rows,
            self.feeds.len(),
            status,
            self.absorbed + self.feeds.iter().map(|f| f.absorbed).sum::<usize>(),
            self.all_handles().count(),
            valid,
            self.reached
        )
    }
}

/// A Symbol whose cache call escalated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub checkpoint: Option<Checkpoint>,
    pub error: String,
}

/// Result of caching many Symbols.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub name: String,
    pub symbols: Vec<SymbolReport>,
    pub failures: Vec<SymbolFailure>,
}

impl BatchReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.symbols.iter().all(SymbolReport::is_clean)
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolReport> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }

    pub fn failure(&self, symbol: &str) -> Option<&SymbolFailure> {
        self.failures.iter().find(|f| f.symbol == symbol)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{}: {} cached, {} failed",
            self.name,
            self.symbols.len(),
            self.failures.len()
        )];
        lines.extend(self.symbols.iter().map(|s| format!("  {}", s.summary())));
        lines.extend(
            self.failures
                .iter()
                .map(|f| format!("  {}: FAILED {}", f.symbol, f.error)),
        );
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handling::{BitPolicy, Flag, SymbolCheckpoint};

    fn record(flags: BitPolicy) -> HandleRecord {
        HandleRecord {
            checkpoint: SymbolCheckpoint::Aggregation.into(),
            owner: "X".into(),
            message: "m".into(),
            cause: "c".into(),
            flags,
        }
    }

    #[test]
    fn absorb_attaches_only_reportable_records() {
        let mut r = SymbolReport::new("X");
        r.absorb(Some(record(BitPolicy::from_flags([Flag::Stdout]))));
        r.absorb(Some(record(BitPolicy::from_flags([Flag::Report]))));
        r.absorb(None);
        assert_eq!(r.handles.len(), 1);
        assert_eq!(r.absorbed, 3);
        assert!(!r.is_clean());
    }

    #[test]
    fn feed_absorption_makes_symbol_partial() {
        let mut r = SymbolReport::new("X");
        assert!(r.is_clean());
        let mut f = FeedReport::new(0);
        f.absorb(None);
        r.feeds.push(f);
        assert!(!r.is_clean());
        assert_eq!(r.feeds[0].column, "feed001");
    }

    #[test]
    fn batch_lookup() {
        let mut b = BatchReport::new("all");
        b.symbols.push(SymbolReport::new("A"));
        b.failures.push(SymbolFailure {
            symbol: "B".into(),
            checkpoint: None,
            error: "boom".into(),
        });
        assert!(b.get("A").is_some());
        assert!(b.failure("B").is_some());
        assert!(!b.is_clean());
        assert!(b.summary().contains("1 cached, 1 failed"));
    }
}
