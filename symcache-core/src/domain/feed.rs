//! Feeds: one raw source contributing a column to a Symbol.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::kwargs::{KwargValue, Kwargs};
use crate::handling::{FeedHandle, HandleDefaults};

/// Canonical column name of a feed: `feed{fnum+1:03}`.
pub fn column_name(fnum: u32) -> String {
    format!("feed{:03}", fnum + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    #[default]
    On,
    Off,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedState::On => f.write_str("ON"),
            FeedState::Off => f.write_str("OFF"),
        }
    }
}

/// Where a feed's raw data comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Registry key of the source adapter.
    pub source_type: String,
    /// Name of an externally configured parameter set merged over `params`.
    #[serde(default)]
    pub sourcing_key: Option<String>,
    #[serde(default)]
    pub params: Kwargs,
}

impl SourceSpec {
    pub fn new(source_type: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            sourcing_key: None,
            params: Kwargs::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<KwargValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn sourcing_key(mut self, key: impl Into<String>) -> Self {
        self.sourcing_key = Some(key.into());
        self
    }
}

/// How a munge step is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MungeKind {
    /// An operation on the series itself.
    #[serde(alias = "method")]
    SeriesMethod,
    /// A free function taking the series as first argument.
    #[serde(alias = "function")]
    LibraryFunction,
}

impl fmt::Display for MungeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MungeKind::SeriesMethod => f.write_str("series_method"),
            MungeKind::LibraryFunction => f.write_str("library_function"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MungeStep {
    /// Zero-based application order, contiguous within a feed.
    #[serde(default)]
    pub order: usize,
    pub method: String,
    #[serde(default = "default_munge_kind")]
    pub kind: MungeKind,
    #[serde(default)]
    pub kwargs: Kwargs,
}

fn default_munge_kind() -> MungeKind {
    MungeKind::SeriesMethod
}

impl MungeStep {
    pub fn method(name: impl Into<String>, kwargs: Kwargs) -> Self {
        Self {
            order: 0,
            method: name.into(),
            kind: MungeKind::SeriesMethod,
            kwargs,
        }
    }

    pub fn function(name: impl Into<String>, kwargs: Kwargs) -> Self {
        Self {
            order: 0,
            method: name.into(),
            kind: MungeKind::LibraryFunction,
            kwargs,
        }
    }
}

/// Renumber steps `0..n` keeping their relative order.
pub fn renumber(steps: &mut [MungeStep]) {
    steps.sort_by_key(|s| s.order);
    for (i, step) in steps.iter_mut().enumerate() {
        step.order = i;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub symbol: String,
    pub fnum: u32,
    #[serde(default)]
    pub state: FeedState,
    pub source: SourceSpec,
    #[serde(default)]
    pub munging: Vec<MungeStep>,
    #[serde(default)]
    pub handle: FeedHandle,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Feed {
    pub fn column_name(&self) -> String {
        column_name(self.fnum)
    }

    /// Label used in logs and handle records.
    pub fn owner(&self) -> String {
        format!("{}/{}", self.symbol, self.column_name())
    }

    pub fn is_on(&self) -> bool {
        self.state == FeedState::On
    }

    /// Munge steps sorted by `order`.
    pub fn steps(&self) -> Vec<&MungeStep> {
        let mut steps: Vec<&MungeStep> = self.munging.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }
}

/// A feed before its fnum is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedDraft {
    pub source: SourceSpec,
    #[serde(default)]
    pub munging: Vec<MungeStep>,
    #[serde(default)]
    pub state: FeedState,
    #[serde(default)]
    pub handle: Option<FeedHandle>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl FeedDraft {
    pub fn new(source: SourceSpec) -> Self {
        Self {
            source,
            munging: Vec::new(),
            state: FeedState::On,
            handle: None,
            meta: BTreeMap::new(),
        }
    }

    /// Append a step after the existing ones.
    pub fn munge(mut self, mut step: MungeStep) -> Self {
        step.order = self.munging.len();
        self.munging.push(step);
        self
    }

    pub fn handle(mut self, handle: FeedHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn state(mut self, state: FeedState) -> Self {
        self.state = state;
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn into_feed(self, symbol: &str, fnum: u32, defaults: &HandleDefaults) -> Feed {
        let mut munging = self.munging;
        renumber(&mut munging);
        Feed {
            symbol: symbol.to_string(),
            fnum,
            state: self.state,
            source: self.source,
            munging,
            handle: self.handle.unwrap_or_else(|| FeedHandle::defaults(defaults)),
            meta: self.meta,
        }
    }
}
