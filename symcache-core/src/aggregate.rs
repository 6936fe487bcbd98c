//! Aggregators: reduce one aligned-table row to the `final` value.
//!
//! Every built-in strategy consults the override first and the failsafe
//! last; they differ only in how the feed values are combined. Strategies
//! are row-wise, deterministic and side-effect free.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::factory::FactoryError;
use crate::table::{AlignedTable, ColumnRole};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("row {row}: {method} produced a non-finite value ({value})")]
    NonFinite {
        row: usize,
        method: String,
        value: f64,
    },

    #[error("row {row}: {message}")]
    Row { row: usize, message: String },
}

/// One row of the aligned table, in precedence order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub position: usize,
    pub override_value: Option<f64>,
    /// Feed values by ascending fnum.
    pub feeds: Vec<Option<f64>>,
    pub failsafe: Option<f64>,
}

impl Row {
    pub fn from_table(table: &AlignedTable, position: usize) -> Row {
        let mut row = Row {
            position,
            override_value: None,
            feeds: Vec::new(),
            failsafe: None,
        };
        for column in &table.columns {
            let value = column.values.get(position).copied().flatten();
            match column.role {
                ColumnRole::Override => row.override_value = value,
                ColumnRole::Feed(_) => row.feeds.push(value),
                ColumnRole::FailSafe => row.failsafe = value,
            }
        }
        row
    }

    fn present_feeds(&self) -> Vec<f64> {
        self.feeds.iter().flatten().copied().collect()
    }
}

/// Row-wise reduction strategy.
pub trait Aggregator: Send + Sync {
    fn name(&self) -> &str;

    fn aggregate(&self, row: &Row) -> Result<Option<f64>, AggregationError>;
}

/// Shared override/failsafe bracketing around a feed reducer.
fn bracket(
    method: &str,
    row: &Row,
    feeds: impl FnOnce(&Row) -> Option<f64>,
) -> Result<Option<f64>, AggregationError> {
    let value = row
        .override_value
        .or_else(|| feeds(row))
        .or(row.failsafe);
    match value {
        Some(v) if !v.is_finite() => Err(AggregationError::NonFinite {
            row: row.position,
            method: method.to_string(),
            value: v,
        }),
        other => Ok(other),
    }
}

/// First present value left to right: override, feed001, feed002, ..,
/// failsafe.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityFill;

impl Aggregator for PriorityFill {
    fn name(&self) -> &str {
        "priority_fill"
    }

    fn aggregate(&self, row: &Row) -> Result<Option<f64>, AggregationError> {
        bracket(self.name(), row, |r| r.feeds.iter().flatten().next().copied())
    }
}

/// Mean of the present feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanFill;

impl Aggregator for MeanFill {
    fn name(&self) -> &str {
        "mean_fill"
    }

    fn aggregate(&self, row: &Row) -> Result<Option<f64>, AggregationError> {
        bracket(self.name(), row, |r| {
            let xs = r.present_feeds();
            (!xs.is_empty()).then(|| xs.iter().sum::<f64>() / xs.len() as f64)
        })
    }
}

/// Median of the present feeds; the mean of the middle two when even.
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianFill;

impl Aggregator for MedianFill {
    fn name(&self) -> &str {
        "median_fill"
    }

    fn aggregate(&self, row: &Row) -> Result<Option<f64>, AggregationError> {
        bracket(self.name(), row, |r| {
            let mut xs = r.present_feeds();
            if xs.is_empty() {
                return None;
            }
            xs.sort_by(f64::total_cmp);
            let mid = xs.len() / 2;
            Some(if xs.len() % 2 == 0 {
                (xs[mid - 1] + xs[mid]) / 2.0
            } else {
                xs[mid]
            })
        })
    }
}

/// The highest-numbered present feed wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestFeed;

impl Aggregator for LatestFeed {
    fn name(&self) -> &str {
        "latest_feed"
    }

    fn aggregate(&self, row: &Row) -> Result<Option<f64>, AggregationError> {
        bracket(self.name(), row, |r| r.feeds.iter().rev().flatten().next().copied())
    }
}

#[derive(Clone, Default)]
pub struct AggregatorRegistry {
    entries: HashMap<String, Arc<dyn Aggregator>>,
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(PriorityFill));
        reg.register(Arc::new(MeanFill));
        reg.register(Arc::new(MedianFill));
        reg.register(Arc::new(LatestFeed));
        reg
    }

    pub fn register(&mut self, aggregator: Arc<dyn Aggregator>) {
        self.entries
            .insert(aggregator.name().to_string(), aggregator);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Aggregator>, FactoryError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| FactoryError::UnknownAggregator(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Outcome of aggregating a whole table.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated {
    pub values: Vec<Option<f64>>,
    /// Rows whose reduction failed; their `final` is left missing.
    pub failures: Vec<AggregationError>,
}

/// Apply `aggregator` to every row. A failing row does not stop the rest.
pub fn aggregate_table(table: &AlignedTable, aggregator: &dyn Aggregator) -> Aggregated {
    let mut values = Vec::with_capacity(table.len());
    let mut failures = Vec::new();
    for position in 0..table.len() {
        match aggregator.aggregate(&Row::from_table(table, position)) {
            Ok(v) => values.push(v),
            Err(e) => {
                failures.push(e);
                values.push(None);
            }
        }
    }
    Aggregated { values, failures }
}
