//! A named, indexed series of optional values.
//!
//! `None` is the "no data" sentinel. It is never conflated with zero.

use super::index::IndexValue;
use serde::{Deserialize, Serialize};

/// One row of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub index: IndexValue,
    pub value: Option<f64>,
}

impl Point {
    pub fn new(index: impl Into<IndexValue>, value: Option<f64>) -> Self {
        Self {
            index: index.into(),
            value,
        }
    }
}

/// An ordered sequence of points with a name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<Point>,
}

impl Series {
    pub fn new(name: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// An empty series, used when a failed fetch is absorbed.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn from_pairs<I, K>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<f64>)>,
        K: Into<IndexValue>,
    {
        Self::new(
            name,
            pairs.into_iter().map(|(k, v)| Point::new(k, v)).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.points.iter().map(|p| p.value)
    }

    pub fn index(&self) -> impl Iterator<Item = &IndexValue> + '_ {
        self.points.iter().map(|p| &p.index)
    }

    /// Rename in place and return self, for chaining.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the values, keeping the index. `values` must match in length.
    pub(crate) fn with_values(mut self, values: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(values.len(), self.points.len());
        for (point, value) in self.points.iter_mut().zip(values) {
            point.value = value;
        }
        self
    }

    /// The first position at which the index fails to be strictly increasing.
    ///
    /// Returns `None` when the index is monotonic and unique.
    pub fn monounique_violation(&self) -> Option<usize> {
        self.points
            .windows(2)
            .position(|w| w[0].index >= w[1].index)
            .map(|i| i + 1)
    }

    /// The last `n` points, rendered for reports.
    pub fn tail_summary(&self, n: usize) -> String {
        let start = self.points.len().saturating_sub(n);
        self.points[start..]
            .iter()
            .map(|p| match p.value {
                Some(v) => format!("{}: {v}", p.index),
                None => format!("{}: NaN", p.index),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[(i64, Option<f64>)]) -> Series {
        Series::from_pairs("s", values.iter().copied())
    }

    #[test]
    fn monotonic_unique_index_has_no_violation() {
        let s = ints(&[(1, Some(1.0)), (2, None), (5, Some(2.0))]);
        assert_eq!(s.monounique_violation(), None);
    }

    #[test]
    fn duplicate_index_is_a_violation() {
        let s = ints(&[(1, Some(1.0)), (2, Some(2.0)), (2, Some(3.0))]);
        assert_eq!(s.monounique_violation(), Some(2));
    }

    #[test]
    fn decreasing_index_is_a_violation() {
        let s = ints(&[(3, Some(1.0)), (2, Some(2.0))]);
        assert_eq!(s.monounique_violation(), Some(1));
    }

    #[test]
    fn tail_summary_renders_missing_as_nan() {
        let s = ints(&[(1, Some(1.5)), (2, None), (3, Some(2.0))]);
        assert_eq!(s.tail_summary(2), "2: NaN, 3: 2");
    }
}
