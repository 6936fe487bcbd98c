//! Assemble the aligned table from feed series and manual datapoints.
//!
//! Outer join over the union of all index values. Missing cells are `None`.
//! Overrides and failsafes are reduced to one winner per index value
//! (latest `logged_at`, then highest `seq`) and may add rows the feeds
//! never had.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::domain::{latest_per_index, IndexKind, IndexValue, OrfEntry, Series};
use crate::table::{AlignedTable, Column, ColumnRole};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("{column}: {count} index values are {found}, expected {expected}")]
    IndexKindMismatch {
        column: ColumnRole,
        found: IndexKind,
        expected: IndexKind,
        count: usize,
    },
}

/// One cached feed, ready to be joined.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedColumn {
    pub fnum: u32,
    pub series: Series,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub table: AlignedTable,
    /// Points excluded from the join. Each is a concatenation failure.
    pub problems: Vec<MergeError>,
}

/// Values of one source keyed by index, with off-kind values counted.
fn keyed<'a>(
    role: ColumnRole,
    kind: IndexKind,
    points: impl Iterator<Item = (&'a IndexValue, Option<f64>)>,
    problems: &mut Vec<MergeError>,
) -> BTreeMap<IndexValue, Option<f64>> {
    let mut map = BTreeMap::new();
    let mut mismatched: BTreeMap<IndexKind, usize> = BTreeMap::new();
    for (index, value) in points {
        if index.kind() != kind {
            *mismatched.entry(index.kind()).or_default() += 1;
            continue;
        }
        // Duplicates keep their first occurrence.
        map.entry(index.clone()).or_insert(value);
    }
    problems.extend(
        mismatched
            .into_iter()
            .map(|(found, count)| MergeError::IndexKindMismatch {
                column: role,
                found,
                expected: kind,
                count,
            }),
    );
    map
}

fn orf_column(
    role: ColumnRole,
    kind: IndexKind,
    entries: &[OrfEntry],
    problems: &mut Vec<MergeError>,
) -> BTreeMap<IndexValue, Option<f64>> {
    let winners = latest_per_index(entries);
    keyed(
        role,
        kind,
        winners.iter().map(|(i, e)| (i, Some(e.value))),
        problems,
    )
}

pub fn assemble(
    kind: IndexKind,
    feeds: &[FeedColumn],
    overrides: &[OrfEntry],
    failsafes: &[OrfEntry],
) -> Assembled {
    let mut problems = Vec::new();

    let mut sources: Vec<(ColumnRole, BTreeMap<IndexValue, Option<f64>>)> = Vec::new();
    sources.push((
        ColumnRole::Override,
        orf_column(ColumnRole::Override, kind, overrides, &mut problems),
    ));
    for feed in feeds {
        let role = ColumnRole::Feed(feed.fnum);
        let points = feed.series.points.iter().map(|p| (&p.index, p.value));
        sources.push((role, keyed(role, kind, points, &mut problems)));
    }
    sources.push((
        ColumnRole::FailSafe,
        orf_column(ColumnRole::FailSafe, kind, failsafes, &mut problems),
    ));

    let union: BTreeSet<&IndexValue> = sources.iter().flat_map(|(_, m)| m.keys()).collect();
    let index: Vec<IndexValue> = union.into_iter().cloned().collect();

    let mut table = AlignedTable::new(kind, index);
    for (role, map) in &sources {
        let values = table
            .index
            .iter()
            .map(|i| map.get(i).copied().flatten())
            .collect();
        table.columns.push(Column {
            role: *role,
            values,
        });
    }
    table.sort_columns();

    Assembled { table, problems }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrfDraft, OrfKind};
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
    }

    fn feed(fnum: u32, pairs: &[(u32, Option<f64>)]) -> FeedColumn {
        FeedColumn {
            fnum,
            series: Series::from_pairs("f", pairs.iter().map(|(day, v)| (d(*day), *v))),
        }
    }

    fn orf(kind: OrfKind, seq: u64, day: u32, value: f64, hour: u32) -> OrfEntry {
        OrfDraft::new(d(day), value)
            .at(d(1).and_hms_opt(hour, 0, 0).unwrap())
            .into_entry("X", kind, seq)
    }

    #[test]
    fn outer_join_fills_gaps_with_none() {
        let a = feed(0, &[(1, Some(1.0)), (2, Some(2.0))]);
        let b = feed(1, &[(2, Some(20.0)), (3, Some(30.0))]);
        let out = assemble(IndexKind::Date, &[a, b], &[], &[]);
        assert!(out.problems.is_empty());
        let t = out.table;
        assert_eq!(t.len(), 3);
        assert_eq!(
            t.column(ColumnRole::Feed(0)).unwrap().values,
            vec![Some(1.0), Some(2.0), None]
        );
        assert_eq!(
            t.column(ColumnRole::Feed(1)).unwrap().values,
            vec![None, Some(20.0), Some(30.0)]
        );
        assert_eq!(t.column(ColumnRole::Override).unwrap().values, vec![None; 3]);
    }

    #[test]
    fn overrides_insert_rows_and_latest_wins() {
        let a = feed(0, &[(1, Some(1.0))]);
        let overrides = vec![
            orf(OrfKind::Override, 0, 5, 50.0, 9),
            orf(OrfKind::Override, 1, 5, 55.0, 8),
        ];
        let out = assemble(IndexKind::Date, &[a], &overrides, &[]);
        let t = out.table;
        assert_eq!(t.index.len(), 2);
        assert_eq!(
            t.column(ColumnRole::Override).unwrap().values,
            vec![None, Some(50.0)]
        );
    }

    #[test]
    fn columns_follow_precedence_even_for_gapped_fnums() {
        let out = assemble(
            IndexKind::Date,
            &[feed(4, &[(1, Some(1.0))]), feed(0, &[(1, Some(2.0))])],
            &[],
            &[orf(OrfKind::FailSafe, 0, 1, 0.0, 0)],
        );
        let names = out.table.column_names();
        assert_eq!(
            names,
            vec!["indx", "final", "override_feed000", "feed001", "feed005", "failsafe_feed999"]
        );
    }

    #[test]
    fn off_kind_points_are_excluded_and_reported() {
        let mixed = FeedColumn {
            fnum: 0,
            series: Series::new(
                "f",
                vec![
                    crate::domain::Point::new(d(1), Some(1.0)),
                    crate::domain::Point::new(7i64, Some(2.0)),
                ],
            ),
        };
        let out = assemble(IndexKind::Date, &[mixed], &[], &[]);
        assert_eq!(out.table.len(), 1);
        assert_eq!(
            out.problems,
            vec![MergeError::IndexKindMismatch {
                column: ColumnRole::Feed(0),
                found: IndexKind::Integer,
                expected: IndexKind::Date,
                count: 1,
            }]
        );
    }

    #[test]
    fn duplicate_index_keeps_first_value() {
        let out = assemble(
            IndexKind::Date,
            &[feed(0, &[(1, Some(1.0)), (1, Some(9.0))])],
            &[],
            &[],
        );
        assert_eq!(
            out.table.column(ColumnRole::Feed(0)).unwrap().values,
            vec![Some(1.0)]
        );
    }
}
