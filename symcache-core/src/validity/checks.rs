//! Built-in validators.

use super::{Validator, ValidatorRegistry, ValidityError, Verdict};
use crate::domain::kwargs::{opt_f64, opt_usize, req_str};
use crate::domain::{column_name, ArgError, Kwargs};
use crate::table::{AlignedTable, ColumnRole};

pub(super) fn register(reg: &mut ValidatorRegistry) {
    reg.register("feeds_match", feeds_match);
    reg.register("date_exists", date_exists);
    reg.register("no_missing_final", no_missing_final);
    reg.register("final_in_range", final_in_range);
}

fn feeds_match(args: &Kwargs) -> Result<Box<dyn Validator>, ArgError> {
    Ok(Box::new(FeedsMatch::from_args(args)?))
}

fn date_exists(args: &Kwargs) -> Result<Box<dyn Validator>, ArgError> {
    Ok(Box::new(DateExists::from_args(args)?))
}

fn no_missing_final(args: &Kwargs) -> Result<Box<dyn Validator>, ArgError> {
    Ok(Box::new(NoMissingFinal::from_args(args)?))
}

fn final_in_range(args: &Kwargs) -> Result<Box<dyn Validator>, ArgError> {
    Ok(Box::new(FinalInRange::from_args(args)?))
}

/// Start of the trailing window of `lookback` rows.
fn window_start(len: usize, lookback: Option<usize>) -> usize {
    lookback.map_or(0, |n| len.saturating_sub(n))
}

// ─── feeds_match ─────────────────────────────────────────────────────

/// Two feed columns agree within `tolerance` over the last `lookback` rows
/// where both have data.
#[derive(Debug, Clone)]
pub struct FeedsMatch {
    pub left: u32,
    pub right: u32,
    pub lookback: usize,
    pub tolerance: f64,
}

impl FeedsMatch {
    pub fn from_args(args: &Kwargs) -> Result<Self, ArgError> {
        let to_fnum = |name: &str, default: u32| -> Result<u32, ArgError> {
            match opt_usize(args, name)? {
                None => Ok(default),
                Some(v) => u32::try_from(v).map_err(|_| ArgError::OutOfRange {
                    name: name.to_string(),
                    reason: format!("{v} is not a feed number"),
                }),
            }
        };
        let tolerance = opt_f64(args, "tolerance")?.unwrap_or(0.0);
        if tolerance < 0.0 {
            return Err(ArgError::OutOfRange {
                name: "tolerance".into(),
                reason: "must not be negative".into(),
            });
        }
        Ok(Self {
            left: to_fnum("left", 0)?,
            right: to_fnum("right", 1)?,
            lookback: opt_usize(args, "lookback")?.unwrap_or(5),
            tolerance,
        })
    }
}

impl Validator for FeedsMatch {
    fn name(&self) -> &str {
        "feeds_match"
    }

    fn check(&self, table: &AlignedTable) -> Result<Verdict, ValidityError> {
        let column = |fnum: u32| {
            table
                .column(ColumnRole::Feed(fnum))
                .ok_or_else(|| ValidityError::MissingColumn(column_name(fnum)))
        };
        let left = column(self.left)?;
        let right = column(self.right)?;
        let pairs: Vec<(usize, f64, f64)> = left
            .values
            .iter()
            .zip(&right.values)
            .enumerate()
            .filter_map(|(i, (a, b))| Some((i, (*a)?, (*b)?)))
            .collect();
        let start = window_start(pairs.len(), Some(self.lookback));
        let worst = pairs[start..]
            .iter()
            .max_by(|x, y| (x.1 - x.2).abs().total_cmp(&(y.1 - y.2).abs()));
        Ok(match worst {
            Some(&(i, a, b)) if (a - b).abs() > self.tolerance => Verdict::fail(format!(
                "{} and {} differ by {} at {}",
                left.role,
                right.role,
                (a - b).abs(),
                table.index[i]
            )),
            _ => Verdict::pass(format!(
                "{} rows compared",
                pairs.len() - start
            )),
        })
    }
}

// ─── date_exists ─────────────────────────────────────────────────────

/// A given index value is present with a final value.
#[derive(Debug, Clone)]
pub struct DateExists {
    pub date: String,
}

impl DateExists {
    pub fn from_args(args: &Kwargs) -> Result<Self, ArgError> {
        Ok(Self {
            date: req_str(args, "date")?.to_string(),
        })
    }
}

impl Validator for DateExists {
    fn name(&self) -> &str {
        "date_exists"
    }

    fn check(&self, table: &AlignedTable) -> Result<Verdict, ValidityError> {
        let wanted = table.index_kind.parse(&self.date)?;
        Ok(match table.position(&wanted) {
            Some(i) if table.final_values[i].is_some() => Verdict::pass(format!("{wanted} present")),
            Some(_) => Verdict::fail(format!("{wanted} present but final is missing")),
            None => Verdict::fail(format!("{wanted} not in index")),
        })
    }
}

// ─── no_missing_final ────────────────────────────────────────────────

/// Every row in the trailing `lookback` window (or the whole table) has a
/// final value.
#[derive(Debug, Clone)]
pub struct NoMissingFinal {
    pub lookback: Option<usize>,
}

impl NoMissingFinal {
    pub fn from_args(args: &Kwargs) -> Result<Self, ArgError> {
        Ok(Self {
            lookback: opt_usize(args, "lookback")?,
        })
    }
}

impl Validator for NoMissingFinal {
    fn name(&self) -> &str {
        "no_missing_final"
    }

    fn check(&self, table: &AlignedTable) -> Result<Verdict, ValidityError> {
        let start = window_start(table.len(), self.lookback);
        let missing: Vec<String> = (start..table.len())
            .filter(|&i| table.final_values[i].is_none())
            .map(|i| table.index[i].to_string())
            .collect();
        Ok(if missing.is_empty() {
            Verdict::pass(format!("{} rows checked", table.len() - start))
        } else {
            Verdict::fail(format!("final missing at {}", missing.join(", ")))
        })
    }
}

// ─── final_in_range ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FinalInRange {
    pub min: f64,
    pub max: f64,
    pub lookback: Option<usize>,
}

impl FinalInRange {
    pub fn from_args(args: &Kwargs) -> Result<Self, ArgError> {
        let min = opt_f64(args, "min")?.unwrap_or(f64::NEG_INFINITY);
        let max = opt_f64(args, "max")?.unwrap_or(f64::INFINITY);
        if min > max {
            return Err(ArgError::OutOfRange {
                name: "min".into(),
                reason: format!("{min} is above max {max}"),
            });
        }
        Ok(Self {
            min,
            max,
            lookback: opt_usize(args, "lookback")?,
        })
    }
}

impl Validator for FinalInRange {
    fn name(&self) -> &str {
        "final_in_range"
    }

    fn check(&self, table: &AlignedTable) -> Result<Verdict, ValidityError> {
        let start = window_start(table.len(), self.lookback);
        let outside = (start..table.len()).find(|&i| {
            table.final_values[i].is_some_and(|v| v < self.min || v > self.max)
        });
        Ok(match outside {
            Some(i) => Verdict::fail(format!(
                "final {:?} at {} outside [{}, {}]",
                table.final_values[i], table.index[i], self.min, self.max
            )),
            None => Verdict::pass(format!("within [{}, {}]", self.min, self.max)),
        })
    }
}
