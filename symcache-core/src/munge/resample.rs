//! Calendar resampling of date-like series.
//!
//! Rules: `D` daily, `W` weeks ending Sunday, `M` month end, `Q` quarter
//! end, `A`/`Y` year end. Output rows are labelled with the period-end date
//! and cover every period from the first to the last observation; periods
//! without data are missing.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};

use super::MungeError;
use crate::domain::kwargs::opt_str;
use crate::domain::{ArgError, IndexKind, IndexValue, Kwargs, Point, Series};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Rule {
    pub fn parse(raw: &str) -> Option<Rule> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "D" => Some(Rule::Day),
            "W" | "W-SUN" => Some(Rule::Week),
            "M" | "ME" => Some(Rule::Month),
            "Q" | "QE" => Some(Rule::Quarter),
            "A" | "Y" | "YE" => Some(Rule::Year),
            _ => None,
        }
    }

    /// Last day of the period containing `date`.
    pub fn period_end(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Rule::Day => Some(date),
            Rule::Week => {
                let to_sunday = 6 - date.weekday().num_days_from_monday() as i64;
                date.checked_add_signed(Duration::days(to_sunday))
            }
            Rule::Month => month_end(date.year(), date.month()),
            Rule::Quarter => month_end(date.year(), (date.month() - 1) / 3 * 3 + 3),
            Rule::Year => NaiveDate::from_ymd_opt(date.year(), 12, 31),
        }
    }
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (y, m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum How {
    Last,
    First,
    Mean,
    Sum,
    Max,
    Min,
}

impl How {
    fn parse(raw: &str) -> Option<How> {
        match raw {
            "last" => Some(How::Last),
            "first" => Some(How::First),
            "mean" => Some(How::Mean),
            "sum" => Some(How::Sum),
            "max" => Some(How::Max),
            "min" => Some(How::Min),
            _ => None,
        }
    }

    fn reduce(&self, xs: &[f64]) -> Option<f64> {
        if xs.is_empty() {
            return None;
        }
        match self {
            How::Last => xs.last().copied(),
            How::First => xs.first().copied(),
            How::Mean => Some(xs.iter().sum::<f64>() / xs.len() as f64),
            How::Sum => Some(xs.iter().sum()),
            How::Max => xs.iter().copied().reduce(f64::max),
            How::Min => xs.iter().copied().reduce(f64::min),
        }
    }
}

fn bad_arg(name: &str, reason: String) -> MungeError {
    ArgError::OutOfRange {
        name: name.to_string(),
        reason,
    }
    .into()
}

/// `resample(rule, how="last")`.
pub fn resample(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let raw_rule = opt_str(args, "rule")?.unwrap_or("M");
    let rule =
        Rule::parse(raw_rule).ok_or_else(|| bad_arg("rule", format!("unknown rule '{raw_rule}'")))?;
    let raw_how = opt_str(args, "how")?.unwrap_or("last");
    let how = How::parse(raw_how).ok_or_else(|| bad_arg("how", format!("unknown '{raw_how}'")))?;

    let Some(first) = series.points.first() else {
        return Ok(series);
    };
    let label_kind = first.index.kind();
    if !matches!(label_kind, IndexKind::Date | IndexKind::DateTime) {
        return Err(MungeError::Invalid(format!(
            "resample needs a date-like index, found {label_kind}"
        )));
    }

    // Bucket present values by period end. Input order is kept within a bin.
    let mut bins: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for point in &series.points {
        let date = point.index.date().ok_or_else(|| {
            MungeError::Invalid(format!("index value {} is not date-like", point.index))
        })?;
        let end = rule
            .period_end(date)
            .ok_or_else(|| MungeError::Invalid(format!("no period end for {date}")))?;
        match bins.iter_mut().find(|(e, _)| *e == end) {
            Some((_, xs)) => xs.extend(point.value),
            None => bins.push((end, point.value.into_iter().collect())),
        }
    }
    bins.sort_by_key(|(e, _)| *e);

    let (Some(&(start, _)), Some(&(stop, _))) = (bins.first(), bins.last()) else {
        return Ok(series);
    };
    let mut points = Vec::new();
    let mut cursor = start;
    while cursor <= stop {
        let value = bins
            .iter()
            .find(|(e, _)| *e == cursor)
            .and_then(|(_, xs)| how.reduce(xs));
        let index = match label_kind {
            IndexKind::DateTime => IndexValue::DateTime(cursor.and_time(NaiveTime::MIN)),
            _ => IndexValue::Date(cursor),
        };
        points.push(Point { index, value });
        cursor = cursor
            .succ_opt()
            .and_then(|next| rule.period_end(next))
            .ok_or_else(|| MungeError::Invalid(format!("calendar overflow after {cursor}")))?;
    }
    Ok(Series::new(series.name, points))
}
