//! Series methods: transforms invoked on the series itself.
//!
//! Missing values propagate: arithmetic on a missing value stays missing,
//! and only the fill methods introduce values where there were none.

use super::{MungeError, MungeRegistry};
use crate::domain::kwargs::{opt_f64, opt_i64, opt_usize, req_f64};
use crate::domain::{ArgError, Kwargs, MungeKind, Series};

pub(super) fn register(reg: &mut MungeRegistry) {
    let m = MungeKind::SeriesMethod;
    reg.register(m, "ffill", ffill);
    reg.register(m, "bfill", bfill);
    reg.register(m, "fillna", fillna);
    reg.register(m, "dropna", dropna);
    reg.register(m, "shift", shift);
    reg.register(m, "diff", diff);
    reg.register(m, "pct_change", pct_change);
    reg.register(m, "add", add);
    reg.register(m, "mul", mul);
    reg.register(m, "div", div);
    reg.register(m, "abs", abs);
    reg.register(m, "round", round);
    reg.register(m, "clip", clip);
    reg.register(m, "cumsum", cumsum);
    reg.register(m, "head", head);
    reg.register(m, "tail", tail);
}

fn map_values(series: Series, f: impl Fn(f64) -> f64) -> Series {
    let values = series.values().map(|v| v.map(&f)).collect();
    series.with_values(values)
}

fn fill_forward(values: &[Option<f64>], limit: Option<usize>) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut last = None;
    let mut run = 0usize;
    for v in values {
        match v {
            Some(x) => {
                last = Some(*x);
                run = 0;
                out.push(Some(*x));
            }
            None => {
                run += 1;
                let within = limit.map_or(true, |l| run <= l);
                out.push(if within { last } else { None });
            }
        }
    }
    out
}

/// Forward fill, at most `limit` consecutive gaps.
pub fn ffill(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let limit = opt_usize(args, "limit")?;
    let values: Vec<Option<f64>> = series.values().collect();
    Ok(series.with_values(fill_forward(&values, limit)))
}

/// Backward fill, at most `limit` consecutive gaps.
pub fn bfill(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let limit = opt_usize(args, "limit")?;
    let mut values: Vec<Option<f64>> = series.values().collect();
    values.reverse();
    let mut filled = fill_forward(&values, limit);
    filled.reverse();
    Ok(series.with_values(filled))
}

pub fn fillna(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let value = req_f64(args, "value")?;
    let values = series.values().map(|v| v.or(Some(value))).collect();
    Ok(series.with_values(values))
}

pub fn dropna(mut series: Series, _args: &Kwargs) -> Result<Series, MungeError> {
    series.points.retain(|p| p.value.is_some());
    Ok(series)
}

/// Value `periods` rows before row `i`. Periods beyond the series length
/// are clamped so the offset cannot overflow.
fn lagged(values: &[Option<f64>], periods: i64, i: usize) -> Option<f64> {
    let n = values.len() as i64;
    let j = i as i64 - periods.clamp(-n, n);
    if j < 0 || j >= n {
        None
    } else {
        values[j as usize]
    }
}

/// Shift values by `periods` positions (default 1); the index stays put.
pub fn shift(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let periods = opt_i64(args, "periods")?.unwrap_or(1);
    let values: Vec<Option<f64>> = series.values().collect();
    let shifted = (0..values.len())
        .map(|i| lagged(&values, periods, i))
        .collect();
    Ok(series.with_values(shifted))
}

pub fn diff(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let periods = opt_i64(args, "periods")?.unwrap_or(1);
    let values: Vec<Option<f64>> = series.values().collect();
    let out = (0..values.len())
        .map(|i| match (values[i], lagged(&values, periods, i)) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        })
        .collect();
    Ok(series.with_values(out))
}

/// Fractional change; missing where the prior value is missing or zero.
pub fn pct_change(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let periods = opt_i64(args, "periods")?.unwrap_or(1);
    let values: Vec<Option<f64>> = series.values().collect();
    let out = (0..values.len())
        .map(|i| match (values[i], lagged(&values, periods, i)) {
            (Some(a), Some(b)) if b != 0.0 => Some(a / b - 1.0),
            _ => None,
        })
        .collect();
    Ok(series.with_values(out))
}

pub fn add(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let other = req_f64(args, "other")?;
    Ok(map_values(series, |x| x + other))
}

pub fn mul(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let other = req_f64(args, "other")?;
    Ok(map_values(series, |x| x * other))
}

pub fn div(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let other = req_f64(args, "other")?;
    if other == 0.0 {
        return Err(ArgError::OutOfRange {
            name: "other".into(),
            reason: "division by zero".into(),
        }
        .into());
    }
    Ok(map_values(series, |x| x / other))
}

pub fn abs(series: Series, _args: &Kwargs) -> Result<Series, MungeError> {
    Ok(map_values(series, f64::abs))
}

/// Largest decimal exponent an f64 can represent.
const MAX_DECIMALS: i64 = 308;

pub fn round(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let decimals = opt_i64(args, "decimals")?.unwrap_or(0);
    if !(-MAX_DECIMALS..=MAX_DECIMALS).contains(&decimals) {
        return Err(ArgError::OutOfRange {
            name: "decimals".into(),
            reason: format!("{decimals} is outside -{MAX_DECIMALS}..={MAX_DECIMALS}"),
        }
        .into());
    }
    let scale = 10f64.powi(decimals as i32);
    Ok(map_values(series, |x| (x * scale).round() / scale))
}

pub fn clip(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let lower = opt_f64(args, "lower")?.unwrap_or(f64::NEG_INFINITY);
    let upper = opt_f64(args, "upper")?.unwrap_or(f64::INFINITY);
    for (name, bound) in [("lower", lower), ("upper", upper)] {
        if bound.is_nan() {
            return Err(ArgError::OutOfRange {
                name: name.into(),
                reason: "bound is NaN".into(),
            }
            .into());
        }
    }
    if lower > upper {
        return Err(ArgError::OutOfRange {
            name: "lower".into(),
            reason: format!("{lower} is above upper bound {upper}"),
        }
        .into());
    }
    Ok(map_values(series, |x| x.clamp(lower, upper)))
}

/// Running sum over present values; missing rows stay missing.
pub fn cumsum(series: Series, _args: &Kwargs) -> Result<Series, MungeError> {
    let mut acc = 0.0;
    let values = series
        .values()
        .map(|v| {
            v.map(|x| {
                acc += x;
                acc
            })
        })
        .collect();
    Ok(series.with_values(values))
}

pub fn head(mut series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let n = opt_usize(args, "n")?.unwrap_or(5);
    series.points.truncate(n);
    Ok(series)
}

pub fn tail(mut series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let n = opt_usize(args, "n")?.unwrap_or(5);
    let start = series.points.len().saturating_sub(n);
    series.points.drain(..start);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kwargs;

    fn s(values: &[Option<f64>]) -> Series {
        Series::from_pairs("x", values.iter().enumerate().map(|(i, v)| (i as i64, *v)))
    }

    fn vals(series: &Series) -> Vec<Option<f64>> {
        series.values().collect()
    }

    #[test]
    fn ffill_respects_limit() {
        let out = ffill(
            s(&[Some(1.0), None, None, Some(4.0)]),
            &kwargs([("limit", 1i64)]),
        )
        .unwrap();
        assert_eq!(vals(&out), vec![Some(1.0), Some(1.0), None, Some(4.0)]);
    }

    #[test]
    fn leading_gap_survives_ffill() {
        let out = ffill(s(&[None, Some(2.0)]), &Kwargs::new()).unwrap();
        assert_eq!(vals(&out), vec![None, Some(2.0)]);
    }

    #[test]
    fn bfill_fills_backwards() {
        let out = bfill(s(&[None, None, Some(3.0)]), &Kwargs::new()).unwrap();
        assert_eq!(vals(&out), vec![Some(3.0), Some(3.0), Some(3.0)]);
    }

    #[test]
    fn shift_keeps_index_and_moves_values() {
        let out = shift(s(&[Some(1.0), Some(2.0), Some(3.0)]), &Kwargs::new()).unwrap();
        assert_eq!(vals(&out), vec![None, Some(1.0), Some(2.0)]);
        let back = shift(
            s(&[Some(1.0), Some(2.0), Some(3.0)]),
            &kwargs([("periods", -1i64)]),
        )
        .unwrap();
        assert_eq!(vals(&back), vec![Some(2.0), Some(3.0), None]);
    }

    #[test]
    fn pct_change_skips_zero_base() {
        let out = pct_change(s(&[Some(0.0), Some(2.0), Some(3.0)]), &Kwargs::new()).unwrap();
        assert_eq!(vals(&out), vec![None, None, Some(0.5)]);
    }

    #[test]
    fn div_by_zero_is_an_argument_error() {
        let err = div(s(&[Some(1.0)]), &kwargs([("other", 0.0)])).unwrap_err();
        assert!(matches!(err, MungeError::Args(ArgError::OutOfRange { .. })));
    }

    #[test]
    fn cumsum_skips_missing() {
        let out = cumsum(s(&[Some(1.0), None, Some(2.0)]), &Kwargs::new()).unwrap();
        assert_eq!(vals(&out), vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn round_and_clip() {
        let out = round(s(&[Some(1.2345)]), &kwargs([("decimals", 2i64)])).unwrap();
        assert_eq!(vals(&out), vec![Some(1.23)]);
        let out = clip(s(&[Some(-5.0), Some(5.0)]), &kwargs([("lower", 0.0)])).unwrap();
        assert_eq!(vals(&out), vec![Some(0.0), Some(5.0)]);
    }

    #[test]
    fn nan_clip_bound_is_an_argument_error() {
        for key in ["lower", "upper"] {
            let err = clip(s(&[Some(1.0)]), &kwargs([(key, f64::NAN)])).unwrap_err();
            assert!(matches!(err, MungeError::Args(ArgError::OutOfRange { .. })));
        }
    }

    #[test]
    fn huge_round_decimals_are_rejected() {
        let err = round(s(&[Some(1.0)]), &kwargs([("decimals", i64::MAX)])).unwrap_err();
        assert!(matches!(err, MungeError::Args(ArgError::OutOfRange { .. })));
        let err = round(s(&[Some(1.0)]), &kwargs([("decimals", 1i64 << 32)])).unwrap_err();
        assert!(matches!(err, MungeError::Args(ArgError::OutOfRange { .. })));
    }

    #[test]
    fn extreme_periods_shift_everything_out() {
        let data = [Some(1.0), Some(2.0)];
        for periods in [i64::MIN, i64::MAX] {
            let out = shift(s(&data), &kwargs([("periods", periods)])).unwrap();
            assert_eq!(vals(&out), vec![None, None]);
            let out = diff(s(&data), &kwargs([("periods", periods)])).unwrap();
            assert_eq!(vals(&out), vec![None, None]);
        }
    }

    #[test]
    fn head_and_tail() {
        let data = [Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(head(s(&data), &kwargs([("n", 2i64)])).unwrap().len(), 2);
        let t = tail(s(&data), &kwargs([("n", 1i64)])).unwrap();
        assert_eq!(vals(&t), vec![Some(3.0)]);
    }

    #[test]
    fn dropna_removes_rows() {
        let out = dropna(s(&[Some(1.0), None]), &Kwargs::new()).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn wrong_argument_type_is_reported() {
        let err = fillna(s(&[None]), &kwargs([("value", "zero")])).unwrap_err();
        assert!(matches!(err, MungeError::Args(ArgError::WrongType { .. })));
    }
}
