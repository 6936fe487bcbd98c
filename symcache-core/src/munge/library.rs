//! Library functions: windowed statistics taking the series as first
//! argument.

use super::{MungeError, MungeRegistry};
use crate::domain::kwargs::{opt_usize, req_f64, req_usize};
use crate::domain::{ArgError, Kwargs, MungeKind, Series};

pub(super) fn register(reg: &mut MungeRegistry) {
    let f = MungeKind::LibraryFunction;
    reg.register(f, "rolling_mean", rolling_mean);
    reg.register(f, "rolling_sum", rolling_sum);
    reg.register(f, "rolling_std", rolling_std);
    reg.register(f, "expanding_mean", expanding_mean);
    reg.register(f, "ewma", ewma);
}

fn window_args(args: &Kwargs) -> Result<(usize, usize), MungeError> {
    let window = req_usize(args, "window")?;
    if window == 0 {
        return Err(ArgError::OutOfRange {
            name: "window".into(),
            reason: "must be at least 1".into(),
        }
        .into());
    }
    let min_periods = opt_usize(args, "min_periods")?.unwrap_or(window);
    Ok((window, min_periods))
}

/// Apply `stat` to the present values of each trailing window.
fn rolling(
    series: Series,
    window: usize,
    min_periods: usize,
    stat: impl Fn(&[f64]) -> Option<f64>,
) -> Series {
    let values: Vec<Option<f64>> = series.values().collect();
    let out = (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let present: Vec<f64> = values[start..=i].iter().flatten().copied().collect();
            if present.len() < min_periods.max(1) {
                None
            } else {
                stat(&present)
            }
        })
        .collect();
    series.with_values(out)
}

fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

/// Sample standard deviation (n - 1 denominator).
fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(var.sqrt())
}

pub fn rolling_mean(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let (window, min_periods) = window_args(args)?;
    Ok(rolling(series, window, min_periods, mean))
}

pub fn rolling_sum(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let (window, min_periods) = window_args(args)?;
    Ok(rolling(series, window, min_periods, |xs| {
        Some(xs.iter().sum())
    }))
}

pub fn rolling_std(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let (window, min_periods) = window_args(args)?;
    Ok(rolling(series, window, min_periods, sample_std))
}

pub fn expanding_mean(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let min_periods = opt_usize(args, "min_periods")?.unwrap_or(1).max(1);
    let mut sum = 0.0;
    let mut count = 0usize;
    let values = series
        .values()
        .map(|v| {
            if let Some(x) = v {
                sum += x;
                count += 1;
            }
            (count >= min_periods).then(|| sum / count as f64)
        })
        .collect();
    Ok(series.with_values(values))
}

/// Exponentially weighted mean with `alpha = 2 / (span + 1)`, unadjusted.
/// Missing inputs give missing outputs and leave the running state alone.
pub fn ewma(series: Series, args: &Kwargs) -> Result<Series, MungeError> {
    let span = req_f64(args, "span")?;
    if span < 1.0 {
        return Err(ArgError::OutOfRange {
            name: "span".into(),
            reason: format!("{span} is below 1"),
        }
        .into());
    }
    let alpha = 2.0 / (span + 1.0);
    let mut state: Option<f64> = None;
    let values = series
        .values()
        .map(|v| {
            let x = v?;
            let next = match state {
                None => x,
                Some(prev) => (1.0 - alpha) * prev + alpha * x,
            };
            state = Some(next);
            Some(next)
        })
        .collect();
    Ok(series.with_values(values))
}
