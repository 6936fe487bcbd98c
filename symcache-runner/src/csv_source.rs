//! CSV source adapter.
//!
//! Parameters:
//! - `path` (required): file to read
//! - `index_column`: header of the index column (default: first column)
//! - `data_column`: header of the value column (default: second column)
//! - `delimiter`: single character (default `,`)
//!
//! Index values are inferred (date, datetime, integer, then text) and
//! coerced to the Symbol's index kind later by the feed stage. Empty cells,
//! `NaN`, `null` and `NA` are missing values.

use std::path::Path;

use symcache_core::domain::kwargs::{opt_str, req_str};
use symcache_core::domain::{ArgError, IndexValue, Kwargs, Point, Series};
use symcache_core::source::{SourceAdapter, SourceError};

const MISSING: &[&str] = &["", "nan", "null", "na", "n/a", "none"];

#[derive(Debug, Clone)]
pub struct CsvSource {
    name: String,
}

impl CsvSource {
    pub fn new() -> Self {
        Self::named("csv")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for CsvSource {
    fn default() -> Self {
        Self::new()
    }
}

fn column_position(
    headers: &csv::StringRecord,
    wanted: Option<&str>,
    fallback: usize,
    param: &str,
) -> Result<usize, SourceError> {
    match wanted {
        Some(name) => headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
            ArgError::OutOfRange {
                name: param.to_string(),
                reason: format!("no column '{name}'"),
            }
            .into()
        }),
        None if fallback < headers.len() => Ok(fallback),
        None => Err(ArgError::OutOfRange {
            name: param.to_string(),
            reason: format!("file has only {} columns", headers.len()),
        }
        .into()),
    }
}

fn parse_value(raw: &str) -> Result<Option<f64>, String> {
    let raw = raw.trim();
    if MISSING.contains(&raw.to_ascii_lowercase().as_str()) {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|e| format!("value '{raw}': {e}"))
}

impl SourceAdapter for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, params: &Kwargs) -> Result<Series, SourceError> {
        let path = req_str(params, "path")?;
        let delimiter = match opt_str(params, "delimiter")? {
            None => b',',
            Some(d) if d.len() == 1 => d.as_bytes()[0],
            Some(d) => {
                return Err(ArgError::OutOfRange {
                    name: "delimiter".into(),
                    reason: format!("'{d}' is not a single byte"),
                }
                .into())
            }
        };
        let display = path.to_string();
        let io = |e: csv::Error| SourceError::Io {
            path: display.clone(),
            message: e.to_string(),
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_path(Path::new(path))
            .map_err(io)?;
        let headers = reader.headers().map_err(io)?.clone();
        let index_at = column_position(&headers, opt_str(params, "index_column")?, 0, "index_column")?;
        let data_at = column_position(&headers, opt_str(params, "data_column")?, 1, "data_column")?;

        let mut points = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(io)?;
            let parse_err = |message: String| SourceError::Parse {
                path: display.clone(),
                row: row + 1,
                message,
            };
            let index = record
                .get(index_at)
                .ok_or_else(|| parse_err("missing index cell".into()))?;
            let value = record.get(data_at).unwrap_or("");
            points.push(Point {
                index: IndexValue::infer(index),
                value: parse_value(value).map_err(parse_err)?,
            });
        }
        tracing::debug!(path, rows = points.len(), "read csv");
        Ok(Series::new(path, points))
    }
}
