//! Index values and index-kind strategies.
//!
//! Every series in the pipeline is keyed by an `IndexValue`. A Symbol declares
//! one `IndexKind`; feed output is coerced into that kind before it is
//! aligned, and the kind decides how index values are written to storage.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DATE_FMT: &str = "%Y-%m-%d";
const DATETIME_FMTS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// A single index value of a series row.
///
/// Ordering is derived: values of the same kind compare naturally. Values of
/// different kinds only meet when a coercion failure was absorbed, in which
/// case they sort by kind first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexValue {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Integer(i64),
    Text(String),
}

impl IndexValue {
    /// The kind this value currently belongs to.
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexValue::Date(_) => IndexKind::Date,
            IndexValue::DateTime(_) => IndexKind::DateTime,
            IndexValue::Integer(_) => IndexKind::Integer,
            IndexValue::Text(_) => IndexKind::Text,
        }
    }

    /// Calendar date of a date-like value.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            IndexValue::Date(d) => Some(*d),
            IndexValue::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    /// Best-effort parse of an untyped raw value (used by source adapters).
    ///
    /// Tries date, then datetime, then integer, and falls back to text.
    pub fn infer(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(d) = NaiveDate::parse_from_str(raw, DATE_FMT) {
            return IndexValue::Date(d);
        }
        for fmt in DATETIME_FMTS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
                return IndexValue::DateTime(dt);
            }
        }
        if let Ok(i) = raw.parse::<i64>() {
            return IndexValue::Integer(i);
        }
        IndexValue::Text(raw.to_string())
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Date(d) => write!(f, "{}", d.format(DATE_FMT)),
            IndexValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            IndexValue::Integer(i) => write!(f, "{i}"),
            IndexValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<NaiveDate> for IndexValue {
    fn from(d: NaiveDate) -> Self {
        IndexValue::Date(d)
    }
}

impl From<i64> for IndexValue {
    fn from(i: i64) -> Self {
        IndexValue::Integer(i)
    }
}

/// Errors raised while coercing or decoding index values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    #[error("cannot coerce index value '{value}' to {target}")]
    Coerce { value: String, target: IndexKind },

    #[error("cannot parse '{raw}' as {target} index")]
    Parse { raw: String, target: IndexKind },

    #[error("unknown index kind '{0}' (expected date, datetime, integer or text)")]
    UnknownKind(String),

    #[error("stored index value {0} has the wrong shape")]
    Storage(String),
}

/// The index domain of a Symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Integer,
    Text,
}

impl IndexKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Date => "date",
            IndexKind::DateTime => "datetime",
            IndexKind::Integer => "integer",
            IndexKind::Text => "text",
        }
    }

    /// Column type used by storage backends for the `indx` column.
    pub fn storage_type(&self) -> &'static str {
        match self {
            IndexKind::Date => "DATE",
            IndexKind::DateTime => "TIMESTAMP",
            IndexKind::Integer => "BIGINT",
            IndexKind::Text => "TEXT",
        }
    }

    /// Parse a user-supplied string (CLI, catalog) as a value of this kind.
    pub fn parse(&self, raw: &str) -> Result<IndexValue, IndexError> {
        let raw = raw.trim();
        let err = || IndexError::Parse {
            raw: raw.to_string(),
            target: *self,
        };
        match self {
            IndexKind::Date => NaiveDate::parse_from_str(raw, DATE_FMT)
                .map(IndexValue::Date)
                .map_err(|_| err()),
            IndexKind::DateTime => DATETIME_FMTS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(raw, DATE_FMT)
                        .ok()
                        .map(|d| d.and_time(NaiveTime::MIN))
                })
                .map(IndexValue::DateTime)
                .ok_or_else(err),
            IndexKind::Integer => raw.parse().map(IndexValue::Integer).map_err(|_| err()),
            IndexKind::Text => Ok(IndexValue::Text(raw.to_string())),
        }
    }

    /// Coerce a value into this kind.
    ///
    /// Lossless conversions only: a datetime becomes a date only at midnight,
    /// text is parsed, and anything becomes text.
    pub fn coerce(&self, value: IndexValue) -> Result<IndexValue, IndexError> {
        if value.kind() == *self {
            return Ok(value);
        }
        let fail = |v: &IndexValue| IndexError::Coerce {
            value: v.to_string(),
            target: *self,
        };
        match (self, &value) {
            (IndexKind::Date, IndexValue::DateTime(dt)) if dt.time() == NaiveTime::MIN => {
                Ok(IndexValue::Date(dt.date()))
            }
            (IndexKind::DateTime, IndexValue::Date(d)) => {
                Ok(IndexValue::DateTime(d.and_time(NaiveTime::MIN)))
            }
            (IndexKind::Text, v) => Ok(IndexValue::Text(v.to_string())),
            (kind, IndexValue::Text(raw)) => kind.parse(raw).map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        }
    }

    /// Encode an index value for storage.
    pub fn to_storage(&self, value: &IndexValue) -> serde_json::Value {
        match value {
            IndexValue::Integer(i) => serde_json::Value::from(*i),
            other => serde_json::Value::String(other.to_string()),
        }
    }

    /// Decode a stored index value.
    pub fn from_storage(&self, raw: &serde_json::Value) -> Result<IndexValue, IndexError> {
        match (self, raw) {
            (IndexKind::Integer, serde_json::Value::Number(n)) => n
                .as_i64()
                .map(IndexValue::Integer)
                .ok_or_else(|| IndexError::Storage(raw.to_string())),
            (kind, serde_json::Value::String(s)) => kind.parse(s),
            _ => Err(IndexError::Storage(raw.to_string())),
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "date" => Ok(IndexKind::Date),
            "datetime" | "timestamp" => Ok(IndexKind::DateTime),
            "integer" | "int" => Ok(IndexKind::Integer),
            "text" | "string" => Ok(IndexKind::Text),
            other => Err(IndexError::UnknownKind(other.to_string())),
        }
    }
}

/// A Symbol's index specification: a display name plus the kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub kind: IndexKind,
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self {
            name: "UNNAMED".into(),
            kind: IndexKind::Date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FMT).unwrap()
    }

    #[test]
    fn infer_prefers_dates_then_integers() {
        assert_eq!(IndexValue::infer("2020-01-02"), IndexValue::Date(date("2020-01-02")));
        assert_eq!(IndexValue::infer(" 42 "), IndexValue::Integer(42));
        assert_eq!(IndexValue::infer("Q1"), IndexValue::Text("Q1".into()));
        assert!(matches!(
            IndexValue::infer("2020-01-02 10:30:00"),
            IndexValue::DateTime(_)
        ));
    }

    #[test]
    fn midnight_datetime_coerces_to_date() {
        let dt = date("2020-01-02").and_time(NaiveTime::MIN);
        let coerced = IndexKind::Date.coerce(IndexValue::DateTime(dt)).unwrap();
        assert_eq!(coerced, IndexValue::Date(date("2020-01-02")));
    }

    #[test]
    fn intraday_datetime_does_not_coerce_to_date() {
        let dt = NaiveDateTime::parse_from_str("2020-01-02T10:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        assert!(IndexKind::Date.coerce(IndexValue::DateTime(dt)).is_err());
    }

    #[test]
    fn integer_does_not_coerce_to_date() {
        let err = IndexKind::Date.coerce(IndexValue::Integer(5)).unwrap_err();
        assert!(matches!(err, IndexError::Coerce { .. }));
    }

    #[test]
    fn text_parses_into_target_kind() {
        let v = IndexKind::Integer.coerce(IndexValue::Text("17".into())).unwrap();
        assert_eq!(v, IndexValue::Integer(17));
    }

    #[test]
    fn storage_encoding_is_reversible_per_kind() {
        let values = [
            (IndexKind::Date, IndexValue::Date(date("2021-03-04"))),
            (IndexKind::Integer, IndexValue::Integer(-3)),
            (IndexKind::Text, IndexValue::Text("abc".into())),
        ];
        for (kind, value) in values {
            let stored = kind.to_storage(&value);
            assert_eq!(kind.from_storage(&stored).unwrap(), value);
        }
    }

    #[test]
    fn kind_names_parse() {
        assert_eq!("DateTime".parse::<IndexKind>().unwrap(), IndexKind::DateTime);
        assert!("period".parse::<IndexKind>().is_err());
    }
}
