//! Data-kind strategies: how a Symbol's values are typed and stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataKindError {
    #[error("value {value} is not representable as {kind}")]
    NotRepresentable { value: f64, kind: DataKind },

    #[error("unknown data kind '{0}' (expected float, integer or skip)")]
    UnknownKind(String),

    #[error("stored value {0} is not numeric")]
    Storage(String),
}

/// The value domain of a Symbol.
///
/// `Skip` passes values through untouched apart from mapping NaN to missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Float,
    Integer,
    #[default]
    Skip,
}

impl DataKind {
    pub fn name(&self) -> &'static str {
        match self {
            DataKind::Float => "float",
            DataKind::Integer => "integer",
            DataKind::Skip => "skip",
        }
    }

    /// Column type used by storage backends for data columns.
    pub fn storage_type(&self) -> &'static str {
        match self {
            DataKind::Float | DataKind::Skip => "DOUBLE PRECISION",
            DataKind::Integer => "BIGINT",
        }
    }

    /// Coerce one value into this kind. NaN always becomes missing.
    pub fn coerce(&self, value: Option<f64>) -> Result<Option<f64>, DataKindError> {
        let Some(v) = value else {
            return Ok(None);
        };
        if v.is_nan() {
            return Ok(None);
        }
        match self {
            DataKind::Skip => Ok(Some(v)),
            DataKind::Float if v.is_finite() => Ok(Some(v)),
            DataKind::Integer if v.is_finite() && v.abs() < i64::MAX as f64 => Ok(Some(v.trunc())),
            kind => Err(DataKindError::NotRepresentable { value: v, kind: *kind }),
        }
    }

    /// Encode a value for storage. Non-finite values are stored as missing.
    pub fn to_storage(&self, value: Option<f64>) -> serde_json::Value {
        match (self, value) {
            (_, None) => serde_json::Value::Null,
            (DataKind::Integer, Some(v)) if v.is_finite() => serde_json::Value::from(v as i64),
            (_, Some(v)) => serde_json::Number::from_f64(v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }

    /// Decode a stored value.
    pub fn from_storage(&self, raw: &serde_json::Value) -> Result<Option<f64>, DataKindError> {
        match raw {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| DataKindError::Storage(raw.to_string())),
            _ => Err(DataKindError::Storage(raw.to_string())),
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataKind {
    type Err = DataKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float" => Ok(DataKind::Float),
            "integer" | "int" => Ok(DataKind::Integer),
            "skip" => Ok(DataKind::Skip),
            other => Err(DataKindError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_becomes_missing_for_every_kind() {
        for kind in [DataKind::Float, DataKind::Integer, DataKind::Skip] {
            assert_eq!(kind.coerce(Some(f64::NAN)).unwrap(), None);
        }
    }

    #[test]
    fn integer_truncates() {
        assert_eq!(DataKind::Integer.coerce(Some(3.9)).unwrap(), Some(3.0));
        assert_eq!(DataKind::Integer.coerce(Some(-3.9)).unwrap(), Some(-3.0));
    }

    #[test]
    fn float_rejects_infinity_but_skip_passes_it() {
        assert!(DataKind::Float.coerce(Some(f64::INFINITY)).is_err());
        assert_eq!(
            DataKind::Skip.coerce(Some(f64::INFINITY)).unwrap(),
            Some(f64::INFINITY)
        );
    }

    #[test]
    fn integer_storage_is_a_json_integer() {
        let stored = DataKind::Integer.to_storage(Some(7.0));
        assert_eq!(stored, serde_json::json!(7));
        assert_eq!(DataKind::Integer.from_storage(&stored).unwrap(), Some(7.0));
        assert_eq!(DataKind::Float.from_storage(&serde_json::Value::Null).unwrap(), None);
    }
}
