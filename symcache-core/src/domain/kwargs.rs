//! Typed keyword arguments for source parameters, munge steps and validators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A single keyword-argument value.
///
/// Deserializes untagged, so TOML `true`, `3`, `1.5` and `"x"` map onto the
/// obvious variants. Opaque values are written as `{ opaque = "..." }` and are
/// handed to adapters verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KwargValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Opaque { opaque: String },
}

impl KwargValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            KwargValue::Bool(_) => "bool",
            KwargValue::Int(_) => "int",
            KwargValue::Float(_) => "float",
            KwargValue::Str(_) => "string",
            KwargValue::Opaque { .. } => "opaque",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            KwargValue::Int(i) => Some(*i as f64),
            KwargValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            KwargValue::Int(i) => Some(*i),
            KwargValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KwargValue::Str(s) => Some(s),
            KwargValue::Opaque { opaque } => Some(opaque),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            KwargValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Parse a `key=value` style command-line literal.
    pub fn parse_literal(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "true" => KwargValue::Bool(true),
            "false" => KwargValue::Bool(false),
            _ => raw
                .parse::<i64>()
                .map(KwargValue::Int)
                .or_else(|_| raw.parse::<f64>().map(KwargValue::Float))
                .unwrap_or_else(|_| KwargValue::Str(raw.to_string())),
        }
    }
}

impl fmt::Display for KwargValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KwargValue::Bool(b) => write!(f, "{b}"),
            KwargValue::Int(i) => write!(f, "{i}"),
            KwargValue::Float(x) => write!(f, "{x}"),
            KwargValue::Str(s) => write!(f, "'{s}'"),
            KwargValue::Opaque { opaque } => write!(f, "<{opaque}>"),
        }
    }
}

impl From<f64> for KwargValue {
    fn from(v: f64) -> Self {
        KwargValue::Float(v)
    }
}

impl From<i64> for KwargValue {
    fn from(v: i64) -> Self {
        KwargValue::Int(v)
    }
}

impl From<bool> for KwargValue {
    fn from(v: bool) -> Self {
        KwargValue::Bool(v)
    }
}

impl From<&str> for KwargValue {
    fn from(v: &str) -> Self {
        KwargValue::Str(v.to_string())
    }
}

impl From<String> for KwargValue {
    fn from(v: String) -> Self {
        KwargValue::Str(v)
    }
}

/// Keyword arguments. `BTreeMap` keeps rendering and hashing deterministic.
pub type Kwargs = BTreeMap<String, KwargValue>;

/// Build a `Kwargs` map from literal pairs.
pub fn kwargs<I, K, V>(pairs: I) -> Kwargs
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<KwargValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Render kwargs as `{a=1, b='x'}` for report points.
pub fn render(args: &Kwargs) -> String {
    let body: Vec<String> = args.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", body.join(", "))
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgError {
    #[error("missing required argument '{0}'")]
    Missing(String),

    #[error("argument '{name}' must be {expected}, got {got}")]
    WrongType {
        name: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("argument '{name}' is out of range: {reason}")]
    OutOfRange { name: String, reason: String },
}

fn typed<T>(
    args: &Kwargs,
    name: &str,
    expected: &'static str,
    get: impl Fn(&KwargValue) -> Option<T>,
) -> Result<Option<T>, ArgError> {
    match args.get(name) {
        None => Ok(None),
        Some(v) => get(v).map(Some).ok_or_else(|| ArgError::WrongType {
            name: name.to_string(),
            expected,
            got: v.type_name(),
        }),
    }
}

/// Optional numeric argument.
pub fn opt_f64(args: &Kwargs, name: &str) -> Result<Option<f64>, ArgError> {
    typed(args, name, "a number", KwargValue::as_f64)
}

/// Optional integer argument.
pub fn opt_i64(args: &Kwargs, name: &str) -> Result<Option<i64>, ArgError> {
    typed(args, name, "an integer", KwargValue::as_i64)
}

/// Optional non-negative integer argument.
pub fn opt_usize(args: &Kwargs, name: &str) -> Result<Option<usize>, ArgError> {
    match opt_i64(args, name)? {
        Some(v) if v < 0 => Err(ArgError::OutOfRange {
            name: name.to_string(),
            reason: format!("{v} is negative"),
        }),
        other => Ok(other.map(|v| v as usize)),
    }
}

/// Optional string argument.
pub fn opt_str<'a>(args: &'a Kwargs, name: &str) -> Result<Option<&'a str>, ArgError> {
    match args.get(name) {
        None => Ok(None),
        Some(v) => v.as_str().map(Some).ok_or_else(|| ArgError::WrongType {
            name: name.to_string(),
            expected: "a string",
            got: v.type_name(),
        }),
    }
}

/// Optional boolean argument.
pub fn opt_bool(args: &Kwargs, name: &str) -> Result<Option<bool>, ArgError> {
    typed(args, name, "a bool", KwargValue::as_bool)
}

pub fn req_f64(args: &Kwargs, name: &str) -> Result<f64, ArgError> {
    opt_f64(args, name)?.ok_or_else(|| ArgError::Missing(name.to_string()))
}

pub fn req_usize(args: &Kwargs, name: &str) -> Result<usize, ArgError> {
    opt_usize(args, name)?.ok_or_else(|| ArgError::Missing(name.to_string()))
}

pub fn req_str<'a>(args: &'a Kwargs, name: &str) -> Result<&'a str, ArgError> {
    opt_str(args, name)?.ok_or_else(|| ArgError::Missing(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_values_deserialize_from_toml() {
        let args: Kwargs = toml::from_str(
            r#"
            window = 3
            value = 1.5
            how = "last"
            skipna = true
            handle = { opaque = "conn://x" }
            "#,
        )
        .unwrap();
        assert_eq!(args["window"], KwargValue::Int(3));
        assert_eq!(args["value"], KwargValue::Float(1.5));
        assert_eq!(args["how"], KwargValue::Str("last".into()));
        assert_eq!(args["skipna"], KwargValue::Bool(true));
        assert_eq!(args["handle"].as_str(), Some("conn://x"));
    }

    #[test]
    fn integers_are_accepted_as_floats_but_not_vice_versa() {
        let args = kwargs([("n", KwargValue::Int(2)), ("x", KwargValue::Float(2.5))]);
        assert_eq!(opt_f64(&args, "n").unwrap(), Some(2.0));
        assert!(matches!(
            opt_i64(&args, "x"),
            Err(ArgError::WrongType { .. })
        ));
    }

    #[test]
    fn owned_strings_convert() {
        let path = String::from("/data/a.csv");
        let args = kwargs([("path", path)]);
        assert_eq!(req_str(&args, "path").unwrap(), "/data/a.csv");
    }

    #[test]
    fn negative_usize_is_out_of_range() {
        let args = kwargs([("window", -1i64)]);
        assert!(matches!(
            req_usize(&args, "window"),
            Err(ArgError::OutOfRange { .. })
        ));
    }

    #[test]
    fn missing_required_argument() {
        let args = Kwargs::new();
        assert_eq!(req_f64(&args, "value"), Err(ArgError::Missing("value".into())));
    }

    #[test]
    fn literal_parsing() {
        assert_eq!(KwargValue::parse_literal("3"), KwargValue::Int(3));
        assert_eq!(KwargValue::parse_literal("3.5"), KwargValue::Float(3.5));
        assert_eq!(KwargValue::parse_literal("false"), KwargValue::Bool(false));
        assert_eq!(KwargValue::parse_literal("M"), KwargValue::Str("M".into()));
    }

    #[test]
    fn render_is_sorted() {
        let args = kwargs([("b", 2i64), ("a", 1i64)]);
        assert_eq!(render(&args), "{a=1, b=2}");
    }
}
