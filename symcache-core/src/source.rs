//! Source adapters: fetch a raw series given parameters.
//!
//! Concrete providers live outside the core. The registry maps a
//! source-type string to an adapter; `StaticSource` serves in-memory series
//! for tests and demos.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::domain::kwargs::req_str;
use crate::domain::{ArgError, Kwargs, Series};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no source adapter registered for type '{0}'")]
    UnknownType(String),

    #[error("bad source parameters: {0}")]
    Params(#[from] ArgError),

    #[error("source '{source_type}' has no series for key '{key}'")]
    NotFound { source_type: String, key: String },

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("parse error in {path} at row {row}: {message}")]
    Parse {
        path: String,
        row: usize,
        message: String,
    },

    #[error("{0}")]
    Provider(String),
}

/// One external provider.
pub trait SourceAdapter: Send + Sync {
    /// The source-type string this adapter is registered under.
    fn name(&self) -> &str;

    /// Fetch the raw series for the resolved parameters.
    fn fetch(&self, params: &Kwargs) -> Result<Series, SourceError>;
}

#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the adapter's own name, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, source_type: &str) -> Result<&Arc<dyn SourceAdapter>, SourceError> {
        self.adapters
            .get(source_type)
            .ok_or_else(|| SourceError::UnknownType(source_type.to_string()))
    }

    pub fn fetch(&self, source_type: &str, params: &Kwargs) -> Result<Series, SourceError> {
        self.get(source_type)?.fetch(params)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// In-memory adapter keyed by the `key` parameter.
#[derive(Debug, Default)]
pub struct StaticSource {
    name: String,
    series: RwLock<HashMap<String, Series>>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn with(self, key: impl Into<String>, series: Series) -> Self {
        self.insert(key, series);
        self
    }

    /// Add or replace the series served for `key`.
    pub fn insert(&self, key: impl Into<String>, series: Series) {
        if let Ok(mut map) = self.series.write() {
            map.insert(key.into(), series);
        }
    }
}

impl SourceAdapter for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, params: &Kwargs) -> Result<Series, SourceError> {
        let key = req_str(params, "key")?;
        let map = self
            .series
            .read()
            .map_err(|_| SourceError::Provider("static source lock poisoned".into()))?;
        map.get(key).cloned().ok_or_else(|| SourceError::NotFound {
            source_type: self.name.clone(),
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kwargs;

    fn registry() -> SourceRegistry {
        let src = StaticSource::new("static")
            .with("a", Series::from_pairs("a", [(1i64, Some(1.0))]));
        SourceRegistry::new().with(Arc::new(src))
    }

    #[test]
    fn fetch_by_key() {
        let s = registry()
            .fetch("static", &kwargs([("key", "a")]))
            .unwrap();
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let err = registry().fetch("bloomberg", &Kwargs::new()).unwrap_err();
        assert!(matches!(err, SourceError::UnknownType(_)));
    }

    #[test]
    fn missing_key_parameter() {
        let err = registry().fetch("static", &Kwargs::new()).unwrap_err();
        assert!(matches!(err, SourceError::Params(ArgError::Missing(_))));
    }

    #[test]
    fn unknown_key() {
        let err = registry()
            .fetch("static", &kwargs([("key", "zzz")]))
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }
}
