//! Settings: the raise-by-default switch and externally configured
//! sourcing parameters.
//!
//! ```toml
//! raise_by_default = false
//!
//! [sourcing.csv.prod]
//! path = "/data/prod/eurcad.csv"
//! ```
//!
//! A feed with `source_type = "csv"` and `sourcing_key = "prod"` gets the
//! `[sourcing.csv.prod]` table merged over its stored parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::Kwargs;
use crate::handling::HandleDefaults;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {message}")]
    Read { path: String, message: String },

    #[error("parse settings TOML: {0}")]
    Parse(String),

    #[error("no sourcing parameters configured for {source_type}.{key}")]
    MissingSourcingKey { source_type: String, key: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub raise_by_default: bool,
    /// source type → sourcing key → parameter overrides.
    #[serde(default)]
    pub sourcing: BTreeMap<String, BTreeMap<String, Kwargs>>,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn handle_defaults(&self) -> HandleDefaults {
        HandleDefaults {
            raise_by_default: self.raise_by_default,
        }
    }

    pub fn sourcing_overrides(&self, source_type: &str, key: &str) -> Result<&Kwargs, ConfigError> {
        self.sourcing
            .get(source_type)
            .and_then(|keys| keys.get(key))
            .ok_or_else(|| ConfigError::MissingSourcingKey {
                source_type: source_type.to_string(),
                key: key.to_string(),
            })
    }

    /// Stored parameters with the configured overrides on top. External
    /// configuration wins for matching keys.
    pub fn resolve_params(
        &self,
        source_type: &str,
        sourcing_key: Option<&str>,
        stored: &Kwargs,
    ) -> Result<Kwargs, ConfigError> {
        let mut params = stored.clone();
        if let Some(key) = sourcing_key {
            for (k, v) in self.sourcing_overrides(source_type, key)? {
                params.insert(k.clone(), v.clone());
            }
        }
        Ok(params)
    }
}
