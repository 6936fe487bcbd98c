//! Symbol catalogs: TOML files declaring Symbols, their feeds and
//! validators.
//!
//! ```toml
//! [[symbol]]
//! name = "EURCAD"
//! units = "CAD"
//! data_kind = "float"
//! handle = { aggregation = ["stdout", "report"] }
//!
//! [[symbol.feed]]
//! source_type = "csv"
//! params = { path = "data/eurcad_a.csv" }
//! munging = [{ method = "ffill", kwargs = { limit = 3 } }]
//!
//! [[symbol.validator]]
//! validator = "no_missing_final"
//! args = { lookback = 5 }
//! ```
//!
//! Definitions are checked against the registries when loaded, so an
//! unknown munge step, aggregation method or validator fails here.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use symcache_core::domain::{
    DataKind, FeedDraft, FeedState, IndexKind, Kwargs, MungeStep, SourceSpec, Symbol,
    ValidatorSpec, DEFAULT_AGG_METHOD,
};
use symcache_core::handling::{FeedHandleConfig, HandleDefaults, PolicyError, SymbolHandleConfig};
use symcache_core::{FactoryError, PipelineError, Registries, SymbolManager};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("read {path}: {message}")]
    Read { path: String, message: String },

    #[error("parse catalog TOML: {0}")]
    Parse(String),

    #[error("symbol '{0}' is declared twice")]
    Duplicate(String),

    #[error("symbol '{symbol}': {source}")]
    Policy {
        symbol: String,
        #[source]
        source: PolicyError,
    },

    #[error("symbol '{symbol}': {source}")]
    Factory {
        symbol: String,
        #[source]
        source: FactoryError,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedDef {
    pub source_type: String,
    #[serde(default)]
    pub sourcing_key: Option<String>,
    #[serde(default)]
    pub params: Kwargs,
    #[serde(default)]
    pub state: FeedState,
    #[serde(default)]
    pub munging: Vec<MungeStep>,
    #[serde(default)]
    pub handle: FeedHandleConfig,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorDef {
    pub validator: String,
    #[serde(default)]
    pub args: Kwargs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub agg_method: Option<String>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub index_kind: Option<IndexKind>,
    #[serde(default)]
    pub data_kind: Option<DataKind>,
    #[serde(default)]
    pub handle: SymbolHandleConfig,
    #[serde(default, rename = "feed")]
    pub feeds: Vec<FeedDef>,
    #[serde(default, rename = "validator")]
    pub validators: Vec<ValidatorDef>,
}

/// A parsed catalog file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    #[serde(default, rename = "symbol")]
    pub symbols: Vec<SymbolDef>,
}

/// A validated Symbol with the feeds to add to it, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolDefinition {
    pub symbol: Symbol,
    pub feeds: Vec<FeedDraft>,
}

impl Catalog {
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        toml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// Build and validate every definition.
    pub fn definitions(
        &self,
        defaults: &HandleDefaults,
        registries: &Registries,
    ) -> Result<Vec<SymbolDefinition>, CatalogError> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(self.symbols.len());
        for def in &self.symbols {
            if !seen.insert(def.name.as_str()) {
                return Err(CatalogError::Duplicate(def.name.clone()));
            }
            out.push(def.build(defaults, registries)?);
        }
        Ok(out)
    }
}

impl SymbolDef {
    fn build(
        &self,
        defaults: &HandleDefaults,
        registries: &Registries,
    ) -> Result<SymbolDefinition, CatalogError> {
        let policy = |source| CatalogError::Policy {
            symbol: self.name.clone(),
            source,
        };
        let factory = |source| CatalogError::Factory {
            symbol: self.name.clone(),
            source,
        };

        let mut symbol = Symbol::new(&self.name, defaults)
            .with_description(&self.description)
            .with_units(&self.units)
            .with_agg_method(self.agg_method.as_deref().unwrap_or(DEFAULT_AGG_METHOD))
            .with_handle(self.handle.build(defaults).map_err(policy)?);
        if let Some(name) = &self.index_name {
            symbol.index.name = name.clone();
        }
        if let Some(kind) = self.index_kind {
            symbol.index.kind = kind;
        }
        if let Some(kind) = self.data_kind {
            symbol.data_kind = kind;
        }
        symbol.validators = self
            .validators
            .iter()
            .enumerate()
            .map(|(vid, v)| ValidatorSpec {
                vid: vid as u32,
                validator: v.validator.clone(),
                args: v.args.clone(),
            })
            .collect();
        registries.validate_symbol(&symbol).map_err(factory)?;

        let mut feeds = Vec::with_capacity(self.feeds.len());
        for def in &self.feeds {
            registries.munges.validate(&def.munging).map_err(factory)?;
            let mut source = SourceSpec::new(&def.source_type);
            source.sourcing_key = def.sourcing_key.clone();
            source.params = def.params.clone();
            let mut draft = FeedDraft::new(source)
                .state(def.state)
                .handle(def.handle.build(defaults).map_err(policy)?);
            for step in &def.munging {
                draft = draft.munge(step.clone());
            }
            draft.meta = def.meta.clone();
            feeds.push(draft);
        }

        Ok(SymbolDefinition { symbol, feeds })
    }
}

/// Create each Symbol and add its feeds. Returns the names created.
pub fn install(
    definitions: Vec<SymbolDefinition>,
    manager: &SymbolManager,
    overwrite: bool,
) -> Result<Vec<String>, PipelineError> {
    let mut created = Vec::with_capacity(definitions.len());
    for def in definitions {
        let name = def.symbol.name.clone();
        manager.create(def.symbol, overwrite)?;
        for draft in def.feeds {
            manager.add_feed(&name, draft)?;
        }
        created.push(name);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use symcache_core::domain::MungeKind;
    use symcache_core::handling::{BitPolicy, Flag};

    const EURCAD: &str = r#"
        [[symbol]]
        name = "EURCAD"
        units = "CAD"
        data_kind = "float"
        handle = { aggregation = ["stdout", "report"] }

        [[symbol.feed]]
        source_type = "csv"
        params = { path = "a.csv" }
        munging = [
            { method = "ffill", kwargs = { limit = 3 } },
            { method = "rolling_mean", kind = "function", kwargs = { window = 2 } },
        ]

        [[symbol.feed]]
        source_type = "csv"
        sourcing_key = "prod"
        state = "off"
        handle = { empty_feed = ["raise"] }

        [[symbol.validator]]
        validator = "no_missing_final"
    "#;

    fn build(toml: &str) -> Result<Vec<SymbolDefinition>, CatalogError> {
        Catalog::from_toml(toml)?.definitions(&HandleDefaults::default(), &Registries::builtin())
    }

    #[test]
    fn parses_symbols_feeds_and_validators() {
        let defs = build(EURCAD).unwrap();
        assert_eq!(defs.len(), 1);
        let def = &defs[0];
        assert_eq!(def.symbol.data_kind, DataKind::Float);
        assert_eq!(
            def.symbol.handle.aggregation,
            BitPolicy::from_flags([Flag::Stdout, Flag::Report])
        );
        assert_eq!(def.symbol.validators[0].vid, 0);
        assert_eq!(def.feeds.len(), 2);
        let steps = &def.feeds[0].munging;
        assert_eq!(steps[1].order, 1);
        assert_eq!(steps[1].kind, MungeKind::LibraryFunction);
        assert_eq!(def.feeds[1].state, FeedState::Off);
        assert!(def.feeds[1]
            .handle
            .as_ref()
            .is_some_and(|h| h.empty_feed.escalates()));
    }

    #[test]
    fn unknown_checkpoint_is_rejected() {
        let err = Catalog::from_toml(
            "[[symbol]]\nname = \"X\"\nhandle = { agregation = [\"raise\"] }\n",
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn unknown_munge_is_rejected() {
        let toml = r#"
            [[symbol]]
            name = "X"
            [[symbol.feed]]
            source_type = "csv"
            munging = [{ method = "interpolate" }]
        "#;
        assert!(matches!(build(toml), Err(CatalogError::Factory { .. })));
    }

    #[test]
    fn unknown_flag_is_a_policy_error() {
        let toml = "[[symbol]]\nname = \"X\"\nhandle = { caching = [\"shout\"] }\n";
        assert!(matches!(build(toml), Err(CatalogError::Policy { .. })));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let toml = "[[symbol]]\nname = \"X\"\n[[symbol]]\nname = \"X\"\n";
        assert!(matches!(build(toml), Err(CatalogError::Duplicate(_))));
    }
}
