//! Registries bundle: resolves string identifiers from stored definitions
//! into runtime strategies.
//!
//! Every identifier a Symbol or Feed names (munge steps, aggregation method,
//! validators) is checked here when the definition is created, so a bad
//! name is a configuration error rather than a mid-cache surprise.

use std::sync::Arc;

use crate::aggregate::AggregatorRegistry;
use crate::domain::{ArgError, Feed, MungeKind, Symbol};
use crate::munge::MungeRegistry;
use crate::source::SourceRegistry;
use crate::validity::ValidatorRegistry;

// ─── Error type ──────────────────────────────────────────────────────

/// Errors that can occur while resolving a named strategy.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown munge {kind} '{name}'")]
    UnknownMunge { kind: MungeKind, name: String },
    #[error("Unknown aggregation method: {0}")]
    UnknownAggregator(String),
    #[error("Unknown validator: {0}")]
    UnknownValidator(String),
    #[error("Unknown source type: {0}")]
    UnknownSource(String),
    #[error("Invalid arguments for {component}: {source}")]
    BadArgs {
        component: String,
        #[source]
        source: ArgError,
    },
}

// ─── Registries ──────────────────────────────────────────────────────

/// All four registries, shared by the pipeline and the symbol manager.
#[derive(Clone)]
pub struct Registries {
    pub sources: SourceRegistry,
    pub munges: MungeRegistry,
    pub aggregators: AggregatorRegistry,
    pub validators: ValidatorRegistry,
}

impl Registries {
    /// Built-in munge steps, aggregators and validators, and no sources.
    pub fn builtin() -> Self {
        Self {
            sources: SourceRegistry::new(),
            munges: MungeRegistry::with_builtins(),
            aggregators: AggregatorRegistry::with_builtins(),
            validators: ValidatorRegistry::with_builtins(),
        }
    }

    pub fn with_sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Check a Symbol's aggregation method and validators.
    pub fn validate_symbol(&self, symbol: &Symbol) -> Result<(), FactoryError> {
        self.aggregators.get(&symbol.agg_method)?;
        for spec in &symbol.validators {
            self.validators.build(&spec.validator, &spec.args)?;
        }
        Ok(())
    }

    /// Check a Feed's munge steps. Source types are resolved at fetch time,
    /// where an unknown type is an `api_failure`.
    pub fn validate_feed(&self, feed: &Feed) -> Result<(), FactoryError> {
        self.munges.validate(&feed.munging)
    }
}

impl std::fmt::Debug for Registries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registries")
            .field("sources", &self.sources.names())
            .field("aggregators", &self.aggregators.names())
            .field("validators", &self.validators.names())
            .finish_non_exhaustive()
    }
}
