//! symcache core: the feed/symbol caching pipeline.
//!
//! A Symbol is one canonical time series assembled from several raw feeds.
//! Caching a Symbol runs:
//! - sourcing through a registry of source adapters
//! - shape checks and an ordered munge pipeline per feed
//! - an outer join with override/failsafe columns layered by precedence
//! - a pluggable aggregator producing the `final` column
//! - a single table write, then optional validators
//!
//! Every stage failure passes through the `CheckpointHandler`, using the
//! owning Symbol's or Feed's `BitPolicy` for that checkpoint.

pub mod aggregate;
pub mod domain;
pub mod error;
pub mod factory;
pub mod handling;
pub mod manager;
pub mod munge;
pub mod pipeline;
pub mod report;
pub mod settings;
pub mod source;
pub mod storage;
pub mod table;
pub mod validity;

pub use error::PipelineError;
pub use factory::{FactoryError, Registries};
pub use manager::SymbolManager;
pub use pipeline::{CacheState, Pipeline};
pub use report::{BatchReport, FeedReport, ReportPoint, SymbolFailure, SymbolReport};
pub use settings::{ConfigError, Settings};
pub use storage::{MemoryStorage, Storage, StorageError};
