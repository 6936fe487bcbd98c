//! symcache runner: persistence and orchestration around `symcache-core`.
//!
//! This crate provides:
//! - `FileStore`, a directory-per-Symbol storage backend
//! - `CsvSource`, a source adapter for delimited files
//! - `HandleLog`, the JSONL sink for `dblog` handle records
//! - TOML catalogs declaring Symbols and their feeds
//! - `BatchCache`, caching many Symbols on the rayon pool

pub mod batch;
pub mod catalog;
pub mod csv_source;
pub mod file_store;
pub mod handle_log;

use std::sync::Arc;

use symcache_core::source::SourceRegistry;
use symcache_core::Registries;

pub use batch::{BatchCache, SymbolOutcome};
pub use catalog::{install, Catalog, CatalogError, SymbolDefinition};
pub use csv_source::CsvSource;
pub use file_store::FileStore;
pub use handle_log::{HandleLog, LoggedHandle};

/// Builtin registries plus the `csv` source.
pub fn registries_with_csv() -> Registries {
    Registries::builtin().with_sources(SourceRegistry::new().with(Arc::new(CsvSource::new())))
}
