//! Storage collaborator: repository-style loads returning owned data.
//!
//! The pipeline loads a `SymbolSnapshot` once per cache call and never
//! re-fetches mid-computation. Implementations must serialize writes per
//! Symbol: the final table is replaced wholesale, and manual datapoint
//! sequence numbers are assigned atomically per (symbol, kind).

pub mod memory;

pub use memory::MemoryStorage;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Feed, FeedDraft, OrfDraft, OrfEntry, OrfKind, Symbol};
use crate::handling::HandleDefaults;
use crate::table::StoredTable;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("symbol '{0}' not found")]
    SymbolNotFound(String),

    #[error("symbol '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid symbol name '{0}'")]
    InvalidName(String),

    #[error("symbol '{symbol}' has no feed {fnum}")]
    FeedNotFound { symbol: String, fnum: u32 },

    #[error("symbol '{0}' has not been cached")]
    NoTable(String),

    #[error("storage I/O: {0}")]
    Io(String),

    #[error("storage serialization: {0}")]
    Serialize(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// What a final-table write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// The stored schema differed and the table was dropped and recreated.
    pub schema_changed: bool,
    pub rows: usize,
}

pub trait Storage: Send + Sync {
    fn symbol_names(&self) -> Result<Vec<String>, StorageError>;

    fn load_symbol(&self, name: &str) -> Result<Symbol, StorageError>;

    /// Update an existing Symbol's definition.
    fn save_symbol(&self, symbol: &Symbol) -> Result<(), StorageError>;

    /// Create a Symbol. With `overwrite`, an existing Symbol of the same
    /// name is deleted first along with its feeds, datapoints and table.
    fn create_symbol(&self, symbol: &Symbol, overwrite: bool) -> Result<(), StorageError>;

    fn delete_symbol(&self, name: &str) -> Result<(), StorageError>;

    /// Feeds sorted by fnum.
    fn load_feeds(&self, symbol: &str) -> Result<Vec<Feed>, StorageError>;

    /// Add a feed, assigning the next fnum. Fnums are never reused.
    fn add_feed(
        &self,
        symbol: &str,
        draft: FeedDraft,
        defaults: &HandleDefaults,
    ) -> Result<Feed, StorageError>;

    fn update_feed(&self, feed: &Feed) -> Result<(), StorageError>;

    fn delete_feed(&self, symbol: &str, fnum: u32) -> Result<(), StorageError>;

    /// Entries in append order.
    fn load_orfs(&self, symbol: &str, kind: OrfKind) -> Result<Vec<OrfEntry>, StorageError>;

    /// Append, assigning the next sequence number for (symbol, kind).
    fn append_orf(
        &self,
        symbol: &str,
        kind: OrfKind,
        draft: OrfDraft,
    ) -> Result<OrfEntry, StorageError>;

    /// Replace the Symbol's final table in one step.
    fn write_final_table(
        &self,
        symbol: &str,
        table: &StoredTable,
    ) -> Result<WriteOutcome, StorageError>;

    fn read_final_table(&self, symbol: &str) -> Result<Option<StoredTable>, StorageError>;

    fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.symbol_names()?.iter().any(|n| n == name))
    }

    fn load_overrides(&self, symbol: &str) -> Result<Vec<OrfEntry>, StorageError> {
        self.load_orfs(symbol, OrfKind::Override)
    }

    fn load_failsafes(&self, symbol: &str) -> Result<Vec<OrfEntry>, StorageError> {
        self.load_orfs(symbol, OrfKind::FailSafe)
    }

    fn append_override(&self, symbol: &str, draft: OrfDraft) -> Result<OrfEntry, StorageError> {
        self.append_orf(symbol, OrfKind::Override, draft)
    }

    fn append_failsafe(&self, symbol: &str, draft: OrfDraft) -> Result<OrfEntry, StorageError> {
        self.append_orf(symbol, OrfKind::FailSafe, draft)
    }
}

/// Next fnum: past both the largest live fnum and the recorded high-water
/// mark.
pub fn next_fnum(feeds: impl IntoIterator<Item = u32>, high_water: u32) -> u32 {
    feeds
        .into_iter()
        .map(|f| f + 1)
        .max()
        .unwrap_or(0)
        .max(high_water)
}

/// Everything one cache call needs, loaded up front.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSnapshot {
    pub symbol: Symbol,
    pub feeds: Vec<Feed>,
    pub overrides: Vec<OrfEntry>,
    pub failsafes: Vec<OrfEntry>,
}

impl SymbolSnapshot {
    pub fn load(storage: &dyn Storage, name: &str) -> Result<Self, StorageError> {
        Ok(Self {
            symbol: storage.load_symbol(name)?,
            feeds: storage.load_feeds(name)?,
            overrides: storage.load_overrides(name)?,
            failsafes: storage.load_failsafes(name)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_fnum_never_goes_backwards() {
        assert_eq!(next_fnum([], 0), 0);
        assert_eq!(next_fnum([0, 1, 2], 3), 3);
        // fnum 2 deleted after reaching 3
        assert_eq!(next_fnum([0, 1], 3), 3);
        assert_eq!(next_fnum([0, 5], 2), 6);
    }
}
