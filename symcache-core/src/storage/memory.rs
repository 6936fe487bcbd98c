//! In-memory storage. One `RwLock` over all Symbols; every write holds it
//! for the whole operation.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{next_fnum, Storage, StorageError, WriteOutcome};
use crate::domain::{Feed, FeedDraft, OrfDraft, OrfEntry, OrfKind, Symbol};
use crate::handling::HandleDefaults;
use crate::table::StoredTable;

#[derive(Debug, Clone)]
struct SymbolRecord {
    symbol: Symbol,
    feeds: BTreeMap<u32, Feed>,
    fnum_high_water: u32,
    overrides: Vec<OrfEntry>,
    failsafes: Vec<OrfEntry>,
    table: Option<StoredTable>,
}

impl SymbolRecord {
    fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            feeds: BTreeMap::new(),
            fnum_high_water: 0,
            overrides: Vec::new(),
            failsafes: Vec::new(),
            table: None,
        }
    }

    fn orfs_mut(&mut self, kind: OrfKind) -> &mut Vec<OrfEntry> {
        match kind {
            OrfKind::Override => &mut self.overrides,
            OrfKind::FailSafe => &mut self.failsafes,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    symbols: RwLock<BTreeMap<String, SymbolRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, SymbolRecord>>, StorageError> {
        self.symbols.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, SymbolRecord>>, StorageError> {
        self.symbols.write().map_err(|_| StorageError::Poisoned)
    }

    fn with_record<T>(
        &self,
        name: &str,
        f: impl FnOnce(&SymbolRecord) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let guard = self.read()?;
        let record = guard
            .get(name)
            .ok_or_else(|| StorageError::SymbolNotFound(name.to_string()))?;
        f(record)
    }

    fn with_record_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut SymbolRecord) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.write()?;
        let record = guard
            .get_mut(name)
            .ok_or_else(|| StorageError::SymbolNotFound(name.to_string()))?;
        f(record)
    }
}

impl Storage for MemoryStorage {
    fn symbol_names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn load_symbol(&self, name: &str) -> Result<Symbol, StorageError> {
        self.with_record(name, |r| Ok(r.symbol.clone()))
    }

    fn save_symbol(&self, symbol: &Symbol) -> Result<(), StorageError> {
        self.with_record_mut(&symbol.name, |r| {
            r.symbol = symbol.clone();
            Ok(())
        })
    }

    fn create_symbol(&self, symbol: &Symbol, overwrite: bool) -> Result<(), StorageError> {
        let mut guard = self.write()?;
        if guard.contains_key(&symbol.name) && !overwrite {
            return Err(StorageError::AlreadyExists(symbol.name.clone()));
        }
        guard.insert(symbol.name.clone(), SymbolRecord::new(symbol.clone()));
        Ok(())
    }

    fn delete_symbol(&self, name: &str) -> Result<(), StorageError> {
        self.write()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::SymbolNotFound(name.to_string()))
    }

    fn load_feeds(&self, symbol: &str) -> Result<Vec<Feed>, StorageError> {
        self.with_record(symbol, |r| Ok(r.feeds.values().cloned().collect()))
    }

    fn add_feed(
        &self,
        symbol: &str,
        draft: FeedDraft,
        defaults: &HandleDefaults,
    ) -> Result<Feed, StorageError> {
        self.with_record_mut(symbol, |r| {
            let fnum = next_fnum(r.feeds.keys().copied(), r.fnum_high_water);
            let feed = draft.into_feed(symbol, fnum, defaults);
            r.feeds.insert(fnum, feed.clone());
            r.fnum_high_water = fnum + 1;
            Ok(feed)
        })
    }

    fn update_feed(&self, feed: &Feed) -> Result<(), StorageError> {
        self.with_record_mut(&feed.symbol, |r| match r.feeds.get_mut(&feed.fnum) {
            Some(slot) => {
                *slot = feed.clone();
                Ok(())
            }
            None => Err(StorageError::FeedNotFound {
                symbol: feed.symbol.clone(),
                fnum: feed.fnum,
            }),
        })
    }

    fn delete_feed(&self, symbol: &str, fnum: u32) -> Result<(), StorageError> {
        self.with_record_mut(symbol, |r| {
            r.feeds
                .remove(&fnum)
                .map(|_| ())
                .ok_or_else(|| StorageError::FeedNotFound {
                    symbol: symbol.to_string(),
                    fnum,
                })
        })
    }

    fn load_orfs(&self, symbol: &str, kind: OrfKind) -> Result<Vec<OrfEntry>, StorageError> {
        self.with_record(symbol, |r| {
            Ok(match kind {
                OrfKind::Override => r.overrides.clone(),
                OrfKind::FailSafe => r.failsafes.clone(),
            })
        })
    }

    fn append_orf(
        &self,
        symbol: &str,
        kind: OrfKind,
        draft: OrfDraft,
    ) -> Result<OrfEntry, StorageError> {
        self.with_record_mut(symbol, |r| {
            let log = r.orfs_mut(kind);
            let seq = log.iter().map(|e| e.seq + 1).max().unwrap_or(0);
            let entry = draft.into_entry(symbol, kind, seq);
            log.push(entry.clone());
            Ok(entry)
        })
    }

    fn write_final_table(
        &self,
        symbol: &str,
        table: &StoredTable,
    ) -> Result<WriteOutcome, StorageError> {
        self.with_record_mut(symbol, |r| {
            let schema_changed = r
                .table
                .as_ref()
                .is_some_and(|old| old.schema != table.schema);
            r.table = Some(table.clone());
            Ok(WriteOutcome {
                schema_changed,
                rows: table.rows.len(),
            })
        })
    }

    fn read_final_table(&self, symbol: &str) -> Result<Option<StoredTable>, StorageError> {
        self.with_record(symbol, |r| Ok(r.table.clone()))
    }
}
