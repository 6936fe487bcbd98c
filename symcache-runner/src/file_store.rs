//! File-backed storage.
//!
//! Layout: `{root}/symbol={NAME}/`
//! - `symbol.json`: the Symbol definition
//! - `feeds.json`: feeds plus the fnum high-water mark
//! - `overrides.jsonl`, `failsafes.jsonl`: append-only datapoint logs
//! - `table.json`: the final table, replaced wholesale
//!
//! JSON files are written atomically (write to .tmp, rename into place), so
//! readers see either the previous table or the new one. Writes to one
//! Symbol are serialized by a per-symbol lock; different Symbols proceed in
//! parallel.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use symcache_core::domain::{Feed, FeedDraft, OrfDraft, OrfEntry, OrfKind, Symbol};
use symcache_core::handling::HandleDefaults;
use symcache_core::storage::{next_fnum, Storage, StorageError, WriteOutcome};
use symcache_core::table::StoredTable;

const SYMBOL_FILE: &str = "symbol.json";
const FEEDS_FILE: &str = "feeds.json";
const TABLE_FILE: &str = "table.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeedsFile {
    fnum_high_water: u32,
    feeds: Vec<Feed>,
}

/// Reject names that are not a single, plain path component.
fn check_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name.contains(['/', '\\', '\0'])
        || name.contains("..")
        || name == ".";
    if bad {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn io_err(path: &Path, e: impl std::fmt::Display) -> StorageError {
    StorageError::Io(format!("{}: {e}", path.display()))
}

fn ser_err(path: &Path, e: impl std::fmt::Display) -> StorageError {
    StorageError::Serialize(format!("{}: {e}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ser_err(path, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Write JSON to `path` via a sibling .tmp file and a rename.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| ser_err(path, e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        io_err(path, e)
    })
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(path, e)),
    };
    let mut out = Vec::new();
    for (n, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| io_err(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry =
            serde_json::from_str(&line).map_err(|e| ser_err(path, format!("line {}: {e}", n + 1)))?;
        out.push(entry);
    }
    Ok(out)
}

fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|e| ser_err(path, e))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    writeln!(file, "{json}").map_err(|e| io_err(path, e))?;
    file.flush().map_err(|e| io_err(path, e))
}

pub struct FileStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a Symbol. The name must be a single path component.
    fn symbol_dir(&self, name: &str) -> Result<PathBuf, StorageError> {
        check_name(name)?;
        Ok(self.root.join(format!("symbol={name}")))
    }

    fn orf_path(&self, name: &str, kind: OrfKind) -> Result<PathBuf, StorageError> {
        let file = match kind {
            OrfKind::Override => "overrides.jsonl",
            OrfKind::FailSafe => "failsafes.jsonl",
        };
        Ok(self.symbol_dir(name)?.join(file))
    }

    fn lock_for(&self, name: &str) -> Result<Arc<Mutex<()>>, StorageError> {
        let mut locks = self.locks.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(locks.entry(name.to_string()).or_default().clone())
    }

    /// Run `f` holding the Symbol's write lock. The Symbol must exist.
    fn locked<T>(
        &self,
        name: &str,
        f: impl FnOnce(&Path) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let lock = self.lock_for(name)?;
        let _guard = lock.lock().map_err(|_| StorageError::Poisoned)?;
        let dir = self.symbol_dir(name)?;
        if !dir.join(SYMBOL_FILE).exists() {
            return Err(StorageError::SymbolNotFound(name.to_string()));
        }
        f(&dir)
    }

    fn read_feeds_file(&self, dir: &Path) -> Result<FeedsFile, StorageError> {
        Ok(read_json(&dir.join(FEEDS_FILE))?.unwrap_or_default())
    }
}

impl Storage for FileStore {
    fn symbol_names(&self) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.root).map_err(|e| io_err(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.root, e))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|n| n.strip_prefix("symbol=")) else {
                continue;
            };
            if entry.path().join(SYMBOL_FILE).exists() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn load_symbol(&self, name: &str) -> Result<Symbol, StorageError> {
        read_json(&self.symbol_dir(name)?.join(SYMBOL_FILE))?
            .ok_or_else(|| StorageError::SymbolNotFound(name.to_string()))
    }

    fn save_symbol(&self, symbol: &Symbol) -> Result<(), StorageError> {
        self.locked(&symbol.name, |dir| {
            write_json_atomic(&dir.join(SYMBOL_FILE), symbol)
        })
    }

    fn create_symbol(&self, symbol: &Symbol, overwrite: bool) -> Result<(), StorageError> {
        let lock = self.lock_for(&symbol.name)?;
        let _guard = lock.lock().map_err(|_| StorageError::Poisoned)?;
        let dir = self.symbol_dir(&symbol.name)?;
        if dir.exists() {
            if !overwrite {
                return Err(StorageError::AlreadyExists(symbol.name.clone()));
            }
            fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        write_json_atomic(&dir.join(FEEDS_FILE), &FeedsFile::default())?;
        write_json_atomic(&dir.join(SYMBOL_FILE), symbol)
    }

    fn delete_symbol(&self, name: &str) -> Result<(), StorageError> {
        self.locked(name, |dir| {
            fs::remove_dir_all(dir).map_err(|e| io_err(dir, e))
        })
    }

    fn load_feeds(&self, symbol: &str) -> Result<Vec<Feed>, StorageError> {
        let dir = self.symbol_dir(symbol)?;
        if !dir.join(SYMBOL_FILE).exists() {
            return Err(StorageError::SymbolNotFound(symbol.to_string()));
        }
        let mut feeds = self.read_feeds_file(&dir)?.feeds;
        feeds.sort_by_key(|f| f.fnum);
        Ok(feeds)
    }

    fn add_feed(
        &self,
        symbol: &str,
        draft: FeedDraft,
        defaults: &HandleDefaults,
    ) -> Result<Feed, StorageError> {
        self.locked(symbol, |dir| {
            let mut file = self.read_feeds_file(dir)?;
            let fnum = next_fnum(file.feeds.iter().map(|f| f.fnum), file.fnum_high_water);
            let feed = draft.into_feed(symbol, fnum, defaults);
            file.feeds.push(feed.clone());
            file.fnum_high_water = fnum + 1;
            write_json_atomic(&dir.join(FEEDS_FILE), &file)?;
            Ok(feed)
        })
    }

    fn update_feed(&self, feed: &Feed) -> Result<(), StorageError> {
        self.locked(&feed.symbol, |dir| {
            let mut file = self.read_feeds_file(dir)?;
            let slot = file
                .feeds
                .iter_mut()
                .find(|f| f.fnum == feed.fnum)
                .ok_or_else(|| StorageError::FeedNotFound {
                    symbol: feed.symbol.clone(),
                    fnum: feed.fnum,
                })?;
            *slot = feed.clone();
            write_json_atomic(&dir.join(FEEDS_FILE), &file)
        })
    }

    fn delete_feed(&self, symbol: &str, fnum: u32) -> Result<(), StorageError> {
        self.locked(symbol, |dir| {
            let mut file = self.read_feeds_file(dir)?;
            let before = file.feeds.len();
            file.feeds.retain(|f| f.fnum != fnum);
            if file.feeds.len() == before {
                return Err(StorageError::FeedNotFound {
                    symbol: symbol.to_string(),
                    fnum,
                });
            }
            write_json_atomic(&dir.join(FEEDS_FILE), &file)
        })
    }

    fn load_orfs(&self, symbol: &str, kind: OrfKind) -> Result<Vec<OrfEntry>, StorageError> {
        if !self.symbol_dir(symbol)?.join(SYMBOL_FILE).exists() {
            return Err(StorageError::SymbolNotFound(symbol.to_string()));
        }
        read_jsonl(&self.orf_path(symbol, kind)?)
    }

    fn append_orf(
        &self,
        symbol: &str,
        kind: OrfKind,
        draft: OrfDraft,
    ) -> Result<OrfEntry, StorageError> {
        self.locked(symbol, |_| {
            let path = self.orf_path(symbol, kind)?;
            let existing: Vec<OrfEntry> = read_jsonl(&path)?;
            let seq = existing.iter().map(|e| e.seq + 1).max().unwrap_or(0);
            let entry = draft.into_entry(symbol, kind, seq);
            append_jsonl(&path, &entry)?;
            Ok(entry)
        })
    }

    fn write_final_table(
        &self,
        symbol: &str,
        table: &StoredTable,
    ) -> Result<WriteOutcome, StorageError> {
        self.locked(symbol, |dir| {
            let path = dir.join(TABLE_FILE);
            let old: Option<StoredTable> = read_json(&path)?;
            let schema_changed = old.is_some_and(|old| old.schema != table.schema);
            // rename replaces the old table whole, whatever its schema
            write_json_atomic(&path, table)?;
            if schema_changed {
                tracing::debug!(symbol, "replaced table with stale schema");
            }
            Ok(WriteOutcome {
                schema_changed,
                rows: table.rows.len(),
            })
        })
    }

    fn read_final_table(&self, symbol: &str) -> Result<Option<StoredTable>, StorageError> {
        let dir = self.symbol_dir(symbol)?;
        if !dir.join(SYMBOL_FILE).exists() {
            return Err(StorageError::SymbolNotFound(symbol.to_string()));
        }
        read_json(&dir.join(TABLE_FILE))
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symcache_core::domain::{DataKind, IndexKind, IndexValue, SourceSpec};
    use symcache_core::table::{AlignedTable, Column, ColumnRole};

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn atomic_write_leaves_no_tmp() {
        let (dir, _) = store();
        let path = dir.path().join("x.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("x.json.tmp").exists());
        let back: Option<Vec<i32>> = read_json(&path).unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }

    #[test]
    fn missing_jsonl_is_empty() {
        let (dir, _) = store();
        let got: Vec<OrfEntry> = read_jsonl(&dir.path().join("none.jsonl")).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn fnum_high_water_survives_reopen() {
        let (dir, s) = store();
        let d = HandleDefaults::default();
        s.create_symbol(&Symbol::new("X", &d), false).unwrap();
        let draft = || FeedDraft::new(SourceSpec::new("csv"));
        s.add_feed("X", draft(), &d).unwrap();
        s.add_feed("X", draft(), &d).unwrap();
        s.delete_feed("X", 1).unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.add_feed("X", draft(), &d).unwrap().fnum, 2);
    }

    fn table(feeds: u32) -> StoredTable {
        let mut t = AlignedTable::new(IndexKind::Integer, vec![IndexValue::Integer(1)]);
        for fnum in 0..feeds {
            t.columns.push(Column {
                role: ColumnRole::Feed(fnum),
                values: vec![Some(1.0)],
            });
        }
        t.to_storage(DataKind::Float)
    }

    #[test]
    fn names_that_leave_the_root_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("victim");
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("keep.txt"), "x").unwrap();
        let s = FileStore::open(dir.path().join("store")).unwrap();
        let d = HandleDefaults::default();

        for name in ["x/../../victim", "..", "a\\b", ""] {
            for overwrite in [false, true] {
                assert!(matches!(
                    s.create_symbol(&Symbol::new(name, &d), overwrite),
                    Err(StorageError::InvalidName(_))
                ));
            }
            assert!(matches!(s.load_symbol(name), Err(StorageError::InvalidName(_))));
        }
        assert!(victim.join("keep.txt").exists());
        assert!(!victim.join(SYMBOL_FILE).exists());
    }

    #[test]
    fn failed_schema_change_keeps_previous_table() {
        let (_dir, s) = store();
        let d = HandleDefaults::default();
        s.create_symbol(&Symbol::new("X", &d), false).unwrap();
        let first = table(1);
        s.write_final_table("X", &first).unwrap();

        // a directory squatting on the tmp path makes the next write fail
        let tmp = s.symbol_dir("X").unwrap().join("table.json.tmp");
        fs::create_dir_all(&tmp).unwrap();
        assert!(s.write_final_table("X", &table(2)).is_err());
        assert_eq!(s.read_final_table("X").unwrap(), Some(first));

        fs::remove_dir_all(&tmp).unwrap();
        let outcome = s.write_final_table("X", &table(2)).unwrap();
        assert!(outcome.schema_changed);
        assert_eq!(s.read_final_table("X").unwrap(), Some(table(2)));
    }

    #[test]
    fn writes_to_unknown_symbol_fail() {
        let (_dir, s) = store();
        assert!(matches!(
            s.append_override("nope", OrfDraft::new(1i64, 1.0)),
            Err(StorageError::SymbolNotFound(_))
        ));
    }
}
