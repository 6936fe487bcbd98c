//! Handle log: JSONL persistence of absorbed checkpoint failures.
//!
//! Receives every record whose policy carries the `dblog` flag. One JSON
//! object per line, stamped with the time it was logged.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use symcache_core::handling::{Checkpoint, HandleRecord, Notifier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedHandle {
    pub logged_at: NaiveDateTime,
    pub record: HandleRecord,
}

pub struct HandleLog {
    path: PathBuf,
    write: Mutex<()>,
}

impl HandleLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write: Mutex::new(()),
        }
    }

    pub fn append(&self, record: &HandleRecord) -> io::Result<()> {
        let entry = LoggedHandle {
            logged_at: chrono::Local::now().naive_local(),
            record: record.clone(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let _guard = self
            .write
            .lock()
            .map_err(|_| io::Error::other("handle log lock poisoned"))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()
    }

    /// Read all entries. Malformed lines are logged and skipped.
    pub fn read_all(&self) -> io::Result<Vec<LoggedHandle>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)?;
        let mut entries = Vec::new();
        for (n, line) in io::BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = n + 1,
                    "skipping malformed handle entry: {e}"
                ),
            }
        }
        Ok(entries)
    }
}

impl Notifier for HandleLog {
    fn notify(&self, checkpoint: Checkpoint, message: &str) {
        tracing::warn!(target: "symcache::notify", %checkpoint, "{message}");
    }

    fn record(&self, record: &HandleRecord) {
        if let Err(e) = self.append(record) {
            tracing::warn!(path = %self.path.display(), "handle log write failed: {e}");
        }
    }
}

impl std::fmt::Debug for HandleLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleLog").field("path", &self.path).finish()
    }
}
