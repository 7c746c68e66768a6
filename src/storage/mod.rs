//! # Storage Module - Persisted Alert Record
//!
//! The node keeps exactly one value across power cycles: the network time of the last
//! alert it sent. It is read once at wake-up and rewritten at most once per cycle.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trapwatch::storage::{FileRecordStore, PersistedRecord, RecordStore};
//! use trapwatch::cellular::CalendarTimestamp;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut store = FileRecordStore::new("data/last_alert.json");
//!     if let Some(record) = store.load()? {
//!         println!("last alert at {}", record.last_alert);
//!     }
//!     store.store(&PersistedRecord::new(CalendarTimestamp(1_705_326_302)))?;
//!     Ok(())
//! }
//! ```
//!
//! ## File format
//!
//! ```json
//! { "last_alert": 1705326302 }
//! ```
//!
//! Writes go to a temp file in the same directory and are renamed over the destination
//! under an exclusive `fs2` lock held on a sibling `.<name>.lock` file, so a power cut
//! mid-write leaves the previous record intact.

use anyhow::{anyhow, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cellular::CalendarTimestamp;

/// The single persisted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub last_alert: CalendarTimestamp,
}

impl PersistedRecord {
    pub fn new(last_alert: CalendarTimestamp) -> Self {
        Self { last_alert }
    }
}

/// Get/put access to the persisted record.
pub trait RecordStore {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<PersistedRecord>>;
    fn store(&mut self, record: &PersistedRecord) -> Result<()>;
}

/// JSON file on local storage.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for FileRecordStore {
    fn load(&self) -> Result<Option<PersistedRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow!("Failed to read {}: {}", self.path.display(), e)),
        };
        // Guard against leading NULs left by a torn write on some flash filesystems
        let cleaned = content.trim_start_matches('\0').trim();
        if cleaned.is_empty() {
            return Ok(None);
        }
        let record: PersistedRecord = serde_json::from_str(cleaned)
            .map_err(|e| anyhow!("Failed to parse {}: {}", self.path.display(), e))?;
        Ok(Some(record))
    }

    fn store(&mut self, record: &PersistedRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        write_atomic(&self.path, &content)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("record.json");

    // The rename replaces the record's inode, so writers serialize on a sibling that is
    // never renamed. fs2 locks are synchronous.
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path(path))?;
    lock_file.lock_exclusive()?;
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                tmp.write_all(content.as_bytes())?;
                tmp.flush()?;
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
                continue;
            }
            Err(e) => return Err(anyhow!("Failed to create temp file for atomic write: {}", e)),
        }
    };

    fs::rename(&tmp_path, path)?;
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    let _ = lock_file.unlock();
    Ok(())
}

/// `.{name}.lock` next to the record file.
fn lock_path(path: &Path) -> PathBuf {
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("record.json");
    path.with_file_name(format!(".{}.lock", base))
}

/// Volatile store for tests and runs without a writable filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    record: Option<PersistedRecord>,
    writes: usize,
}

impl MemoryRecordStore {
    pub fn new(record: Option<PersistedRecord>) -> Self {
        Self { record, writes: 0 }
    }

    /// Number of `store` calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn current(&self) -> Option<PersistedRecord> {
        self.record
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self) -> Result<Option<PersistedRecord>> {
        Ok(self.record)
    }

    fn store(&mut self, record: &PersistedRecord) -> Result<()> {
        self.record = Some(*record);
        self.writes += 1;
        Ok(())
    }
}
