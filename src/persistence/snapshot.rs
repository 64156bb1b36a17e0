//! The on-disk snapshot of channels and items.
//!
//! The whole record set lives in one JSON file, rewritten on every mutation
//! with the write-to-temp-then-rename pattern:
//! 1. Write to `<path>.tmp`
//! 2. fsync the file
//! 3. Rename to `<path>`
//! 4. fsync the directory
//!
//! Readers therefore see either the previous or the new snapshot, never a
//! partial write.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fsync::{fsync_dir, fsync_file};
use crate::types::{Channel, Item};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Everything the bot persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub schema_version: u32,

    /// When this snapshot was written.
    pub snapshot_at: DateTime<Utc>,

    /// The id the next created item receives.
    pub next_item_id: u64,

    pub channels: Vec<Channel>,

    /// All items, in id order.
    pub items: Vec<Item>,
}

impl PersistedSnapshot {
    pub fn new() -> Self {
        PersistedSnapshot {
            schema_version: SCHEMA_VERSION,
            snapshot_at: Utc::now(),
            next_item_id: 1,
            channels: Vec::new(),
            items: Vec::new(),
        }
    }
}

impl Default for PersistedSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes a snapshot atomically.
pub fn save_snapshot_atomic(path: &Path, snapshot: &PersistedSnapshot) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Reads a snapshot, rejecting unknown schema versions.
pub fn load_snapshot(path: &Path) -> Result<PersistedSnapshot> {
    let bytes = std::fs::read(path)?;
    let snapshot: PersistedSnapshot = serde_json::from_slice(&bytes)?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot)
}

/// Like [`load_snapshot`], but a missing file is `Ok(None)`.
pub fn try_load_snapshot(path: &Path) -> Result<Option<PersistedSnapshot>> {
    match load_snapshot(path) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(SnapshotError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
