//! Sync state persistence
//!
//! Atomic file writes (temp file, fsync, rename) with a schema version and an
//! advisory lock file coordinating readers and writers.

use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

use super::checkpoint::{Checkpoint, FailedChunk};
use crate::DateWindow;

/// Schema version written into every state file
const SCHEMA_VERSION: &str = "1.0.0";

/// Largest state file `load` will read (10 MB)
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Durable progress of one seller's backfill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    schema_version: String,
    seller_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    checkpoint: Option<Checkpoint>,
    #[serde(default)]
    failed_chunks: Vec<FailedChunk>,
    created_at: i64,
    updated_at: i64,
}

impl SyncState {
    /// Create an empty state for `seller_id`
    pub fn new(seller_id: impl Into<String>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            seller_id: seller_id.into(),
            checkpoint: None,
            failed_chunks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Seller the state belongs to
    pub fn seller_id(&self) -> &str {
        &self.seller_id
    }

    /// Exclusive end of the backfilled range, if any
    pub fn checkpoint(&self) -> Option<DateTime<Utc>> {
        self.checkpoint.as_ref().map(Checkpoint::cursor)
    }

    /// Move the checkpoint to `cursor`
    pub fn set_checkpoint(&mut self, cursor: DateTime<Utc>) {
        self.checkpoint = Some(Checkpoint::at(cursor));
        self.touch();
    }

    /// Outstanding failed chunks
    pub fn failed_chunks(&self) -> &[FailedChunk] {
        &self.failed_chunks
    }

    /// How often `window` has failed
    pub fn failed_attempts(&self, window: &DateWindow) -> u32 {
        self.failed_chunks
            .iter()
            .find(|f| f.window() == window)
            .map(FailedChunk::attempts)
            .unwrap_or(0)
    }

    /// Count a failure of `window`; returns its failure count
    pub fn record_failure(&mut self, window: &DateWindow, error: &str) -> u32 {
        let attempts = match self.failed_chunks.iter_mut().find(|f| f.window() == window) {
            Some(existing) => {
                existing.record(error);
                existing.attempts()
            }
            None => {
                self.failed_chunks.push(FailedChunk::new(*window, error));
                1
            }
        };
        self.touch();
        attempts
    }

    /// Forget `window`'s failures; returns whether it had any
    pub fn clear_failure(&mut self, window: &DateWindow) -> bool {
        let before = self.failed_chunks.len();
        self.failed_chunks.retain(|f| f.window() != window);
        let removed = self.failed_chunks.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Forget every recorded failure
    pub fn clear_failures(&mut self) {
        self.failed_chunks.clear();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp_millis();
    }

    /// Write the state to `path` atomically: temp file, fsync, rename, then
    /// fsync the directory. Holds the write side of the sidecar lock meanwhile.
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_error("create state directory"))?;

        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let mut lock = RwLock::new(open_sidecar_lock(path)?);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("write lock on {}: {e}", path.display())))?;

        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(io_error("create temp file"))?;
        staged.write_all(&json).map_err(io_error("write temp file"))?;
        staged.as_file().sync_all().map_err(io_error("sync temp file"))?;
        staged
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("rename into {}: {}", path.display(), e.error)))?;

        // without this the rename can be lost on power failure
        if let Ok(handle) = std::fs::File::open(dir) {
            let _ = handle.sync_all();
        }

        debug!(
            path = %path.display(),
            checkpoint = ?self.checkpoint(),
            failed_chunks = self.failed_chunks.len(),
            "Sync state saved"
        );
        Ok(())
    }

    /// Read the state at `path` under the read side of the sidecar lock.
    ///
    /// Rejects files over [`MAX_STATE_FILE_SIZE`] and other schema versions.
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        let lock = RwLock::new(open_sidecar_lock(path)?);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("read lock on {}: {e}", path.display())))?;

        let size = std::fs::metadata(path)
            .map_err(io_error("stat state file"))?
            .len();
        if size > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size,
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let bytes = std::fs::read(path).map_err(io_error("read state file"))?;
        let state: SyncState = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Unreadable sync state");
            ResumeError::DeserializationError(e.to_string())
        })?;

        if state.schema_version != SCHEMA_VERSION {
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: state.schema_version,
            });
        }

        info!(
            seller_id = %state.seller_id,
            checkpoint = ?state.checkpoint(),
            failed_chunks = state.failed_chunks.len(),
            "Loaded sync state"
        );
        Ok(state)
    }
}

/// `{path}.lock`, created on first use and never truncated
fn open_sidecar_lock(path: &Path) -> Result<File, ResumeError> {
    let lock_path = path.with_extension("lock");
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| ResumeError::LockError(format!("open {}: {e}", lock_path.display())))
}

fn io_error(action: &'static str) -> impl Fn(std::io::Error) -> ResumeError {
    move |e| ResumeError::IoError(format!("{action}: {e}"))
}

/// Failures reading or writing durable progress
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// File written by an incompatible version
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Version this build writes
        expected: String,
        /// Version in the file
        found: String,
    },

    /// State file belongs to another seller
    #[error("state file belongs to seller {found}, expected {expected}")]
    SellerMismatch {
        /// Seller requested
        expected: String,
        /// Seller recorded in the file
        found: String,
    },

    /// File larger than [`MAX_STATE_FILE_SIZE`]
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Size on disk
        size: u64,
        /// Limit
        max: u64,
    },

    /// Filesystem failure
    #[error("IO error: {0}")]
    IoError(String),

    /// State could not be encoded
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// File is not valid state JSON
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock file could not be opened or locked
    #[error("lock error: {0}")]
    LockError(String),
}
