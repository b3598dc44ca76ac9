//! One backfill per seller at a time
//!
//! Advisory exclusive lock on `{state_dir}/{seller_id}.sync.lock` using fd-lock.
//! The state file's own `.lock` sibling only guards single reads and writes;
//! this lock spans a whole run.

use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::state::ResumeError;

/// Per-seller run lock. Hold the guard from [`SyncLock::try_hold`] for the whole run.
pub struct SyncLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl SyncLock {
    /// Open (creating if needed) the lock file for `seller_id`.
    pub fn open(state_dir: &Path, seller_id: &str) -> Result<Self, ResumeError> {
        std::fs::create_dir_all(state_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let path = state_dir.join(format!("{seller_id}.sync.lock"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// Lock file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without blocking; fails if another run holds it.
    pub fn try_hold(&mut self) -> Result<RwLockWriteGuard<'_, File>, ResumeError> {
        let path = self.path.display().to_string();
        self.lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "another sync holds {path}: {e}"
            ))
        })
    }
}
