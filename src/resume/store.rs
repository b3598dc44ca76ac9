//! Progress store interface used by the backfill walker

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

use super::checkpoint::FailedChunk;
use super::state::{ResumeError, SyncState};
use crate::DateWindow;

/// Where the walker keeps its checkpoint and failed-chunk registry.
pub trait ProgressStore: Send + Sync {
    /// Exclusive end of the already backfilled range
    fn load_progress(&self) -> Result<Option<DateTime<Utc>>, ResumeError>;

    /// Durably record that everything before `cursor` is done
    fn save_progress(&self, cursor: DateTime<Utc>) -> Result<(), ResumeError>;

    /// How often `window` has failed
    fn failed_attempts(&self, window: &DateWindow) -> u32;

    /// Count a failure of `window`; returns its failure count
    fn record_failure(&self, window: &DateWindow, reason: &str) -> Result<u32, ResumeError>;

    /// Forget `window`'s failures after it succeeded
    fn clear_failure(&self, window: &DateWindow) -> Result<(), ResumeError>;

    /// Forget every failure
    fn clear_failures(&self) -> Result<(), ResumeError>;

    /// Outstanding failed chunks
    fn failed_chunks(&self) -> Vec<FailedChunk>;
}

fn locked(state: &Mutex<SyncState>) -> MutexGuard<'_, SyncState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process store; progress is lost when the process exits.
#[derive(Debug)]
pub struct MemoryProgressStore {
    state: Mutex<SyncState>,
}

impl MemoryProgressStore {
    /// Create an empty store
    pub fn new(seller_id: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(SyncState::new(seller_id)),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SyncState {
        locked(&self.state).clone()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load_progress(&self) -> Result<Option<DateTime<Utc>>, ResumeError> {
        Ok(locked(&self.state).checkpoint())
    }

    fn save_progress(&self, cursor: DateTime<Utc>) -> Result<(), ResumeError> {
        locked(&self.state).set_checkpoint(cursor);
        Ok(())
    }

    fn failed_attempts(&self, window: &DateWindow) -> u32 {
        locked(&self.state).failed_attempts(window)
    }

    fn record_failure(&self, window: &DateWindow, reason: &str) -> Result<u32, ResumeError> {
        Ok(locked(&self.state).record_failure(window, reason))
    }

    fn clear_failure(&self, window: &DateWindow) -> Result<(), ResumeError> {
        locked(&self.state).clear_failure(window);
        Ok(())
    }

    fn clear_failures(&self) -> Result<(), ResumeError> {
        locked(&self.state).clear_failures();
        Ok(())
    }

    fn failed_chunks(&self) -> Vec<FailedChunk> {
        locked(&self.state).failed_chunks().to_vec()
    }
}

/// JSON file store, one file per seller, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileProgressStore {
    path: PathBuf,
    state: Mutex<SyncState>,
}

impl FileProgressStore {
    /// Open `{state_dir}/{seller_id}.json`, starting empty if it does not exist.
    pub fn open(state_dir: &Path, seller_id: &str) -> Result<Self, ResumeError> {
        let path = Self::state_path(state_dir, seller_id);
        let state = if path.exists() {
            let state = SyncState::load(&path)?;
            if state.seller_id() != seller_id {
                return Err(ResumeError::SellerMismatch {
                    expected: seller_id.to_string(),
                    found: state.seller_id().to_string(),
                });
            }
            state
        } else {
            info!(path = %path.display(), "No sync state found, starting fresh");
            SyncState::new(seller_id)
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// State file location for `seller_id`
    pub fn state_path(state_dir: &Path, seller_id: &str) -> PathBuf {
        state_dir.join(format!("{seller_id}.json"))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SyncState {
        locked(&self.state).clone()
    }

    /// Apply `change` and persist; memory only moves forward if the write succeeded.
    fn update<T>(&self, change: impl FnOnce(&mut SyncState) -> T) -> Result<T, ResumeError> {
        let mut current = locked(&self.state);
        let mut next = current.clone();
        let value = change(&mut next);
        next.save(&self.path)?;
        *current = next;
        Ok(value)
    }
}

impl ProgressStore for FileProgressStore {
    fn load_progress(&self) -> Result<Option<DateTime<Utc>>, ResumeError> {
        Ok(locked(&self.state).checkpoint())
    }

    fn save_progress(&self, cursor: DateTime<Utc>) -> Result<(), ResumeError> {
        self.update(|state| state.set_checkpoint(cursor))
    }

    fn failed_attempts(&self, window: &DateWindow) -> u32 {
        locked(&self.state).failed_attempts(window)
    }

    fn record_failure(&self, window: &DateWindow, reason: &str) -> Result<u32, ResumeError> {
        self.update(|state| state.record_failure(window, reason))
    }

    fn clear_failure(&self, window: &DateWindow) -> Result<(), ResumeError> {
        if self.failed_attempts(window) == 0 {
            return Ok(());
        }
        self.update(|state| {
            state.clear_failure(window);
        })
    }

    fn clear_failures(&self) -> Result<(), ResumeError> {
        self.update(SyncState::clear_failures)
    }

    fn failed_chunks(&self) -> Vec<FailedChunk> {
        locked(&self.state).failed_chunks().to_vec()
    }
}
