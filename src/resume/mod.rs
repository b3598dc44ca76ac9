//! Durable backfill progress
//!
//! Provides the [`ProgressStore`] interface with file and in-memory
//! implementations, atomic state writes, and a per-seller run lock.

pub mod checkpoint;
pub mod lock;
pub mod state;
pub mod store;

pub use checkpoint::{Checkpoint, FailedChunk};
pub use lock::SyncLock;
pub use state::{ResumeError, SyncState, MAX_STATE_FILE_SIZE};
pub use store::{FileProgressStore, MemoryProgressStore, ProgressStore};
