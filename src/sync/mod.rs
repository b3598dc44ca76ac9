//! Discovery and backfill
//!
//! The two engines share one [`PermitScheduler`] through the transport and run
//! strictly one request at a time:
//!
//! 1. **Discovery**: [`discovery::IntervalSearch`] finds the earliest order date
//! 2. **Backfill**: [`backfill::BackfillWalker`] walks from that date to now in chunks
//!
//! The walker never calls the search; the caller sequences them and passes the
//! discovered date by value.
//!
//! # Components
//!
//! - [`config`] - tunables, defaults and the linear backoff
//! - [`rate_limit`] - the permit scheduler
//! - [`discovery`] - binary search, fallback scan and refinement
//! - [`backfill`] - chunk walker, run summary and status

pub mod backfill;
pub mod config;
pub mod discovery;
pub mod rate_limit;

pub use backfill::{BackfillSummary, BackfillWalker, ChunkOutcome, ChunkReport, ChunkStats, SyncStatus};
pub use config::{ConfigError, SyncConfig};
pub use discovery::{Discovery, DiscoverySource, IntervalSearch, SearchInterval};
pub use rate_limit::{PermitScheduler, RateLimitError};

use crate::resume::ResumeError;

/// Sync errors
///
/// Transport failures are not errors at this level: discovery treats them as
/// "no evidence" and the walker counts them as failed chunks.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Progress could not be loaded or saved
    #[error("resume error: {0}")]
    Resume(#[from] ResumeError),

    /// Invalid date range or span
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Shutdown requested
    #[error("interrupted by shutdown")]
    Interrupted,
}
