//! CLI error types and conversions

use crate::commission::CommissionError;
use crate::metrics::MetricsError;
use crate::resume::ResumeError;
use crate::sync::{ConfigError, RateLimitError, SyncError, SyncStatus};
use crate::transport::TransportError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// HTTP client could not be built
    #[error("transport error: {0}")]
    TransportError(#[from] TransportError),

    /// Invalid request rate
    #[error("rate limit error: {0}")]
    RateLimitError(#[from] RateLimitError),

    /// Discovery or backfill error
    #[error("sync error: {0}")]
    SyncError(#[from] SyncError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Commission arithmetic error
    #[error("commission error: {0}")]
    CommissionError(#[from] CommissionError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Output could not be serialized
    #[error("output error: {0}")]
    OutputError(#[from] serde_json::Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),

    /// The API refused the credentials
    #[error("credentials rejected with status {0}")]
    CredentialsRejected(u16),

    /// The API could not be reached
    #[error("settlement API unreachable: {0}")]
    Unreachable(String),

    /// A backfill ended without a single successful chunk
    #[error("backfill finished with status {0}")]
    BackfillFailed(SyncStatus),

    /// Shutdown requested before the command finished
    #[error("interrupted by shutdown")]
    Interrupted,
}
