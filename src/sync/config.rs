//! Sync tunables and their defaults

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::time::Duration;

/// Requests per second allowed by the settlement API.
pub const REQUESTS_PER_SECOND: f64 = 10.0;

/// Slowest accepted request rate: one request every 1000 seconds.
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Maximum number of retries for one logical call (4 attempts in total).
pub const MAX_RETRIES: u32 = 3;

/// Unit of the linear backoff: the n-th retry waits `n * BACKOFF_UNIT_MS`.
pub const BACKOFF_UNIT_MS: u64 = 1000;

/// Widest `[startDate, endDate)` window the settlement API accepts.
pub const API_MAX_WINDOW_DAYS: i64 = 15;

/// Span of a discovery probe; one day under the API ceiling.
pub const PROBE_SPAN_DAYS: i64 = 14;

/// Binary search stops once the search interval is narrower than this.
pub const MIN_SEARCH_INTERVAL_DAYS: i64 = 15;

/// Page size of a discovery probe.
pub const PROBE_PAGE_SIZE: u32 = 500;

/// Page size of full pagination (API maximum).
pub const PAGE_SIZE: u32 = 1000;

/// Backfill chunk span.
pub const CHUNK_SPAN_DAYS: i64 = 14;

/// How far before the binary-search result the refinement pass looks.
pub const REFINE_LOOKBACK_DAYS: i64 = 35;

/// How far after the binary-search result the refinement pass looks.
pub const REFINE_LOOKAHEAD_DAYS: i64 = 7;

/// Fallback scan gives up after this many consecutive empty chunks.
pub const FALLBACK_EMPTY_LIMIT: u32 = 5;

/// Pause between category requests of one chunk.
pub const CATEGORY_PAUSE_MS: u64 = 200;

/// Pause between chunks.
pub const CHUNK_PAUSE_MS: u64 = 300;

/// A chunk that failed this many times is skipped by later runs.
pub const MAX_CHUNK_FAILURES: u32 = 5;

/// Earliest date discovery searches from.
pub fn default_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 10, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Linear backoff before retry number `retry` (1-based).
pub fn linear_backoff(retry: u32, unit: Duration) -> Duration {
    unit.saturating_mul(retry)
}

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// A value is out of its allowed range
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Tunables shared by discovery and backfill.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Request quota per second
    pub requests_per_second: f64,
    /// Retries per logical call
    pub max_retries: u32,
    /// Linear backoff unit
    pub backoff_unit: Duration,
    /// Discovery probe span in days
    pub probe_span_days: i64,
    /// Binary search floor in days
    pub min_search_interval_days: i64,
    /// Discovery probe page size
    pub probe_page_size: u32,
    /// Full pagination page size
    pub page_size: u32,
    /// Backfill chunk span in days
    pub chunk_span_days: i64,
    /// Refinement look-back in days
    pub refine_lookback_days: i64,
    /// Refinement look-forward in days
    pub refine_lookahead_days: i64,
    /// Whether discovery runs the refinement pass
    pub refine: bool,
    /// Consecutive empty chunks ending the fallback scan
    pub fallback_empty_limit: u32,
    /// Pause between categories
    pub category_pause: Duration,
    /// Pause between chunks
    pub chunk_pause: Duration,
    /// Failures after which a chunk is skipped
    pub max_chunk_failures: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            requests_per_second: REQUESTS_PER_SECOND,
            max_retries: MAX_RETRIES,
            backoff_unit: Duration::from_millis(BACKOFF_UNIT_MS),
            probe_span_days: PROBE_SPAN_DAYS,
            min_search_interval_days: MIN_SEARCH_INTERVAL_DAYS,
            probe_page_size: PROBE_PAGE_SIZE,
            page_size: PAGE_SIZE,
            chunk_span_days: CHUNK_SPAN_DAYS,
            refine_lookback_days: REFINE_LOOKBACK_DAYS,
            refine_lookahead_days: REFINE_LOOKAHEAD_DAYS,
            refine: true,
            fallback_empty_limit: FALLBACK_EMPTY_LIMIT,
            category_pause: Duration::from_millis(CATEGORY_PAUSE_MS),
            chunk_pause: Duration::from_millis(CHUNK_PAUSE_MS),
            max_chunk_failures: MAX_CHUNK_FAILURES,
        }
    }
}

impl SyncConfig {
    /// Reject combinations the settlement API or the search cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.requests_per_second;
        if !(rate.is_finite() && rate >= MIN_REQUESTS_PER_SECOND) {
            return Err(invalid(
                "requests_per_second",
                format!("must be at least {MIN_REQUESTS_PER_SECOND}, got {rate}"),
            ));
        }
        for (field, days) in [
            ("probe_span_days", self.probe_span_days),
            ("chunk_span_days", self.chunk_span_days),
        ] {
            if days < 1 || days > API_MAX_WINDOW_DAYS {
                return Err(invalid(
                    field,
                    format!("must be within 1..={API_MAX_WINDOW_DAYS} days, got {days}"),
                ));
            }
        }
        // Each miss advances `low` by the floor; anything past probe span + 1 day goes unprobed.
        if self.min_search_interval_days > self.probe_span_days + 1 {
            return Err(invalid(
                "min_search_interval_days",
                format!(
                    "leaves {} unprobed days after each {}-day probe",
                    self.min_search_interval_days - self.probe_span_days,
                    self.probe_span_days
                ),
            ));
        }
        if self.page_size == 0 || self.probe_page_size == 0 {
            return Err(invalid("page_size", "must be positive".to_string()));
        }
        if self.refine_lookback_days < 0 || self.refine_lookahead_days < 0 {
            return Err(invalid(
                "refine_lookback_days",
                "refinement spans must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Probe span as a chrono duration
    pub fn probe_span(&self) -> ChronoDuration {
        ChronoDuration::days(self.probe_span_days)
    }

    /// Backfill chunk span as a chrono duration
    pub fn chunk_span(&self) -> ChronoDuration {
        ChronoDuration::days(self.chunk_span_days)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
