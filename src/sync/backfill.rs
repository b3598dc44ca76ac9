//! Chunked backfill
//!
//! Walks `[start, end)` in fixed-span chunks. Each chunk fetches every
//! category in [`TransactionType::BACKFILL_ORDER`] with full pagination, then
//! records its outcome:
//!
//! - success clears the chunk from the failure registry
//! - a category failure marks the chunk failed and counts it in the registry
//! - a chunk that already failed `max_chunk_failures` times is skipped
//!
//! The checkpoint is saved at the chunk end before the cursor moves on, so a
//! restarted run resumes at the first chunk that had not finished. Failed
//! chunks are retried later with [`BackfillWalker::retry_failed`].

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use super::config::{SyncConfig, API_MAX_WINDOW_DAYS};
use super::SyncError;
use crate::metrics::record_chunk;
use crate::resume::ProgressStore;
use crate::shutdown::{sleep_or_shutdown, SharedShutdown};
use crate::transport::{FetchError, SettlementClient};
use crate::{DateWindow, SettlementRecord, TransactionType};

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Every chunk succeeded
    Completed,
    /// Some chunks failed or were skipped
    Partial,
    /// No chunk succeeded
    Failed,
    /// Stopped by shutdown
    Interrupted,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Completed => "COMPLETED",
            SyncStatus::Partial => "PARTIAL",
            SyncStatus::Failed => "FAILED",
            SyncStatus::Interrupted => "INTERRUPTED",
        };
        f.write_str(s)
    }
}

/// How a single chunk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOutcome {
    /// All categories fetched
    Completed,
    /// At least one category failed
    Failed,
    /// Poisonous, not attempted
    Skipped,
}

impl ChunkOutcome {
    fn label(self) -> &'static str {
        match self {
            ChunkOutcome::Completed => "completed",
            ChunkOutcome::Failed => "failed",
            ChunkOutcome::Skipped => "skipped",
        }
    }
}

/// What one chunk fetched
#[derive(Debug, Clone)]
pub struct ChunkReport {
    /// Chunk window
    pub window: DateWindow,
    /// Settlement rows seen over all categories and pages
    pub settlements_seen: u64,
    /// Order numbers seen in this chunk
    pub distinct_orders: HashSet<String>,
    /// Categories that could not be fetched, with the error
    pub failed_categories: Vec<(TransactionType, String)>,
    /// Shutdown cut the chunk short
    pub interrupted: bool,
}

impl ChunkReport {
    fn new(window: DateWindow) -> Self {
        Self {
            window,
            settlements_seen: 0,
            distinct_orders: HashSet::new(),
            failed_categories: Vec::new(),
            interrupted: false,
        }
    }

    fn absorb(&mut self, records: Vec<SettlementRecord>) {
        self.settlements_seen += records.len() as u64;
        self.distinct_orders
            .extend(records.into_iter().filter_map(|r| r.order_number));
    }

    fn failure_reason(&self) -> String {
        self.failed_categories
            .iter()
            .map(|(category, error)| format!("{category}: {error}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Per-chunk line in the run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkStats {
    /// Chunk window
    pub window: DateWindow,
    /// Outcome
    pub outcome: ChunkOutcome,
    /// Settlement rows seen
    pub settlements: u64,
    /// Distinct order numbers seen
    pub distinct_orders: u64,
}

/// Run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillSummary {
    /// Final state
    pub status: SyncStatus,
    /// Chunks that reached an outcome
    pub total_chunks: u32,
    /// Chunks fetched completely
    pub completed_chunks: u32,
    /// Chunks with a failed category
    pub failed_chunks: u32,
    /// Poisonous chunks not attempted
    pub skipped_chunks: u32,
    /// Settlement rows seen
    pub total_settlements: u64,
    /// Sum of per-chunk distinct order counts
    pub total_distinct_orders: u64,
    /// Start of the walked range
    pub synced_from: Option<DateTime<Utc>>,
    /// End of the walked range
    pub synced_to: Option<DateTime<Utc>>,
    /// Per-chunk results in walk order
    pub chunks: Vec<ChunkStats>,
}

impl BackfillSummary {
    fn new(synced_from: Option<DateTime<Utc>>, synced_to: Option<DateTime<Utc>>) -> Self {
        Self {
            status: SyncStatus::Completed,
            total_chunks: 0,
            completed_chunks: 0,
            failed_chunks: 0,
            skipped_chunks: 0,
            total_settlements: 0,
            total_distinct_orders: 0,
            synced_from,
            synced_to,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, window: DateWindow, outcome: ChunkOutcome, report: Option<&ChunkReport>) {
        self.total_chunks += 1;
        match outcome {
            ChunkOutcome::Completed => self.completed_chunks += 1,
            ChunkOutcome::Failed => self.failed_chunks += 1,
            ChunkOutcome::Skipped => self.skipped_chunks += 1,
        }
        let (settlements, distinct_orders) = report
            .map(|r| (r.settlements_seen, r.distinct_orders.len() as u64))
            .unwrap_or((0, 0));
        self.total_settlements += settlements;
        self.total_distinct_orders += distinct_orders;
        self.chunks.push(ChunkStats {
            window,
            outcome,
            settlements,
            distinct_orders,
        });
        record_chunk(outcome.label());
    }

    fn finish(&mut self, interrupted: bool) {
        let unsuccessful = self.failed_chunks + self.skipped_chunks;
        self.status = if interrupted {
            SyncStatus::Interrupted
        } else if unsuccessful == 0 {
            SyncStatus::Completed
        } else if unsuccessful < self.total_chunks {
            SyncStatus::Partial
        } else {
            SyncStatus::Failed
        };
    }
}

/// Chunked walker over a date range.
///
/// Shutdown is taken from the client's [`ResilientClient`](crate::transport::ResilientClient),
/// so one coordinator stops both the HTTP retries and the walk.
pub struct BackfillWalker<'a> {
    client: &'a SettlementClient,
    store: &'a dyn ProgressStore,
    config: &'a SyncConfig,
    ignore_checkpoint: bool,
}

impl<'a> BackfillWalker<'a> {
    /// Create a walker persisting progress to `store`
    pub fn new(
        client: &'a SettlementClient,
        store: &'a dyn ProgressStore,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
            ignore_checkpoint: false,
        }
    }

    /// Start at the requested date even if a checkpoint lies further ahead
    pub fn ignore_checkpoint(mut self, ignore: bool) -> Self {
        self.ignore_checkpoint = ignore;
        self
    }

    fn shutdown(&self) -> Option<&SharedShutdown> {
        self.client.resilient().shutdown()
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown().is_some_and(|s| s.is_shutdown_requested())
    }

    /// Walk `[start, end)` in chunks of `span`.
    pub async fn run(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        span: Duration,
    ) -> Result<BackfillSummary, SyncError> {
        self.config.validate()?;
        if span <= Duration::zero() {
            return Err(SyncError::InvalidRange(format!(
                "chunk span must be positive, got {span}"
            )));
        }
        // The API answers wider windows with 400, which would pass as an empty chunk.
        if span > Duration::days(API_MAX_WINDOW_DAYS) {
            return Err(SyncError::InvalidRange(format!(
                "chunk span of {} days exceeds the {API_MAX_WINDOW_DAYS}-day API window",
                span.num_days()
            )));
        }
        if start > end {
            return Err(SyncError::InvalidRange(format!(
                "start {} is after end {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            )));
        }

        let mut cursor = self.resume_cursor(start, end)?;
        let mut summary = BackfillSummary::new(Some(start), Some(end));
        let mut interrupted = false;

        info!(
            seller_id = %self.client.seller_id(),
            from = %cursor.format("%Y-%m-%d"),
            to = %end.format("%Y-%m-%d"),
            span_days = span.num_days(),
            "Starting backfill"
        );

        while cursor < end {
            if self.shutdown_requested() {
                interrupted = true;
                break;
            }
            if summary.total_chunks > 0
                && !sleep_or_shutdown(self.config.chunk_pause, self.shutdown()).await
            {
                interrupted = true;
                break;
            }

            let window = DateWindow::new(cursor, (cursor + span).min(end));
            match self.walk_chunk(window, &mut summary).await? {
                Some(_) => {}
                None => {
                    interrupted = true;
                    break;
                }
            }

            self.store.save_progress(window.end)?;
            cursor = window.end;
        }

        summary.finish(interrupted);
        info!(
            status = %summary.status,
            total_chunks = summary.total_chunks,
            completed = summary.completed_chunks,
            failed = summary.failed_chunks,
            skipped = summary.skipped_chunks,
            settlements = summary.total_settlements,
            orders = summary.total_distinct_orders,
            "Backfill finished"
        );
        Ok(summary)
    }

    /// Re-run every chunk in the failure registry, oldest first.
    ///
    /// The checkpoint is left alone.
    pub async fn retry_failed(&self) -> Result<BackfillSummary, SyncError> {
        let mut windows: Vec<DateWindow> = self
            .store
            .failed_chunks()
            .iter()
            .map(|chunk| *chunk.window())
            .collect();
        windows.sort_by_key(|w| w.start);

        let mut summary = BackfillSummary::new(
            windows.first().map(|w| w.start),
            windows.last().map(|w| w.end),
        );
        let mut interrupted = false;
        info!(chunks = windows.len(), "Retrying failed chunks");

        for window in windows {
            if summary.total_chunks > 0
                && !sleep_or_shutdown(self.config.chunk_pause, self.shutdown()).await
            {
                interrupted = true;
                break;
            }
            if self.walk_chunk(window, &mut summary).await?.is_none() {
                interrupted = true;
                break;
            }
        }

        summary.finish(interrupted);
        Ok(summary)
    }

    fn resume_cursor(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SyncError> {
        if self.ignore_checkpoint {
            return Ok(start);
        }
        Ok(match self.store.load_progress()? {
            Some(checkpoint) if checkpoint >= end => {
                info!(
                    checkpoint = %checkpoint.format("%Y-%m-%d"),
                    "Checkpoint already covers the range, nothing to do"
                );
                end
            }
            Some(checkpoint) if checkpoint > start => {
                info!(
                    checkpoint = %checkpoint.format("%Y-%m-%d"),
                    "Resuming from checkpoint"
                );
                checkpoint
            }
            _ => start,
        })
    }

    /// Process or skip one chunk and record it. `None` means shutdown cut it short.
    async fn walk_chunk(
        &self,
        window: DateWindow,
        summary: &mut BackfillSummary,
    ) -> Result<Option<ChunkOutcome>, SyncError> {
        let attempts = self.store.failed_attempts(&window);
        if attempts >= self.config.max_chunk_failures {
            warn!(
                window = %window,
                attempts = attempts,
                "Skipping poisonous chunk"
            );
            summary.push(window, ChunkOutcome::Skipped, None);
            return Ok(Some(ChunkOutcome::Skipped));
        }

        let report = self.fetch_chunk(window).await;
        if report.interrupted {
            info!(window = %window, "Chunk interrupted by shutdown");
            return Ok(None);
        }

        let outcome = if report.failed_categories.is_empty() {
            self.store.clear_failure(&window)?;
            debug!(
                window = %window,
                settlements = report.settlements_seen,
                orders = report.distinct_orders.len(),
                "Chunk completed"
            );
            ChunkOutcome::Completed
        } else {
            let failures = self.store.record_failure(&window, &report.failure_reason())?;
            warn!(
                window = %window,
                failures = failures,
                reason = %report.failure_reason(),
                "Chunk failed"
            );
            ChunkOutcome::Failed
        };

        summary.push(window, outcome, Some(&report));
        Ok(Some(outcome))
    }

    async fn fetch_chunk(&self, window: DateWindow) -> ChunkReport {
        let mut report = ChunkReport::new(window);

        for (i, category) in TransactionType::BACKFILL_ORDER.into_iter().enumerate() {
            if i > 0 && !sleep_or_shutdown(self.config.category_pause, self.shutdown()).await {
                report.interrupted = true;
                return report;
            }

            match self
                .client
                .fetch_window(&window, category, self.config.page_size)
                .await
            {
                Ok(records) => {
                    debug!(window = %window, category = %category, rows = records.len(), "Fetched category");
                    report.absorb(records);
                }
                Err(FetchError::Interrupted) => {
                    report.interrupted = true;
                    return report;
                }
                Err(e) if e.is_rejection() => {
                    warn!(
                        window = %window,
                        category = %category,
                        error = %e,
                        "Category rejected, treating as empty"
                    );
                }
                Err(e) => report.failed_categories.push((category, e.to_string())),
            }
        }

        report
    }
}
