//! Backfill command

use chrono::{DateTime, Utc};
use clap::Args;
use tracing::{info, warn};

use super::{parse_end_date, parse_start_date, print_output, Cli, CliError};
use crate::resume::{FileProgressStore, SyncLock};
use crate::shutdown::SharedShutdown;
use crate::sync::{BackfillSummary, BackfillWalker, SyncConfig, SyncStatus};
use crate::transport::SettlementClient;

/// Backfill command arguments
#[derive(Debug, Args)]
pub struct BackfillArgs {
    /// Start date (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub from: String,

    /// End date, inclusive for YYYY-MM-DD (default: now)
    #[arg(long)]
    pub to: Option<String>,

    /// Chunk span in days (1-15)
    #[arg(long, default_value = "14", value_parser = clap::value_parser!(i64).range(1..=15))]
    pub chunk_days: i64,

    /// Ignore the stored checkpoint and start at --from
    #[arg(long, default_value_t = false)]
    pub restart: bool,

    /// Re-run the chunks recorded as failed instead of walking the range
    #[arg(long, default_value_t = false, conflicts_with = "restart")]
    pub retry_failed: bool,
}

impl BackfillArgs {
    /// Execute the backfill
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = SyncConfig {
            chunk_span_days: self.chunk_days,
            ..cli.sync_config()?
        };
        config.validate()?;

        let start = parse_start_date(&self.from)?;
        let end = match &self.to {
            Some(to) => parse_end_date(to)?,
            None => Utc::now(),
        };
        if start >= end {
            return Err(CliError::InvalidArgument(format!(
                "--from {} must be before --to {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            )));
        }

        let client = cli.connect(&config, shutdown)?;
        let mut lock = SyncLock::open(&cli.state_dir, client.seller_id())?;
        let _guard = lock.try_hold()?;
        let store = FileProgressStore::open(&cli.state_dir, client.seller_id())?;

        let summary = if self.retry_failed {
            BackfillWalker::new(&client, &store, &config).retry_failed().await?
        } else {
            walk(&client, &store, &config, start, end, self.restart).await?
        };
        report(cli, &summary)
    }
}

/// Walk `[start, end)` with the configured chunk span.
pub(super) async fn walk(
    client: &SettlementClient,
    store: &FileProgressStore,
    config: &SyncConfig,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    restart: bool,
) -> Result<BackfillSummary, CliError> {
    info!(state = %store.path().display(), "Using sync state");
    Ok(BackfillWalker::new(client, store, config)
        .ignore_checkpoint(restart)
        .run(start, end, config.chunk_span())
        .await?)
}

/// Print the summary; only a run without a single good chunk is an error.
pub(super) fn report(cli: &Cli, summary: &BackfillSummary) -> Result<(), CliError> {
    print_output(cli.output_format, summary, human_summary)?;
    match summary.status {
        SyncStatus::Completed => Ok(()),
        SyncStatus::Partial => {
            warn!(
                failed = summary.failed_chunks,
                skipped = summary.skipped_chunks,
                "Backfill partially completed; rerun with --retry-failed"
            );
            Ok(())
        }
        SyncStatus::Interrupted => {
            warn!("Backfill interrupted; progress saved, rerun to resume");
            Ok(())
        }
        SyncStatus::Failed => Err(CliError::BackfillFailed(summary.status)),
    }
}

fn human_summary(summary: &BackfillSummary) -> String {
    let range = match (summary.synced_from, summary.synced_to) {
        (Some(from), Some(to)) => format!(
            "{} to {}",
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        ),
        _ => "no chunks".to_string(),
    };
    format!(
        "Backfill {}: {}\n  chunks: {} total, {} completed, {} failed, {} skipped\n  settlements: {}, orders: {}",
        summary.status,
        range,
        summary.total_chunks,
        summary.completed_chunks,
        summary.failed_chunks,
        summary.skipped_chunks,
        summary.total_settlements,
        summary.total_distinct_orders
    )
}
