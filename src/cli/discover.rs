//! Discover and sync commands

use chrono::{DateTime, Utc};
use clap::Args;
use tracing::{info, warn};

use super::{parse_start_date, print_output, Cli, CliError};
use crate::resume::{FileProgressStore, SyncLock};
use crate::shutdown::SharedShutdown;
use crate::sync::config::default_epoch;
use crate::sync::{Discovery, IntervalSearch, SyncConfig, SyncError};
use crate::transport::SettlementClient;

/// Discover command arguments
#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Earliest date to search from (YYYY-MM-DD or RFC3339, default: 2017-10-01)
    #[arg(long)]
    pub epoch: Option<String>,

    /// Skip the refinement pass around the binary search result
    #[arg(long, default_value_t = false)]
    pub no_refine: bool,
}

/// Sync command arguments
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Earliest date to search from (YYYY-MM-DD or RFC3339, default: 2017-10-01)
    #[arg(long)]
    pub epoch: Option<String>,
}

fn resolve_epoch(epoch: Option<&str>) -> Result<DateTime<Utc>, CliError> {
    epoch.map(parse_start_date).transpose().map(|e| e.unwrap_or_else(default_epoch))
}

fn describe(found: &Option<Discovery>) -> String {
    match found {
        Some(d) => {
            let mut line = format!(
                "First order: {} (via {:?}, {} probes",
                d.first_event_date.format("%Y-%m-%d %H:%M:%S"),
                d.source,
                d.iterations
            );
            if d.refinement_applied {
                line.push_str(&format!(
                    ", refined from {}",
                    d.phase_a_date.format("%Y-%m-%d")
                ));
            }
            line.push(')');
            if let Some(order) = &d.evidence_order_number {
                line.push_str(&format!("\nEvidence order: {order}"));
            }
            line
        }
        None => "No settlement history found".to_string(),
    }
}

async fn run_discovery(
    client: &SettlementClient,
    config: &SyncConfig,
    epoch: DateTime<Utc>,
) -> Result<Option<Discovery>, CliError> {
    let now = Utc::now();
    if epoch >= now {
        return Err(CliError::InvalidArgument(format!(
            "epoch {} is not in the past",
            epoch.format("%Y-%m-%d")
        )));
    }
    Ok(IntervalSearch::new(client, config).discover(epoch, now).await?)
}

/// A shutdown during discovery ends the command cleanly: nothing was saved yet.
fn unless_interrupted<T>(result: Result<T, CliError>) -> Result<Option<T>, CliError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CliError::Interrupted | CliError::SyncError(SyncError::Interrupted)) => {
            warn!("Discovery interrupted before it finished; rerun to start over");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl DiscoverArgs {
    /// Execute discovery only
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let mut config = cli.sync_config()?;
        config.refine = !self.no_refine;
        let epoch = resolve_epoch(self.epoch.as_deref())?;
        let client = cli.connect(&config, shutdown)?;

        let Some(found) = unless_interrupted(run_discovery(&client, &config, epoch).await)? else {
            return Ok(());
        };
        print_output(cli.output_format, &found, describe)
    }
}

impl SyncArgs {
    /// Discover the first order date, then backfill from it to now
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = cli.sync_config()?;
        let epoch = resolve_epoch(self.epoch.as_deref())?;
        let client = cli.connect(&config, shutdown)?;

        let mut lock = SyncLock::open(&cli.state_dir, client.seller_id())?;
        let _guard = lock.try_hold()?;
        let store = FileProgressStore::open(&cli.state_dir, client.seller_id())?;

        let Some(found) = unless_interrupted(run_discovery(&client, &config, epoch).await)? else {
            return Ok(());
        };
        let Some(found) = found else {
            warn!(seller_id = %client.seller_id(), "No settlement history, nothing to backfill");
            return print_output(cli.output_format, &None::<Discovery>, describe);
        };
        info!(
            first_event_date = %found.first_event_date.format("%Y-%m-%d"),
            "Backfilling from discovered date"
        );

        let summary =
            super::backfill::walk(&client, &store, &config, found.first_event_date, Utc::now(), false)
                .await?;
        super::backfill::report(cli, &summary)
    }
}
