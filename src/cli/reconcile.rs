//! Commission reconciliation for one recent sale

use chrono::{DateTime, Duration, Utc};
use clap::Args;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::{print_output, Cli, CliError};
use crate::commission::{reconcile, Reconciliation, DEFAULT_ESTIMATED_RATE};
use crate::shutdown::SharedShutdown;
use crate::sync::SyncConfig;
use crate::transport::{FetchError, SettlementClient};
use crate::{DateWindow, SettlementRecord, TransactionType};

/// How far back to look for a sale
const LOOKBACK_DAYS: i64 = 30;

/// Reconcile command arguments
#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Commission rate to compare against, in percent (default: 18)
    #[arg(long, default_value_t = DEFAULT_ESTIMATED_RATE)]
    pub estimated_rate: Decimal,
}

impl ReconcileArgs {
    /// Fetch the most recent sale and print its reconciliation
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = cli.sync_config()?;
        let client = cli.connect(&config, shutdown)?;

        let Some(record) = latest_sale(&client, &config, Utc::now()).await? else {
            warn!(days = LOOKBACK_DAYS, "No sale found to reconcile");
            return Ok(());
        };
        let result = reconcile(&record, self.estimated_rate)?;
        info!(order = ?result.order_number, "Reconciled sale");
        print_output(cli.output_format, &result, human_reconciliation)
    }
}

/// Newest sale settled in the `LOOKBACK_DAYS` before `now`.
///
/// Windows are tried newest first; a window that cannot be fetched is skipped.
pub async fn latest_sale(
    client: &SettlementClient,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> Result<Option<SettlementRecord>, CliError> {
    let range = DateWindow::new(now - Duration::days(LOOKBACK_DAYS), now);
    let mut windows = range.split(config.probe_span());
    windows.reverse();

    for window in windows {
        // The API rejects page sizes other than 500 and 1000.
        let page = match client
            .fetch_page(&window, TransactionType::Sale, 0, config.probe_page_size)
            .await
        {
            Ok(page) => page,
            Err(FetchError::Interrupted) => return Err(CliError::Interrupted),
            Err(e) => {
                warn!(window = %window, error = %e, "Could not fetch sales");
                continue;
            }
        };
        if let Some(record) = page.content.into_iter().max_by_key(|r| r.transaction_date) {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

fn human_reconciliation(r: &Reconciliation) -> String {
    let show = |v: Option<Decimal>| v.map_or_else(|| "n/a".to_string(), |d| d.to_string());
    format!(
        "Order {}\n  VAT base:     {}\n  estimated:    {}\n  recalculated: {}\n  actual:       {}\n  difference:   {}",
        r.order_number.as_deref().unwrap_or("unknown"),
        r.vat_base,
        r.estimated,
        show(r.recalculated),
        show(r.actual),
        show(r.difference)
    )
}
