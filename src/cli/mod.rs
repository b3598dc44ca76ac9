//! CLI command implementations

pub mod backfill;
pub mod discover;
pub mod error;
pub mod reconcile;
pub mod verify;

pub use backfill::BackfillArgs;
pub use discover::{DiscoverArgs, SyncArgs};
pub use error::CliError;
pub use reconcile::ReconcileArgs;
pub use verify::VerifyArgs;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::shutdown::SharedShutdown;
use crate::sync::{PermitScheduler, SyncConfig};
use crate::transport::http::DEFAULT_BASE_URL;
use crate::transport::{Credentials, ReqwestTransport, ResilientClient, SettlementClient};

/// Settlement Sync CLI
#[derive(Parser, Debug)]
#[command(name = "settlement-sync")]
#[command(about = "Discover and backfill marketplace settlement history", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Seller (supplier) ID
    #[arg(long, global = true, env = "SETTLEMENT_SELLER_ID")]
    pub seller_id: Option<String>,

    /// API key
    #[arg(long, global = true, env = "SETTLEMENT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API secret
    #[arg(long, global = true, env = "SETTLEMENT_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// Settlement API base URL
    #[arg(long, global = true, env = "SETTLEMENT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Requests per second shared by every call (default: 10)
    #[arg(long, global = true, default_value_t = crate::sync::config::REQUESTS_PER_SECOND)]
    pub rate_limit: f64,

    /// Maximum number of retries for transient failures (default: 3, range: 0-20)
    #[arg(long, global = true, default_value = "3", value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Directory for checkpoints and lock files
    #[arg(long, global = true, default_value = ".sync-state")]
    pub state_dir: PathBuf,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Output format (json or human)
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output_format: OutputFormat,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the credentials are accepted
    Verify(VerifyArgs),

    /// Find the seller's first order date
    Discover(DiscoverArgs),

    /// Backfill settlements over a date range
    Backfill(BackfillArgs),

    /// Discover, then backfill from the first order date to now
    Sync(SyncArgs),

    /// Compare one recent sale's commission with an estimated rate
    Reconcile(ReconcileArgs),
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl Cli {
    /// Credentials from flags or environment
    pub fn credentials(&self) -> Result<Credentials, CliError> {
        fn required<'a>(value: &'a Option<String>, flag: &str, env: &str) -> Result<&'a str, CliError> {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| CliError::InvalidArgument(format!("missing {flag} (or {env})")))
        }

        let seller_id = required(&self.seller_id, "--seller-id", "SETTLEMENT_SELLER_ID")?;
        // The ID names the checkpoint and lock files under --state-dir.
        if !is_plain_seller_id(seller_id) {
            return Err(CliError::InvalidArgument(format!(
                "invalid --seller-id '{seller_id}': only letters, digits, '-' and '_' are allowed"
            )));
        }

        Ok(Credentials::new(
            seller_id,
            required(&self.api_key, "--api-key", "SETTLEMENT_API_KEY")?,
            required(&self.api_secret, "--api-secret", "SETTLEMENT_API_SECRET")?,
        ))
    }

    /// Defaults overridden by the global flags
    pub fn sync_config(&self) -> Result<SyncConfig, CliError> {
        let config = SyncConfig {
            requests_per_second: self.rate_limit,
            max_retries: self.max_retries,
            ..SyncConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Build the settlement client: one scheduler, one transport, shared shutdown.
    pub fn connect(
        &self,
        config: &SyncConfig,
        shutdown: SharedShutdown,
    ) -> Result<SettlementClient, CliError> {
        let credentials = self.credentials()?;
        let transport = Arc::new(ReqwestTransport::new(self.base_url.clone(), &credentials)?);
        let scheduler = Arc::new(PermitScheduler::per_second(config.requests_per_second)?);
        let resilient = ResilientClient::new(transport, scheduler)
            .with_max_retries(config.max_retries)
            .with_backoff_unit(config.backoff_unit)
            .with_shutdown(shutdown);
        Ok(SettlementClient::new(resilient, credentials.seller_id()))
    }
}

fn is_plain_seller_id(id: &str) -> bool {
    id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Print `value` as JSON, or the `human` rendering of it.
fn print_output<T: Serialize>(
    format: OutputFormat,
    value: &T,
    human: impl FnOnce(&T) -> String,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Human => println!("{}", human(value)),
    }
    Ok(())
}

/// Try to parse an RFC3339 datetime, assuming UTC when no offset is given.
fn try_parse_datetime_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// Parse a start date from YYYY-MM-DD (start of day UTC) or RFC3339.
pub fn parse_start_date(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }

    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid date '{input}': {e}")))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid date '{input}'")))
}

/// Parse an exclusive end date.
///
/// A bare YYYY-MM-DD includes that whole day, so it maps to the next midnight.
/// RFC3339 input is taken as given.
pub fn parse_end_date(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }
    Ok(parse_start_date(input)? + Duration::days(1))
}
