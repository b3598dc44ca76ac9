//! Main entry point for the settlement-sync CLI

use clap::Parser;
use settlement_sync::cli::{Cli, CliError, Commands};
use settlement_sync::metrics::init_metrics;
use settlement_sync::shutdown::{SharedShutdown, ShutdownCoordinator};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("settlement_sync=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr)?;
    }

    match &cli.command {
        Commands::Verify(args) => args.execute(cli, shutdown).await,
        Commands::Discover(args) => args.execute(cli, shutdown).await,
        Commands::Backfill(args) => args.execute(cli, shutdown).await,
        Commands::Sync(args) => args.execute(cli, shutdown).await,
        Commands::Reconcile(args) => args.execute(cli, shutdown).await,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing current request and saving progress...");
                shutdown.request_shutdown();
            }
        }
    });

    if let Err(e) = run(&cli, shutdown).await.map_err(anyhow::Error::from) {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
