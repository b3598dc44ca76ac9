//! CLI parsing and exit codes

use assert_cmd::Command;
use clap::Parser;
use predicates::prelude::*;
use settlement_sync::cli::{Cli, Commands, OutputFormat};

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("settlement-sync").unwrap();
    for var in [
        "SETTLEMENT_SELLER_ID",
        "SETTLEMENT_API_KEY",
        "SETTLEMENT_API_SECRET",
        "SETTLEMENT_BASE_URL",
        "RUST_LOG",
        "LOG_FORMAT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_defaults() {
    let cli = Cli::parse_from(["settlement-sync", "discover"]);
    assert_eq!(cli.max_retries, 3);
    assert_eq!(cli.rate_limit, 10.0);
    assert_eq!(cli.base_url, "https://apigw.trendyol.com");
    assert_eq!(cli.state_dir.to_str(), Some(".sync-state"));
    assert_eq!(cli.output_format, OutputFormat::Human);
    assert!(matches!(
        cli.command,
        Commands::Discover(ref args) if args.epoch.is_none() && !args.no_refine
    ));
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::parse_from([
        "settlement-sync",
        "backfill",
        "--from",
        "2024-01-01",
        "--chunk-days",
        "7",
        "--max-retries",
        "5",
        "--output-format",
        "json",
    ]);
    assert_eq!(cli.max_retries, 5);
    assert_eq!(cli.output_format, OutputFormat::Json);
    let Commands::Backfill(args) = cli.command else {
        panic!("expected backfill");
    };
    assert_eq!(args.from, "2024-01-01");
    assert_eq!(args.chunk_days, 7);
    assert!(args.to.is_none());
}

#[test]
fn test_chunk_days_bounded_by_api_window() {
    assert!(Cli::try_parse_from([
        "settlement-sync",
        "backfill",
        "--from",
        "2024-01-01",
        "--chunk-days",
        "16",
    ])
    .is_err());
}

#[test]
fn test_restart_conflicts_with_retry_failed() {
    assert!(Cli::try_parse_from([
        "settlement-sync",
        "backfill",
        "--from",
        "2024-01-01",
        "--restart",
        "--retry-failed",
    ])
    .is_err());
}

#[test]
fn test_help_lists_commands() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("discover"))
        .stdout(predicate::str::contains("backfill"))
        .stdout(predicate::str::contains("reconcile"));
}

#[test]
fn test_missing_credentials_exit_with_failure() {
    bin()
        .arg("verify")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--seller-id"));
}

#[test]
fn test_inverted_range_fails_before_any_request() {
    let dir = tempfile::TempDir::new().unwrap();
    bin()
        .args([
            "backfill",
            "--from",
            "2024-02-01",
            "--to",
            "2024-01-01",
            "--seller-id",
            "4711",
            "--api-key",
            "k",
            "--api-secret",
            "s",
            "--base-url",
            "http://127.0.0.1:9",
            "--state-dir",
        ])
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("must be before"));
}

#[test]
fn test_seller_id_with_path_segments_is_refused() {
    let dir = tempfile::TempDir::new().unwrap();
    let state_dir = dir.path().join("state");
    bin()
        .args([
            "backfill",
            "--from",
            "2024-01-01",
            "--to",
            "2024-01-10",
            "--seller-id",
            "../escaped",
            "--api-key",
            "k",
            "--api-secret",
            "s",
            "--base-url",
            "http://127.0.0.1:9",
            "--state-dir",
        ])
        .arg(&state_dir)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid --seller-id"));

    assert!(!dir.path().join("escaped.sync.lock").exists());
    assert!(!dir.path().join("escaped.json").exists());
    assert!(!state_dir.exists());
}
