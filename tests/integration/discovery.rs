//! First-order discovery against an in-process ledger
//!
//! Epoch 2017-10-01, now 2024-01-01 throughout.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use settlement_sync::sync::{DiscoverySource, IntervalSearch, SyncConfig, SyncError};
use settlement_sync::shutdown::ShutdownCoordinator;
use settlement_sync::TransactionType;

use crate::support::{client_over, client_with_shutdown, daily_sales, day, record, LedgerTransport};

fn epoch() -> chrono::DateTime<Utc> {
    day(2017, 10, 1)
}

fn now() -> chrono::DateTime<Utc> {
    day(2024, 1, 1)
}

fn no_refine() -> SyncConfig {
    SyncConfig {
        refine: false,
        ..SyncConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_dense_history_found_by_binary_search() {
    let ledger = Arc::new(LedgerTransport::new(daily_sales(
        day(2019, 3, 10),
        day(2023, 12, 20),
        5,
    )));
    let client = client_over(ledger.clone());
    let config = SyncConfig::default();

    let found = IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await
        .unwrap()
        .expect("history exists");

    assert_eq!(found.first_event_date, day(2019, 3, 10));
    assert_eq!(found.phase_a_date, day(2019, 3, 10));
    assert!(!found.refinement_applied);
    assert_eq!(found.source, DiscoverySource::BinarySearch);
    assert_eq!(found.iterations, 7);
    assert_eq!(ledger.calls(), 10);
    assert_eq!(found.evidence_order_number.as_deref(), Some("S0"));
}

#[tokio::test(start_paused = true)]
async fn test_probes_only_ask_for_sales_within_api_window() {
    let ledger = Arc::new(LedgerTransport::new(daily_sales(
        day(2019, 3, 10),
        day(2023, 12, 20),
        5,
    )));
    let client = client_over(ledger.clone());
    let config = no_refine();

    IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await
        .unwrap();

    let queries = ledger.queries();
    assert_eq!(queries.len(), 7);
    for q in queries {
        assert_eq!(q.category, "Sale");
        assert_eq!(q.page, 0);
        assert_eq!(q.size, 500);
        assert_eq!(q.end - q.start, Duration::days(14).num_milliseconds());
    }
}

#[tokio::test(start_paused = true)]
async fn test_refinement_recovers_isolated_early_order() {
    let mut records = vec![record(
        "EARLY",
        day(2019, 3, 10),
        day(2019, 3, 15),
        TransactionType::Sale,
    )];
    records.extend(daily_sales(day(2019, 4, 9), day(2023, 12, 20), 5));
    let ledger = Arc::new(LedgerTransport::new(records));
    let client = client_over(ledger.clone());
    let config = SyncConfig::default();

    let found = IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.phase_a_date, day(2019, 4, 17));
    assert_eq!(found.first_event_date, day(2019, 3, 10));
    assert!(found.refinement_applied);
    assert_eq!(found.evidence_order_number.as_deref(), Some("EARLY"));
    assert_eq!(found.iterations, 6);
    assert_eq!(ledger.calls(), 9);
}

#[tokio::test(start_paused = true)]
async fn test_without_refinement_phase_a_result_stands() {
    let mut records = vec![record(
        "EARLY",
        day(2019, 3, 10),
        day(2019, 3, 15),
        TransactionType::Sale,
    )];
    records.extend(daily_sales(day(2019, 4, 9), day(2023, 12, 20), 5));
    let ledger = Arc::new(LedgerTransport::new(records));
    let client = client_over(ledger.clone());
    let config = no_refine();

    let found = IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.first_event_date, day(2019, 4, 17));
    assert!(!found.refinement_applied);
    assert_eq!(ledger.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_no_history_returns_none_after_bounded_fallback() {
    let ledger = Arc::new(LedgerTransport::new(Vec::new()));
    let client = client_over(ledger.clone());
    let config = SyncConfig::default();

    let found = IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await
        .unwrap();

    assert!(found.is_none());
    // six probes, then five empty fallback chunks
    assert_eq!(ledger.calls(), 11);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_finds_history_the_probes_missed() {
    let at = Utc.with_ymd_and_hms(2023, 11, 15, 12, 0, 0).unwrap();
    let ledger = Arc::new(LedgerTransport::new(vec![record(
        "LONE",
        at,
        at + Duration::days(3),
        TransactionType::Sale,
    )]));
    let client = client_over(ledger.clone());
    let config = SyncConfig::default();

    let found = IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.source, DiscoverySource::FallbackScan);
    assert_eq!(found.first_event_date, at);
    assert!(!found.refinement_applied);
    assert_eq!(found.iterations, 6);
    assert_eq!(ledger.calls(), 18);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_without_refinement_call_count() {
    let at = Utc.with_ymd_and_hms(2023, 11, 15, 12, 0, 0).unwrap();
    let ledger = Arc::new(LedgerTransport::new(vec![record(
        "LONE",
        at,
        at + Duration::days(3),
        TransactionType::Sale,
    )]));
    let client = client_over(ledger.clone());
    let config = no_refine();

    IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await
        .unwrap()
        .unwrap();

    // six probes and nine fallback chunks
    assert_eq!(ledger.calls(), 15);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_probes_count_as_no_evidence() {
    let ledger = Arc::new(LedgerTransport::new(daily_sales(
        day(2019, 3, 10),
        day(2023, 12, 20),
        5,
    )));
    ledger.fail_when(|_| Some(404));
    let client = client_over(ledger.clone());
    let config = SyncConfig::default();

    let found = IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await
        .unwrap();

    assert!(found.is_none());
    assert_eq!(ledger.calls(), 11);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_discovery() {
    let ledger = Arc::new(LedgerTransport::new(Vec::new()));
    ledger.fail_when(|_| Some(503));
    let shutdown = ShutdownCoordinator::shared();
    let client = client_with_shutdown(ledger.clone(), shutdown.clone());
    let config = SyncConfig::default();

    shutdown.request_shutdown();
    let result = IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await;

    assert!(matches!(result, Err(SyncError::Interrupted)));
    // the first attempt went out; the backoff before its retry was cut short
    assert_eq!(ledger.calls(), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_any_request() {
    let ledger = Arc::new(LedgerTransport::new(Vec::new()));
    let client = client_over(ledger.clone());
    let config = SyncConfig {
        probe_span_days: 10,
        ..SyncConfig::default()
    };

    let result = IntervalSearch::new(&client, &config)
        .discover(epoch(), now())
        .await;

    assert!(matches!(result, Err(SyncError::Config(_))));
    assert_eq!(ledger.calls(), 0);
}
