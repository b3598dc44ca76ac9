//! One scheduler paces every request, whoever sends it

use std::sync::Arc;
use std::time::Duration;

use settlement_sync::sync::PermitScheduler;
use settlement_sync::transport::ResilientClient;
use tokio::time::Instant;

use crate::support::ScriptedTransport;

#[tokio::test(start_paused = true)]
async fn test_ten_per_second_quota() {
    let scheduler = PermitScheduler::per_second(10.0).unwrap();
    let started = Instant::now();

    for _ in 0..11 {
        scheduler.acquire().await;
    }

    // first permit is free, the next ten are 100 ms apart
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert!(started.elapsed() < Duration::from_millis(1100));
    assert_eq!(scheduler.issued(), 11);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_the_quota() {
    let scheduler = Arc::new(PermitScheduler::new(Duration::from_millis(100)));
    let started = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            scheduler.acquire().await;
            Instant::now()
        }));
    }
    let mut grants = Vec::new();
    for handle in handles {
        grants.push(handle.await.unwrap());
    }
    grants.sort();

    for pair in grants.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100));
    }
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn test_retries_take_fresh_permits() {
    let transport = Arc::new(ScriptedTransport::statuses(&[503, 503, 200]));
    let scheduler = Arc::new(PermitScheduler::new(Duration::from_millis(100)));
    let client = ResilientClient::new(transport.clone(), scheduler.clone());

    let outcome = client.call_with_retry("/x", &[]).await;

    assert_eq!(outcome.retries, 2);
    assert_eq!(scheduler.issued(), 3);
    assert_eq!(transport.calls(), 3);
}

#[test]
fn test_invalid_rates_rejected() {
    assert!(PermitScheduler::per_second(0.0).is_err());
    assert!(PermitScheduler::per_second(-1.0).is_err());
    assert!(PermitScheduler::per_second(f64::NAN).is_err());
    assert!(PermitScheduler::per_second(1e-20).is_err());
}
