//! Shutdown reaches every waiter, including ones registered after the request

use std::time::Duration;

use settlement_sync::shutdown::{sleep_or_shutdown, ShutdownCoordinator};

#[tokio::test]
async fn test_all_waiters_released() {
    let shutdown = ShutdownCoordinator::shared();

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let handle = shutdown.clone();
            tokio::spawn(async move { handle.wait_for_shutdown().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.request_shutdown();

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(result.is_ok(), "a waiter missed the shutdown");
    }
}

#[tokio::test]
async fn test_late_waiter_does_not_block() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let handle = shutdown.clone();
    let waiter = tokio::spawn(async move { handle.wait_for_shutdown().await });

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok(), "wait_for_shutdown blocked after the request");
}

#[tokio::test(start_paused = true)]
async fn test_pause_after_request_returns_at_once() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let start = tokio::time::Instant::now();
    assert!(!sleep_or_shutdown(Duration::from_millis(300), Some(&shutdown)).await);
    assert_eq!(start.elapsed(), Duration::ZERO);
}
