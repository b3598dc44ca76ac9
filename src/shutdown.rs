//! Graceful shutdown coordination.
//!
//! A [`ShutdownCoordinator`] is shared between the Ctrl+C handler and the sync
//! engines. Backoff sleeps and pacing pauses race against it so an interrupted run
//! stops at the next suspension point, leaving the last saved checkpoint intact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// One-way stop flag with async wakeups.
///
/// Once set it stays set; the walker and the retry loop poll it between requests.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    requested: AtomicBool,
    wakeup: Notify,
}

impl ShutdownCoordinator {
    /// Coordinator in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as [`ShutdownCoordinator::new`], already behind an [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Set the flag; only the first call wakes waiters.
    pub fn request_shutdown(&self) {
        let already = self.requested.swap(true, Ordering::SeqCst);
        if !already {
            self.wakeup.notify_waiters();
        }
    }

    /// True once [`ShutdownCoordinator::request_shutdown`] has been called.
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once the flag is set.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.wakeup.notified();
        tokio::pin!(notified);
        // register first, then check, so a request in between is not lost
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `false` when the sleep was cut short by shutdown.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: Option<&SharedShutdown>) -> bool {
    match shutdown {
        Some(shutdown) => {
            if shutdown.is_shutdown_requested() {
                return false;
            }
            tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = shutdown.wait_for_shutdown() => false,
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            true
        }
    }
}
