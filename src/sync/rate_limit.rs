//! Request pacing
//!
//! Every outbound request takes one permit from a shared [`PermitScheduler`].
//! Permits are issued at least `interval` apart, no matter how many tasks share
//! the scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::metrics::record_permit_issued;

/// Minimum-interval permit scheduler.
///
/// The last issue instant is the only shared state. It is reserved under a
/// short critical section and the lock is released before the caller sleeps,
/// so a cancelled `acquire` can never leave the lock held. A cancelled caller
/// leaves its reserved slot unused, which only makes the spacing wider.
#[derive(Debug)]
pub struct PermitScheduler {
    interval: Duration,
    last_issue: Mutex<Option<Instant>>,
    issued: AtomicU64,
}

impl PermitScheduler {
    /// Create a scheduler issuing at most one permit per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_issue: Mutex::new(None),
            issued: AtomicU64::new(0),
        }
    }

    /// Create a scheduler for `rate` requests per second.
    pub fn per_second(rate: f64) -> Result<Self, RateLimitError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(RateLimitError::InvalidRate(rate));
        }
        // Rates near zero give an interval past `Duration::MAX`.
        let interval = Duration::try_from_secs_f64(1.0 / rate)
            .map_err(|_| RateLimitError::InvalidRate(rate))?;
        Ok(Self::new(interval))
    }

    /// Minimum spacing between two permits
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of permits issued so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Wait for a permit and return how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let now = Instant::now();
        let slot = self.reserve(now);
        if slot > now {
            sleep_until(slot).await;
        }
        let waited = slot.saturating_duration_since(now);
        self.issued.fetch_add(1, Ordering::SeqCst);
        record_permit_issued(waited);

        if waited > Duration::ZERO {
            debug!(wait_ms = waited.as_millis(), "Permit issued after wait");
        }
        waited
    }

    /// Take a permit only if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_issue.lock().unwrap_or_else(PoisonError::into_inner);
        let ready = match *last {
            Some(prev) => prev + self.interval <= now,
            None => true,
        };
        if !ready {
            return false;
        }
        *last = Some(now);
        drop(last);

        self.issued.fetch_add(1, Ordering::SeqCst);
        record_permit_issued(Duration::ZERO);
        true
    }

    fn reserve(&self, now: Instant) -> Instant {
        let mut last = self.last_issue.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = match *last {
            Some(prev) => (prev + self.interval).max(now),
            None => now,
        };
        *last = Some(slot);
        slot
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Rate is not a positive number, or too small to express as an interval
    #[error("invalid request rate: {0} per second")]
    InvalidRate(f64),
}
