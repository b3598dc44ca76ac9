//! Checkpoint and failed-chunk records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DateWindow;

/// Everything before `cursor` has been backfilled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    cursor: DateTime<Utc>,
    saved_at: i64,
}

impl Checkpoint {
    /// Checkpoint at `cursor`, stamped now
    pub fn at(cursor: DateTime<Utc>) -> Self {
        Self {
            cursor,
            saved_at: Utc::now().timestamp_millis(),
        }
    }

    /// Exclusive end of the backfilled range
    pub fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    /// When the checkpoint was written (Unix milliseconds)
    pub fn saved_at(&self) -> i64 {
        self.saved_at
    }
}

/// A chunk window that failed at least once and has not succeeded since.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedChunk {
    window: DateWindow,
    attempts: u32,
    last_error: String,
    last_failed_at: i64,
}

impl FailedChunk {
    /// First failure of `window`
    pub fn new(window: DateWindow, error: impl Into<String>) -> Self {
        Self {
            window,
            attempts: 1,
            last_error: error.into(),
            last_failed_at: Utc::now().timestamp_millis(),
        }
    }

    /// Count another failure
    pub fn record(&mut self, error: impl Into<String>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = error.into();
        self.last_failed_at = Utc::now().timestamp_millis();
    }

    /// Failed window
    pub fn window(&self) -> &DateWindow {
        &self.window
    }

    /// Number of failed runs
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Message of the latest failure
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// When the latest failure happened (Unix milliseconds)
    pub fn last_failed_at(&self) -> i64 {
        self.last_failed_at
    }
}
