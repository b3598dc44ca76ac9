//! Paced, retrying request execution
//!
//! Retries on:
//! - 401 (treated as a transient token hiccup)
//! - 5xx server errors
//! - network errors (timeout, connection refused, reset)
//!
//! Does not retry on:
//! - any other status, including 4xx and non-200 2xx/3xx
//! - 200 responses

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::retry_formatter::{ErrorKind, RetryContext};
use super::{HttpTransport, RawResponse};
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};
use crate::shutdown::{sleep_or_shutdown, SharedShutdown};
use crate::sync::config::{linear_backoff, BACKOFF_UNIT_MS, MAX_RETRIES};
use crate::sync::PermitScheduler;

/// Classified result of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// HTTP 200
    Success(RawResponse),
    /// Worth retrying
    Transient(ErrorKind),
    /// Final answer from the server, not retried
    Terminal(RawResponse),
}

impl CallOutcome {
    /// Classify a response by status.
    pub fn from_response(response: RawResponse) -> Self {
        if response.status == 200 {
            return CallOutcome::Success(response);
        }
        let kind = ErrorKind::from_status(response.status);
        if kind.is_retryable() {
            CallOutcome::Transient(kind)
        } else {
            CallOutcome::Terminal(response)
        }
    }
}

/// How a retried call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// HTTP 200
    Delivered(RawResponse),
    /// Terminal status
    Rejected(RawResponse),
    /// Every attempt failed transiently; carries the last classification
    Exhausted(ErrorKind),
    /// Shutdown cut a backoff short
    Interrupted,
}

/// Result of [`ResilientClient::call_with_retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    /// How the call ended
    pub delivery: Delivery,
    /// Retries spent (attempts beyond the first)
    pub retries: u32,
}

impl RetryOutcome {
    /// The 200 response, if the call was delivered
    pub fn into_response(self) -> Option<RawResponse> {
        match self.delivery {
            Delivery::Delivered(response) => Some(response),
            _ => None,
        }
    }
}

/// Sends requests through a shared [`PermitScheduler`] and retries transient failures.
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn HttpTransport>,
    scheduler: Arc<PermitScheduler>,
    max_retries: u32,
    backoff_unit: Duration,
    shutdown: Option<SharedShutdown>,
}

impl ResilientClient {
    /// Create a client with the default retry budget and backoff unit.
    pub fn new(transport: Arc<dyn HttpTransport>, scheduler: Arc<PermitScheduler>) -> Self {
        Self {
            transport,
            scheduler,
            max_retries: MAX_RETRIES,
            backoff_unit: Duration::from_millis(BACKOFF_UNIT_MS),
            shutdown: None,
        }
    }

    /// Override the number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the linear backoff unit
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Attach a shutdown coordinator for cancellable backoff
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Configured retry budget
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Scheduler shared with every other client of the same quota
    pub fn scheduler(&self) -> &Arc<PermitScheduler> {
        &self.scheduler
    }

    /// Attached shutdown coordinator
    pub fn shutdown(&self) -> Option<&SharedShutdown> {
        self.shutdown.as_ref()
    }

    /// One attempt: take a permit, send, classify.
    pub async fn call(&self, endpoint: &str, params: &[(&str, String)]) -> CallOutcome {
        self.attempt(endpoint, params, 1).await
    }

    /// Call with the configured retry budget.
    pub async fn call_with_retry(&self, endpoint: &str, params: &[(&str, String)]) -> RetryOutcome {
        self.call_with_retries(endpoint, params, self.max_retries)
            .await
    }

    /// Call, retrying transient failures up to `max_retries` times.
    ///
    /// The n-th retry waits `n * backoff_unit` and takes a fresh permit.
    pub async fn call_with_retries(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        max_retries: u32,
    ) -> RetryOutcome {
        let query = describe_params(params);
        let mut last_kind = ErrorKind::NetworkGeneric;

        for retry in 0..=max_retries {
            match self.attempt(endpoint, params, retry + 1).await {
                CallOutcome::Success(response) => {
                    if retry > 0 {
                        info!(
                            endpoint = %endpoint,
                            retries = retry,
                            "Request succeeded after retries"
                        );
                    }
                    return RetryOutcome {
                        delivery: Delivery::Delivered(response),
                        retries: retry,
                    };
                }
                CallOutcome::Terminal(response) => {
                    warn!(
                        endpoint = %endpoint,
                        status = response.status,
                        query = %query,
                        "Terminal status, not retrying"
                    );
                    return RetryOutcome {
                        delivery: Delivery::Rejected(response),
                        retries: retry,
                    };
                }
                CallOutcome::Transient(kind) => {
                    last_kind = kind;
                    if retry == max_retries {
                        break;
                    }

                    let next = retry + 1;
                    let backoff = linear_backoff(next, self.backoff_unit);
                    let context =
                        RetryContext::new(next, max_retries, kind, backoff, endpoint, query.as_str());
                    warn!("{}", context.format_retry());
                    record_retry_backoff(backoff, next);

                    if !sleep_or_shutdown(backoff, self.shutdown.as_ref()).await {
                        info!(endpoint = %endpoint, "Shutdown requested during retry backoff");
                        return RetryOutcome {
                            delivery: Delivery::Interrupted,
                            retries: retry,
                        };
                    }
                }
            }
        }

        let context = RetryContext::new(
            max_retries,
            max_retries,
            last_kind,
            Duration::ZERO,
            endpoint,
            query,
        );
        warn!("{}", context.format_failure());
        RetryOutcome {
            delivery: Delivery::Exhausted(last_kind),
            retries: max_retries,
        }
    }

    async fn attempt(&self, endpoint: &str, params: &[(&str, String)], attempt: u32) -> CallOutcome {
        self.scheduler.acquire().await;
        let request = HttpRequestMetrics::start(endpoint, attempt);

        match self.transport.send(endpoint, params).await {
            Ok(response) => {
                request.record_complete(response.status);
                CallOutcome::from_response(response)
            }
            Err(e) => {
                request.record_network_error();
                debug!(
                    correlation_id = %request.correlation_id(),
                    error = %e,
                    "Transport failure"
                );
                CallOutcome::Transient(ErrorKind::from_transport(&e))
            }
        }
    }
}

fn describe_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}
