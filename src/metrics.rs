//! Prometheus metrics for settlement sync
//!
//! Everything goes through the `metrics` facade, so recording is a no-op until
//! [`init_metrics`] installs the Prometheus exporter. Names carry a
//! `settlement_` prefix:
//!
//! - `settlement_http_requests_total{endpoint,status}` and request latency
//! - `settlement_http_retries_total{retry}` and backoff time
//! - `settlement_rate_limit_permits_issued_total` and permit wait time
//! - `settlement_discovery_probes_total{evidence}`
//! - `settlement_backfill_chunks_total{outcome}`

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const REQUESTS: &str = "settlement_http_requests_total";
const REQUEST_SECONDS: &str = "settlement_http_request_duration_seconds";
const RETRIES: &str = "settlement_http_retries_total";
const BACKOFF_SECONDS: &str = "settlement_retry_backoff_duration_seconds";
const PERMITS: &str = "settlement_rate_limit_permits_issued_total";
const PERMIT_WAIT_SECONDS: &str = "settlement_rate_limit_wait_seconds";
const PROBES: &str = "settlement_discovery_probes_total";
const CHUNKS: &str = "settlement_backfill_chunks_total";

static EXPORTER_ADDR: OnceCell<SocketAddr> = OnceCell::new();

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The Prometheus exporter could not be installed
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter with a scrape listener on `addr`.
///
/// Needs a running Tokio runtime. Later calls return `Ok` without doing anything.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = EXPORTER_ADDR.get() {
        debug!(addr = %existing, "Prometheus exporter already running");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    for (name, help) in [
        (REQUESTS, "Requests sent to the settlement API"),
        (RETRIES, "Retries after a transient failure"),
        (PERMITS, "Request permits handed out by the scheduler"),
        (PROBES, "Interval search probes, by whether they found evidence"),
        (CHUNKS, "Backfill chunks, by outcome"),
    ] {
        describe_counter!(name, Unit::Count, help);
    }
    for (name, help) in [
        (REQUEST_SECONDS, "Settlement API request latency"),
        (BACKOFF_SECONDS, "Backoff slept before a retry"),
        (PERMIT_WAIT_SECONDS, "Time spent waiting for a request permit"),
    ] {
        describe_histogram!(name, Unit::Seconds, help);
    }

    let _ = EXPORTER_ADDR.set(addr);
    info!(%addr, "Serving Prometheus metrics");
    Ok(())
}

/// Whether [`init_metrics`] has installed an exporter
pub fn is_initialized() -> bool {
    EXPORTER_ADDR.get().is_some()
}

/// Next `req-xxxxxxxx` id; ties the debug lines of one request together
pub fn generate_correlation_id() -> String {
    let id = NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:08x}")
}

/// One in-flight settlement API request.
pub struct HttpRequestMetrics {
    endpoint: String,
    started: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start timing a request; `attempt` is 1-based
    pub fn start(endpoint: impl Into<String>, attempt: u32) -> Self {
        let metrics = Self {
            endpoint: endpoint.into(),
            started: Instant::now(),
            correlation_id: generate_correlation_id(),
            attempt,
        };
        debug!(
            correlation_id = %metrics.correlation_id,
            endpoint = %metrics.endpoint,
            attempt,
            "Sending request"
        );
        metrics
    }

    /// The request got a response with `status_code`
    pub fn record_complete(&self, status_code: u16) {
        let elapsed = self.finish(status_code.to_string());
        debug!(
            correlation_id = %self.correlation_id,
            status = status_code,
            attempt = self.attempt,
            duration_ms = elapsed.as_millis(),
            "Response received"
        );
    }

    /// The request failed before any response arrived
    pub fn record_network_error(&self) {
        let elapsed = self.finish("network_error".to_string());
        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = elapsed.as_millis(),
            "Request failed without a response"
        );
    }

    /// Correlation ID of this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn finish(&self, status: String) -> Duration {
        let elapsed = self.started.elapsed();
        counter!(REQUESTS, "endpoint" => self.endpoint.clone(), "status" => status).increment(1);
        histogram!(REQUEST_SECONDS, "endpoint" => self.endpoint.clone())
            .record(elapsed.as_secs_f64());
        elapsed
    }
}

/// Record the backoff slept before retry number `retry`
pub fn record_retry_backoff(duration: Duration, retry: u32) {
    counter!(RETRIES, "retry" => retry.to_string()).increment(1);
    histogram!(BACKOFF_SECONDS).record(duration.as_secs_f64());
}

/// Record an issued permit and how long its caller waited
pub fn record_permit_issued(waited: Duration) {
    counter!(PERMITS).increment(1);
    histogram!(PERMIT_WAIT_SECONDS).record(waited.as_secs_f64());
}

/// Record one interval search probe
pub fn record_probe(evidence: bool) {
    counter!(PROBES, "evidence" => evidence.to_string()).increment(1);
}

/// Record a finished backfill chunk (`completed`, `failed` or `skipped`)
pub fn record_chunk(outcome: &'static str) {
    counter!(CHUNKS, "outcome" => outcome).increment(1);
}
