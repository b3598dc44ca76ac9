//! First-order discovery
//!
//! The settlement API filters on `transactionDate` and only accepts windows of
//! at most 15 days, but the date that matters is the first `orderDate`, which
//! can precede its settlement by about a week. Discovery runs in two phases:
//!
//! - **Phase A** binary searches `[epoch, now)` with one cheap probe page per
//!   step. If no probe ever sees evidence, a backward linear scan from `now`
//!   takes over (bounded by consecutive empty chunks).
//! - **Phase B** scans a fixed window around the Phase A result with full
//!   pagination and moves the result earlier if an older `orderDate` shows up.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::config::SyncConfig;
use super::SyncError;
use crate::metrics::record_probe;
use crate::transport::{FetchError, SettlementClient};
use crate::{earliest_order, DateWindow, SettlementRecord, TransactionType};

/// Half-open interval `[low, high)` known to contain the first event, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchInterval {
    /// Inclusive lower bound
    pub low: DateTime<Utc>,
    /// Exclusive upper bound
    pub high: DateTime<Utc>,
}

impl SearchInterval {
    /// Whole days between the bounds
    pub fn span_days(&self) -> i64 {
        (self.high - self.low).num_days()
    }

    /// `low` plus half the span, in whole days
    pub fn midpoint(&self) -> DateTime<Utc> {
        self.low + Duration::days(self.span_days() / 2)
    }

    /// Move `high` down to `date`, never below `low`.
    pub fn narrow_to(&mut self, date: DateTime<Utc>) {
        self.high = date.max(self.low);
    }
}

/// Which phase produced the pre-refinement date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscoverySource {
    /// Binary search probes
    BinarySearch,
    /// Backward linear scan after the binary search saw nothing
    FallbackScan,
}

/// Discovery result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discovery {
    /// Earliest known order date
    pub first_event_date: DateTime<Utc>,
    /// An order number seen as evidence, if the API returned one
    pub evidence_order_number: Option<String>,
    /// Whether refinement moved the date earlier
    pub refinement_applied: bool,
    /// Date before refinement
    pub phase_a_date: DateTime<Utc>,
    /// Phase that produced `phase_a_date`
    pub source: DiscoverySource,
    /// Binary search iterations
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct Evidence {
    date: DateTime<Utc>,
    order_number: Option<String>,
}

impl Evidence {
    fn from_record(record: &SettlementRecord) -> Option<Self> {
        record.order_date.map(|date| Self {
            date,
            order_number: record.order_number.clone(),
        })
    }

    fn keep_earliest(current: Option<Self>, candidate: Option<Self>) -> Option<Self> {
        match (current, candidate) {
            (Some(a), Some(b)) => Some(if b.date < a.date { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

/// Binary search for the first order date of one seller.
pub struct IntervalSearch<'a> {
    client: &'a SettlementClient,
    config: &'a SyncConfig,
}

impl<'a> IntervalSearch<'a> {
    /// Create a search using `client` for probes
    pub fn new(client: &'a SettlementClient, config: &'a SyncConfig) -> Self {
        Self { client, config }
    }

    /// Find the earliest order date in `[epoch, now)`; `None` when the seller has no history.
    pub async fn discover(
        &self,
        epoch: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Discovery>, SyncError> {
        self.config.validate()?;
        info!(
            seller_id = %self.client.seller_id(),
            epoch = %epoch.format("%Y-%m-%d"),
            now = %now.format("%Y-%m-%d"),
            "Starting first-order discovery"
        );

        let (found, iterations) = self.binary_search(epoch, now).await?;
        let (phase_a, source) = match found {
            Some(evidence) => (evidence, DiscoverySource::BinarySearch),
            None => {
                info!(
                    iterations = iterations,
                    "Binary search saw no evidence, scanning backwards from now"
                );
                match self.fallback_scan(epoch, now).await? {
                    Some(evidence) => (evidence, DiscoverySource::FallbackScan),
                    None => {
                        info!("No settlement history found in range");
                        return Ok(None);
                    }
                }
            }
        };

        let mut discovery = Discovery {
            first_event_date: phase_a.date,
            evidence_order_number: phase_a.order_number.clone(),
            refinement_applied: false,
            phase_a_date: phase_a.date,
            source,
            iterations,
        };

        if self.config.refine {
            if let Some(earliest) = self.refine(phase_a.date, now).await? {
                if earliest.date < phase_a.date {
                    info!(
                        before = %phase_a.date.format("%Y-%m-%d"),
                        after = %earliest.date.format("%Y-%m-%d"),
                        "Refinement found an earlier order date"
                    );
                    discovery.first_event_date = earliest.date;
                    discovery.evidence_order_number = earliest.order_number;
                    discovery.refinement_applied = true;
                } else if discovery.evidence_order_number.is_none() {
                    discovery.evidence_order_number = earliest.order_number;
                }
            }
        }

        info!(
            first_event_date = %discovery.first_event_date.format("%Y-%m-%d"),
            refinement_applied = discovery.refinement_applied,
            source = ?discovery.source,
            iterations = discovery.iterations,
            "Discovery finished"
        );
        Ok(Some(discovery))
    }

    /// Phase A. Returns the best evidence found and the number of probes issued.
    async fn binary_search(
        &self,
        epoch: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(Option<Evidence>, u32), SyncError> {
        let floor = self.config.min_search_interval_days;
        let mut interval = SearchInterval { low: epoch, high: now };
        let mut best: Option<Evidence> = None;
        let mut iterations = 0;

        while interval.span_days() >= floor {
            iterations += 1;
            let mid = interval.midpoint();
            let probe = DateWindow::spanning_days(mid, self.config.probe_span_days);

            let page = match self
                .client
                .fetch_page(&probe, TransactionType::Sale, 0, self.config.probe_page_size)
                .await
            {
                Ok(page) => Some(page),
                Err(FetchError::Interrupted) => return Err(SyncError::Interrupted),
                Err(e) => {
                    warn!(probe = %probe, error = %e, "Probe failed, treating as no evidence");
                    None
                }
            };

            match page.filter(|p| p.has_evidence()) {
                Some(page) => {
                    record_probe(true);
                    let oldest = earliest_order(&page.content).and_then(Evidence::from_record);
                    match oldest {
                        // An order date can predate `low` when it lags its settlement.
                        Some(evidence) if evidence.date < mid => {
                            interval.narrow_to(evidence.date);
                            best = Some(evidence);
                        }
                        other => {
                            interval.high = mid;
                            best = Some(Evidence {
                                date: mid,
                                order_number: other.and_then(|e| e.order_number),
                            });
                        }
                    }
                }
                None => {
                    record_probe(false);
                    interval.low = mid + Duration::days(floor);
                }
            }

            debug!(
                iteration = iterations,
                probe = %probe,
                low = %interval.low.format("%Y-%m-%d"),
                high = %interval.high.format("%Y-%m-%d"),
                best = ?best.as_ref().map(|e| e.date),
                "Binary search step"
            );
        }

        Ok((best, iterations))
    }

    /// Phase A fallback: walk back from `now` until enough consecutive chunks are empty.
    async fn fallback_scan(
        &self,
        epoch: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Evidence>, SyncError> {
        let span = self.config.probe_span();
        let mut end = now;
        let mut consecutive_empty = 0;
        let mut earliest: Option<Evidence> = None;

        while end > epoch && consecutive_empty < self.config.fallback_empty_limit {
            let start = (end - span).max(epoch);
            let window = DateWindow::new(start, end);

            match self.fetch_all(&window).await? {
                Some(records) if !records.is_empty() => {
                    consecutive_empty = 0;
                    let candidate = earliest_order(&records).and_then(Evidence::from_record);
                    earliest = Evidence::keep_earliest(earliest, candidate);
                }
                _ => consecutive_empty += 1,
            }
            end = start;
        }

        Ok(earliest)
    }

    /// Phase B: earliest order date in `[date - lookback, date + lookahead)`.
    async fn refine(
        &self,
        date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Evidence>, SyncError> {
        let start = date - Duration::days(self.config.refine_lookback_days);
        let end = (date + Duration::days(self.config.refine_lookahead_days)).min(now.max(date));
        let window = DateWindow::new(start, end);
        debug!(window = %window, "Refining discovery result");

        let mut earliest: Option<Evidence> = None;
        for chunk in window.split(self.config.probe_span()) {
            if let Some(records) = self.fetch_all(&chunk).await? {
                let candidate = earliest_order(&records).and_then(Evidence::from_record);
                earliest = Evidence::keep_earliest(earliest, candidate);
            }
        }
        Ok(earliest)
    }

    /// Fully paginated Sale fetch; `None` when the window could not be read.
    async fn fetch_all(
        &self,
        window: &DateWindow,
    ) -> Result<Option<Vec<SettlementRecord>>, SyncError> {
        match self
            .client
            .fetch_window(window, TransactionType::Sale, self.config.page_size)
            .await
        {
            Ok(records) => Ok(Some(records)),
            Err(FetchError::Interrupted) => Err(SyncError::Interrupted),
            Err(e) => {
                warn!(window = %window, error = %e, "Window fetch failed, treating as empty");
                Ok(None)
            }
        }
    }
}
