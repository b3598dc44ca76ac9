//! # Settlement Sync Library
//!
//! Discovers where a marketplace seller's settlement history begins and walks it
//! forward into a local store, while staying inside the settlement API's request
//! quota and its narrow date-window limit.
//!
//! ## Features
//!
//! - **Quota pacing**: a single [`sync::PermitScheduler`] spaces every outbound request
//! - **Resilient transport**: 401/5xx/network failures retried with linear backoff
//! - **First-order discovery**: binary search over `transactionDate` windows, corrected
//!   for the `orderDate` skew by a bounded backward refinement pass
//! - **Resumable backfill**: fixed-size chunks, per-category pagination, durable
//!   checkpoints and a failed-chunk registry
//! - **Exact money arithmetic**: commission reconciliation on [`rust_decimal::Decimal`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::{TimeZone, Utc};
//! use settlement_sync::sync::{IntervalSearch, PermitScheduler, SyncConfig};
//! use settlement_sync::transport::{Credentials, ReqwestTransport, ResilientClient, SettlementClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let credentials = Credentials::new("12345", "key", "secret");
//! let transport = Arc::new(ReqwestTransport::new("https://apigw.trendyol.com", &credentials)?);
//! let scheduler = Arc::new(PermitScheduler::per_second(config.requests_per_second)?);
//! let client = SettlementClient::new(
//!     ResilientClient::new(transport, scheduler).with_max_retries(config.max_retries),
//!     credentials.seller_id(),
//! );
//!
//! let epoch = Utc.with_ymd_and_hms(2017, 10, 1, 0, 0, 0).unwrap();
//! let search = IntervalSearch::new(&client, &config);
//! if let Some(found) = search.discover(epoch, Utc::now()).await? {
//!     println!("first order on {}", found.first_event_date);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`transport`] - HTTP boundary, retry classification, typed settlement queries
//! - [`sync`] - permit scheduler, interval search, backfill walker and their tunables
//! - [`resume`] - durable progress store and per-seller sync lock
//! - [`commission`] - VAT base and commission arithmetic
//! - [`metrics`] - Prometheus counters and histograms
//! - [`shutdown`] - Ctrl+C coordination

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Commission reconciliation arithmetic
pub mod commission;

/// Prometheus metrics
pub mod metrics;

/// Durable progress and locking
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Discovery and backfill engines
pub mod sync;

/// HTTP transport and settlement API client
pub mod transport;

/// Settlement transaction category used as the `transactionType` query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum TransactionType {
    /// Completed sale
    Sale,
    /// Customer return
    Return,
    /// Seller-funded discount
    Discount,
    /// Coupon redemption
    Coupon,
    /// Any category this crate does not query for (payments, deductions, ...)
    Other,
}

impl TransactionType {
    /// Categories fetched for every backfill chunk, in request order.
    pub const BACKFILL_ORDER: [TransactionType; 4] = [
        TransactionType::Sale,
        TransactionType::Return,
        TransactionType::Discount,
        TransactionType::Coupon,
    ];

    /// Wire name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Sale => "Sale",
            TransactionType::Return => "Return",
            TransactionType::Discount => "Discount",
            TransactionType::Coupon => "Coupon",
            TransactionType::Other => "Other",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sale" => Ok(TransactionType::Sale),
            "return" => Ok(TransactionType::Return),
            "discount" => Ok(TransactionType::Discount),
            "coupon" => Ok(TransactionType::Coupon),
            _ => Err(format!(
                "Invalid transaction type: {s}. Valid options: Sale, Return, Discount, Coupon"
            )),
        }
    }
}

impl From<String> for TransactionType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(TransactionType::Other)
    }
}

impl From<TransactionType> for &'static str {
    fn from(value: TransactionType) -> Self {
        value.as_str()
    }
}

/// One settlement line as returned by the settlement API.
///
/// The API filters on `transaction_date`; `order_date` is the business date and
/// can be several days earlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    /// Marketplace order number
    #[serde(default)]
    pub order_number: Option<String>,
    /// Date the settlement was processed
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub transaction_date: DateTime<Utc>,
    /// Date the order was placed
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub order_date: Option<DateTime<Utc>>,
    /// VAT-inclusive sale amount
    #[serde(default, alias = "grossSalePrice")]
    pub gross_amount: Decimal,
    /// VAT rate in percent
    #[serde(default)]
    pub vat_rate: Option<Decimal>,
    /// Commission rate in percent
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
    /// Commission charged by the marketplace
    #[serde(default)]
    pub commission_amount: Option<Decimal>,
    /// Settlement category
    #[serde(default)]
    pub transaction_type: Option<TransactionType>,
}

/// Return the record with the earliest `order_date`, ignoring records without one.
pub fn earliest_order<'a, I>(records: I) -> Option<&'a SettlementRecord>
where
    I: IntoIterator<Item = &'a SettlementRecord>,
{
    records
        .into_iter()
        .filter(|r| r.order_date.is_some())
        .min_by_key(|r| r.order_date)
}

/// One page of the settlement listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementPage {
    /// Records on this page
    #[serde(default)]
    pub content: Vec<SettlementRecord>,
    /// Number of pages for the whole query
    #[serde(default)]
    pub total_pages: u32,
    /// Number of records for the whole query
    #[serde(default)]
    pub total_elements: u64,
}

impl SettlementPage {
    /// Whether this query saw any settlement at all
    pub fn has_evidence(&self) -> bool {
        self.total_elements > 0 || !self.content.is_empty()
    }

    /// Whether `page` (0-based) is the last page worth requesting
    pub fn is_last(&self, page: u32) -> bool {
        self.content.is_empty() || page.saturating_add(1) >= self.total_pages
    }
}

/// Half-open date window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// Create a window from explicit bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window starting at `start` and spanning `days` whole days
    pub fn spanning_days(start: DateTime<Utc>, days: i64) -> Self {
        Self::new(start, start + Duration::days(days))
    }

    /// Start as Unix milliseconds
    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// End as Unix milliseconds
    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// True when the window covers no time
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Split into consecutive sub-windows of at most `span`; the last one is clamped.
    pub fn split(&self, span: Duration) -> Vec<DateWindow> {
        let mut windows = Vec::new();
        if span <= Duration::zero() {
            return windows;
        }
        let mut cursor = self.start;
        while cursor < self.end {
            let next = (cursor + span).min(self.end);
            windows.push(DateWindow::new(cursor, next));
            cursor = next;
        }
        windows
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}
