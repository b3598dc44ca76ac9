//! In-process fakes for the settlement API

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use settlement_sync::sync::{PermitScheduler, SyncConfig};
use settlement_sync::transport::{
    HttpTransport, RawResponse, ResilientClient, SettlementClient, TransportError,
};
use settlement_sync::{SettlementRecord, TransactionType};

pub const SELLER: &str = "4711";

pub fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn record(
    order: &str,
    order_date: DateTime<Utc>,
    transaction_date: DateTime<Utc>,
    kind: TransactionType,
) -> SettlementRecord {
    SettlementRecord {
        order_number: Some(order.to_string()),
        transaction_date,
        order_date: Some(order_date),
        gross_amount: Decimal::new(24990, 2),
        vat_rate: Some(Decimal::from(20)),
        commission_rate: Some(Decimal::from(18)),
        commission_amount: Some(Decimal::new(3749, 2)),
        transaction_type: Some(kind),
    }
}

/// One Sale per day in `[from, to)`, each settled `lag_days` later.
pub fn daily_sales(from: DateTime<Utc>, to: DateTime<Utc>, lag_days: i64) -> Vec<SettlementRecord> {
    let mut out = Vec::new();
    let mut date = from;
    let mut n = 0;
    while date < to {
        out.push(record(
            &format!("S{n}"),
            date,
            date + Duration::days(lag_days),
            TransactionType::Sale,
        ));
        date += Duration::days(1);
        n += 1;
    }
    out
}

/// Query parameters seen by the fake
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub category: String,
    pub start: i64,
    pub end: i64,
    pub page: u32,
    pub size: u32,
}

impl Query {
    fn parse(params: &[(&str, String)]) -> Self {
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        Self {
            category: get("transactionType"),
            start: get("startDate").parse().unwrap_or(0),
            end: get("endDate").parse().unwrap_or(0),
            page: get("page").parse().unwrap_or(0),
            size: get("size").parse().unwrap_or(1),
        }
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.start).unwrap()
    }
}

type FailureRule = Box<dyn Fn(&Query) -> Option<u16> + Send + Sync>;

/// Settlement API backed by a fixed list of records.
///
/// Filters on `transactionType` and `[startDate, endDate)` over the
/// transaction date, sorted ascending, and paginates like the real listing.
pub struct LedgerTransport {
    records: Vec<SettlementRecord>,
    queries: Mutex<Vec<Query>>,
    failure: Mutex<Option<FailureRule>>,
}

impl LedgerTransport {
    pub fn new(mut records: Vec<SettlementRecord>) -> Self {
        records.sort_by_key(|r| r.transaction_date);
        Self {
            records,
            queries: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Answer matching queries with `status` instead of data.
    pub fn fail_when(&self, rule: impl Fn(&Query) -> Option<u16> + Send + Sync + 'static) {
        *self.failure.lock().unwrap() = Some(Box::new(rule));
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    fn page(&self, q: &Query) -> serde_json::Value {
        let matching: Vec<&SettlementRecord> = self
            .records
            .iter()
            .filter(|r| {
                let kind = r.transaction_type.unwrap_or(TransactionType::Sale);
                let at = r.transaction_date.timestamp_millis();
                kind.as_str() == q.category && q.start <= at && at < q.end
            })
            .collect();
        let size = q.size.max(1) as usize;
        let total = matching.len();
        let content: Vec<&SettlementRecord> = matching
            .into_iter()
            .skip(q.page as usize * size)
            .take(size)
            .collect();
        json!({
            "content": content,
            "totalPages": total.div_ceil(size),
            "totalElements": total,
            "page": q.page,
            "size": size,
        })
    }
}

#[async_trait]
impl HttpTransport for LedgerTransport {
    async fn send(
        &self,
        _endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<RawResponse, TransportError> {
        let query = Query::parse(params);
        self.queries.lock().unwrap().push(query.clone());

        if let Some(rule) = self.failure.lock().unwrap().as_ref() {
            if let Some(status) = rule(&query) {
                return Ok(RawResponse::new(status, "{\"error\":\"scripted\"}"));
            }
        }
        Ok(RawResponse::new(200, self.page(&query).to_string()))
    }
}

/// Transport replaying a fixed sequence of results, then 200 `{}`.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn statuses(statuses: &[u16]) -> Self {
        Self::new(
            statuses
                .iter()
                .map(|s| Ok(RawResponse::new(*s, "{}")))
                .collect(),
        )
    }

    pub fn new(script: Vec<Result<RawResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        _endpoint: &str,
        _params: &[(&str, String)],
    ) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::new(200, "{}")))
    }
}

/// Settlement client over `transport` with the default quota and backoff.
pub fn client_over(transport: Arc<dyn HttpTransport>) -> SettlementClient {
    let config = SyncConfig::default();
    let scheduler = Arc::new(PermitScheduler::per_second(config.requests_per_second).unwrap());
    SettlementClient::new(
        ResilientClient::new(transport, scheduler).with_max_retries(config.max_retries),
        SELLER,
    )
}

/// Same as [`client_over`], stopping on `shutdown`.
pub fn client_with_shutdown(
    transport: Arc<dyn HttpTransport>,
    shutdown: settlement_sync::shutdown::SharedShutdown,
) -> SettlementClient {
    let base = client_over(transport);
    SettlementClient::new(base.resilient().clone().with_shutdown(shutdown), SELLER)
}
