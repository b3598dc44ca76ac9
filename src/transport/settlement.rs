//! Typed settlement API queries
//!
//! Wraps [`ResilientClient`] with the settlement endpoint's query parameters,
//! response decoding and page-following.

use tracing::{debug, info, warn};

use super::resilient::{Delivery, ResilientClient};
use super::retry_formatter::ErrorKind;
use super::FetchError;
use crate::sync::config::PAGE_SIZE;
use crate::{DateWindow, SettlementPage, SettlementRecord, TransactionType};

/// Maximum number of pages followed for one window to prevent infinite loops
const MAX_PAGES: u32 = 10_000;

/// Settlement listing path for a seller
pub fn settlements_endpoint(seller_id: &str) -> String {
    format!("/integration/finance/che/sellers/{seller_id}/settlements")
}

/// Seller address path, used as a cheap credential check
pub fn addresses_endpoint(seller_id: &str) -> String {
    format!("/integration/sellers/{seller_id}/addresses")
}

/// Result of a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// The gateway accepted the credentials
    Valid,
    /// The gateway refused them with this status
    Rejected(u16),
    /// No verdict; the gateway could not be reached
    Unreachable(ErrorKind),
    /// Shutdown requested during the check
    Interrupted,
}

/// Settlement queries for one seller.
#[derive(Clone)]
pub struct SettlementClient {
    client: ResilientClient,
    seller_id: String,
    endpoint: String,
}

impl SettlementClient {
    /// Create a client for `seller_id`
    pub fn new(client: ResilientClient, seller_id: impl Into<String>) -> Self {
        let seller_id = seller_id.into();
        Self {
            endpoint: settlements_endpoint(&seller_id),
            client,
            seller_id,
        }
    }

    /// Seller this client queries
    pub fn seller_id(&self) -> &str {
        &self.seller_id
    }

    /// Underlying retrying client
    pub fn resilient(&self) -> &ResilientClient {
        &self.client
    }

    /// Fetch one page of `transaction_type` settlements processed within `window`.
    ///
    /// `size` is capped at the API's page size maximum.
    pub async fn fetch_page(
        &self,
        window: &DateWindow,
        transaction_type: TransactionType,
        page: u32,
        size: u32,
    ) -> Result<SettlementPage, FetchError> {
        let params = [
            ("transactionType", transaction_type.as_str().to_string()),
            ("startDate", window.start_millis().to_string()),
            ("endDate", window.end_millis().to_string()),
            ("page", page.to_string()),
            ("size", size.min(PAGE_SIZE).to_string()),
        ];

        let outcome = self.client.call_with_retry(&self.endpoint, &params).await;
        match outcome.delivery {
            Delivery::Delivered(response) => response.json::<SettlementPage>().map_err(|e| {
                warn!(window = %window, page = page, error = %e, "Undecodable settlement page");
                FetchError::Malformed(e.to_string())
            }),
            Delivery::Rejected(response) => Err(FetchError::Rejected {
                status: response.status,
            }),
            Delivery::Exhausted(kind) => Err(FetchError::Exhausted {
                kind,
                retries: outcome.retries,
            }),
            Delivery::Interrupted => Err(FetchError::Interrupted),
        }
    }

    /// Fetch every page of `transaction_type` settlements processed within `window`.
    pub async fn fetch_window(
        &self,
        window: &DateWindow,
        transaction_type: TransactionType,
        size: u32,
    ) -> Result<Vec<SettlementRecord>, FetchError> {
        let mut records = Vec::new();

        for page in 0..MAX_PAGES {
            let batch = self.fetch_page(window, transaction_type, page, size).await?;
            let last = batch.is_last(page);
            debug!(
                window = %window,
                transaction_type = %transaction_type,
                page = page,
                total_pages = batch.total_pages,
                received = batch.content.len(),
                "Fetched settlement page"
            );
            records.extend(batch.content);
            if last {
                return Ok(records);
            }
        }

        Err(FetchError::TooManyPages(MAX_PAGES))
    }

    /// Check the credentials against the seller address endpoint.
    pub async fn verify_credentials(&self) -> CredentialStatus {
        let endpoint = addresses_endpoint(&self.seller_id);
        let outcome = self.client.call_with_retry(&endpoint, &[]).await;

        let status = match outcome.delivery {
            Delivery::Delivered(_) => CredentialStatus::Valid,
            Delivery::Rejected(response) => CredentialStatus::Rejected(response.status),
            Delivery::Exhausted(ErrorKind::Unauthorized) => CredentialStatus::Rejected(401),
            Delivery::Exhausted(kind) => CredentialStatus::Unreachable(kind),
            Delivery::Interrupted => CredentialStatus::Interrupted,
        };
        info!(seller_id = %self.seller_id, status = ?status, "Credential check finished");
        status
    }
}
