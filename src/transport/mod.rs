//! HTTP boundary and settlement API client
//!
//! - [`HttpTransport`] - one raw request, no pacing or retries (mockable seam)
//! - [`ReqwestTransport`] - production transport with Basic auth and timeouts
//! - [`ResilientClient`] - permit per request, outcome classification, linear backoff
//! - [`SettlementClient`] - typed settlement queries and pagination

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt;

pub mod http;
pub mod resilient;
pub mod retry_formatter;
pub mod settlement;

pub use http::ReqwestTransport;
pub use resilient::{CallOutcome, Delivery, ResilientClient, RetryOutcome};
pub use retry_formatter::{ErrorKind, RetryContext};
pub use settlement::{CredentialStatus, SettlementClient};

/// Failure to obtain any HTTP response
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Request or connect deadline elapsed
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport failure
    #[error("network error: {0}")]
    Other(String),
}

/// Status and body of one HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
}

impl RawResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// One raw request against the settlement gateway.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `GET endpoint?params` and return whatever the server answered.
    async fn send(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<RawResponse, TransportError>;
}

/// Seller credentials for the settlement gateway.
#[derive(Clone)]
pub struct Credentials {
    seller_id: String,
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(
        seller_id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            seller_id: seller_id.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Seller id
    pub fn seller_id(&self) -> &str {
        &self.seller_id
    }

    /// API key (Basic auth user)
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// API secret (Basic auth password)
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// `User-Agent` value the gateway expects for self-integrations
    pub fn user_agent(&self) -> String {
        format!("{} - SelfIntegration", self.seller_id)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("seller_id", &self.seller_id)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Failure of a typed settlement query
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum FetchError {
    /// Transient failures outlasted the retry budget
    #[error("retries exhausted after {retries} retries: {}", .kind.description())]
    Exhausted {
        /// Last failure classification
        kind: ErrorKind,
        /// Retries spent
        retries: u32,
    },

    /// Terminal status, not retried
    #[error("request rejected with status {status}")]
    Rejected {
        /// HTTP status
        status: u16,
    },

    /// 200 with a body that does not decode
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Pagination never reached a last page
    #[error("pagination exceeded {0} pages")]
    TooManyPages(u32),

    /// Shutdown requested while waiting
    #[error("interrupted by shutdown")]
    Interrupted,
}

impl FetchError {
    /// Whether the failure means "nothing here" rather than "could not tell"
    pub fn is_rejection(&self) -> bool {
        matches!(self, FetchError::Rejected { .. })
    }
}
