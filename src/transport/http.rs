//! Production HTTP transport over reqwest

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{Credentials, HttpTransport, RawResponse, TransportError};

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default settlement gateway
pub const DEFAULT_BASE_URL: &str = "https://apigw.trendyol.com";

/// reqwest-backed [`HttpTransport`] sending Basic-authenticated GET requests.
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl ReqwestTransport {
    /// Build a transport for `base_url` with the seller's credentials.
    pub fn new(base_url: impl Into<String>, credentials: &Credentials) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let agent = HeaderValue::from_str(&credentials.user_agent())
            .map_err(|e| TransportError::Other(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, agent);

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: credentials.api_key().to_string(),
            api_secret: credentials.api_secret().to_string(),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("Making GET request to: {} with {} params", url, params.len());

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .query(params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(RawResponse { status, body })
    }
}
