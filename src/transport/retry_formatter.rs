//! Retry classification and log message formatting.
//!
//! [`ErrorKind`] is the single classification used by the retry loop: it decides
//! whether an outcome is retried and how it is described to the operator.

use std::time::Duration;

use super::TransportError;

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP 401; treated as a transient token hiccup
    Unauthorized,
    /// HTTP 5xx
    ServerError(u16),
    /// HTTP 4xx other than 401
    ClientError(u16),
    /// Any other non-200 status (1xx, 2xx, 3xx)
    UnexpectedStatus(u16),
    /// Request timed out
    NetworkTimeout,
    /// Connection refused or DNS failure
    NetworkOffline,
    /// Any other transport failure
    NetworkGeneric,
}

impl ErrorKind {
    /// Classify a non-200 status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            500..=599 => Self::ServerError(status),
            400..=499 => Self::ClientError(status),
            _ => Self::UnexpectedStatus(status),
        }
    }

    /// Classify a transport failure.
    pub fn from_transport(error: &TransportError) -> Self {
        match error {
            TransportError::Timeout(_) => Self::NetworkTimeout,
            TransportError::Connect(_) => Self::NetworkOffline,
            TransportError::Other(_) => Self::NetworkGeneric,
        }
    }

    /// Whether the retry loop tries again after this outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized
                | Self::ServerError(_)
                | Self::NetworkTimeout
                | Self::NetworkOffline
                | Self::NetworkGeneric
        )
    }

    /// HTTP status behind this classification, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::ServerError(code) | Self::ClientError(code) | Self::UnexpectedStatus(code) => {
                Some(*code)
            }
            _ => None,
        }
    }

    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthorized => "authentication failed (401)",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::ClientError(code) => match code {
                400 => "invalid request",
                403 => "access forbidden",
                404 => "resource not found",
                429 => "rate limit exceeded",
                _ => "client error",
            },
            Self::UnexpectedStatus(_) => "unexpected status",
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation shown after retries are exhausted.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Verify the seller id, API key and API secret",
            Self::ServerError(_) => "The settlement service may be degraded, try again later",
            Self::ClientError(429) => "Lower --rate-limit and run again",
            Self::ClientError(_) => "Check the date window and query parameters",
            Self::UnexpectedStatus(_) => "Check --base-url points at the settlement gateway",
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Retry number about to run (1-based)
    pub retry: u32,
    /// Retries allowed for this call
    pub max_retries: u32,
    /// Classification of the failure that triggered the retry
    pub kind: ErrorKind,
    /// Backoff until the next attempt
    pub backoff: Duration,
    /// Endpoint being called
    pub endpoint: String,
    /// Human-readable query description, e.g. `Sale 2019-03-10 to 2019-03-24`
    pub query: String,
}

impl RetryContext {
    /// Convenience constructor used by the retry loop.
    pub fn new(
        retry: u32,
        max_retries: u32,
        kind: ErrorKind,
        backoff: Duration,
        endpoint: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            retry,
            max_retries,
            kind,
            backoff,
            endpoint: endpoint.into(),
            query: query.into(),
        }
    }

    /// Format standardized retry message with retry counters and context.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying ({}/{}) after {} - waiting {:.1} seconds...",
            self.retry,
            self.max_retries,
            self.kind.description(),
            self.backoff.as_secs_f64()
        );
        if !self.query.is_empty() {
            message.push_str(&format!(" ({})", self.query));
        }
        message
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!(
                "[FAILED] Request failed after {} retries",
                self.max_retries
            ),
            format!("  Last error: {}", self.kind.description()),
        ];
        if !self.query.is_empty() {
            lines.push(format!("  Query: {}", self.query));
        }
        lines.push(format!("  Endpoint: {}", self.endpoint));
        lines.push("  Suggestions:".to_string());
        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }
        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        vec![
            self.kind.suggestion().to_string(),
            format!(
                "Try increasing --max-retries (current: {})",
                self.max_retries
            ),
        ]
    }
}
