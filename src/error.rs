//! Error types for the LDB client library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The main error type for all LDB client operations.
#[derive(Error, Debug)]
pub enum LdbError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request with middleware failed
    #[error("HTTP request failed: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// The API answered with a non-success HTTP status
    #[error("HTTP error {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Raw response body, kept for diagnostics
        body: String,
    },

    /// The API returned an error in the response body
    #[error("LDB API error: {0}")]
    Api(ApiError),

    /// A local quota window is saturated; the call was not sent
    #[error(
        "Rate limit exceeded: {limit} requests per {period}s. Try again in {retry_after_secs:.1}s."
    )]
    QuotaExceeded {
        /// Limit of the violated window
        limit: u32,
        /// Length of the violated window in seconds
        period: u64,
        /// Seconds until the oldest call in that window ages out
        retry_after_secs: f64,
    },

    /// The quota ledger could not be written to disk
    #[error("Failed to save quota cache to {}: {source}", path.display())]
    Ledger {
        /// Ledger file that was being written
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The quota table is invalid (unknown period or non-positive limit)
    #[error("Invalid quota configuration: {0}")]
    InvalidQuota(String),

    /// A configuration value could not be interpreted
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request parameters could not be encoded into a URL
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid response from the API
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LdbError {
    /// Returns `true` if this error was raised by a local quota governor.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, LdbError::QuotaExceeded { .. })
    }

    /// Suggested wait before retrying, for quota errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LdbError::QuotaExceeded {
                retry_after_secs, ..
            } => Some(Duration::from_secs_f64(retry_after_secs.max(0.0))),
            _ => None,
        }
    }
}

/// An error reported by the LDB API inside an otherwise successful response.
///
/// The API signals failures as `{"error": ...}`, where the payload is usually a
/// string but sometimes an object. The payload is kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// The raw `error` member of the response body
    pub detail: serde_json::Value,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            serde_json::Value::String(message) => write!(f, "{}", message),
            other => write!(f, "{}", other),
        }
    }
}

impl ApiError {
    /// Create a new API error from the response's `error` member.
    pub fn new(detail: serde_json::Value) -> Self {
        Self { detail }
    }

    /// Extract the error from a decoded response body, if it carries one.
    pub fn from_body(body: &serde_json::Value) -> Option<Self> {
        body.get("error").map(|detail| Self::new(detail.clone()))
    }
}
