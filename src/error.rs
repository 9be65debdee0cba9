//! Error types for the probing harness.
//!
//! Each layer has its own enum: [`LlmError`] for the chat service (and the
//! retry predicate that classifies it), [`StoreError`] for JSONL batches, and
//! the crate-wide [`Error`] that the pipelines return.

use std::path::PathBuf;

use reqwest::StatusCode;

/// Errors raised by calls to the LLM chat service.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The request did not complete within the configured timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// The service answered 429.
    #[error("LLM rate limit exceeded: {0}")]
    RateLimited(String),

    /// The connection could not be established or was dropped.
    #[error("Failed to connect to LLM service: {0}")]
    Connection(String),

    /// The service answered 503.
    #[error("LLM service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Any other server-side failure.
    #[error("LLM API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the service.
        message: String,
    },

    /// The service rejected the request itself (4xx other than 429).
    #[error("LLM rejected request ({status}): {message}")]
    InvalidRequest {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the service.
        message: String,
    },

    /// The reply could not be decoded or carried no message content.
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    /// The client could not be built from its settings.
    #[error("LLM client misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Whether the failure is worth another attempt.
    ///
    /// Timeouts, rate limits, connection failures, 503s and generic
    /// server errors are transient; everything else fails fast.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::RateLimited(_)
                | Self::Connection(_)
                | Self::ServiceUnavailable(_)
                | Self::Api { .. }
        )
    }

    /// Classify a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited(message),
            StatusCode::SERVICE_UNAVAILABLE => Self::ServiceUnavailable(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Self::Timeout,
            s if s.is_server_error() => Self::Api {
                status: s.as_u16(),
                message,
            },
            s => Self::InvalidRequest {
                status: s.as_u16(),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else if e.is_builder() {
            Self::Configuration(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status, e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

/// Errors raised while reading or writing JSONL record batches.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid record at {}:{line}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A keyword pattern in the dispatch table is not a valid regex.
    #[error("Invalid keyword pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    #[error("No question template for relation {0}")]
    MissingTemplate(String),

    #[error("No similar-examples file at {}", .0.display())]
    MissingExamples(PathBuf),

    #[error("Failed to load question templates from {}: {source}", .path.display())]
    Templates {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A component was asked to do something its configuration cannot support.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
