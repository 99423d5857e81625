//! Error types for tally-ai

use std::time::Duration;

use thiserror::Error;

/// Result type alias using tally-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP statuses the assistant API uses for transient conditions.
pub const TRANSIENT_STATUSES: &[u16] = &[429, 503, 504];

/// Errors that can occur when talking to the remote assistant
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API answered with a non-success status
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    /// The call did not complete within its timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a status error
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Status { status, .. } => TRANSIENT_STATUSES.contains(status),
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e
                        .status()
                        .is_some_and(|s| TRANSIENT_STATUSES.contains(&s.as_u16()))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_transient_statuses() {
        assert!(Error::status(429, "slow down").is_retryable());
        assert!(Error::status(503, "unavailable").is_retryable());
        assert!(Error::status(504, "gateway timeout").is_retryable());
    }

    #[test]
    fn test_not_retryable_client_errors() {
        assert!(!Error::status(400, "bad request").is_retryable());
        assert!(!Error::status(401, "unauthorized").is_retryable());
        assert!(!Error::status(500, "internal").is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        assert!(Error::Timeout(Duration::from_secs(30)).is_retryable());
    }

    #[test]
    fn test_not_retryable_non_http() {
        assert!(!Error::InvalidApiKey.is_retryable());
        assert!(!Error::UnexpectedResponse("no id".into()).is_retryable());
        assert!(!Error::InvalidConfig("empty base url".into()).is_retryable());
    }

    #[test]
    fn test_http_status() {
        assert_eq!(Error::status(429, "x").http_status(), Some(429));
        assert_eq!(Error::InvalidApiKey.http_status(), None);
    }

    #[test]
    fn test_display_includes_status() {
        let e = Error::status(503, "overloaded");
        assert_eq!(e.to_string(), "API error 503: overloaded");
    }
}
