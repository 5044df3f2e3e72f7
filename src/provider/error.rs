//! Provider failure classification

use reqwest::StatusCode;
use thiserror::Error;

/// Failure reported by a lookup adapter or a resource realizer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network trouble or throttling. Worth retrying.
    #[error("transient: {0}")]
    Transient(String),
    /// Not found, malformed identifiers, rejected request. Never retried.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Error from a single HTTP exchange with the provider API
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to send request: {0}")]
    Send(#[source] reqwest::Error),
    #[error("API request failed: {status}")]
    Status { status: StatusCode },
    #[error("failed to parse response JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

impl RequestError {
    /// Throttling, timeouts, server errors and connection problems can be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Send(_) => true,
            Self::Status { status } => {
                *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || status.is_server_error()
            }
            Self::Decode(_) => false,
        }
    }
}

impl From<RequestError> for ProviderError {
    fn from(err: RequestError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}
