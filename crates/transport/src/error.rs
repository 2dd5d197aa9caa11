use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The inbound request's signature did not match.
    #[error("signature verification failed")]
    InvalidSignature,

    /// The transport did not respond within the allowed duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or transport-level error occurred.
    #[error("connection error: {0}")]
    Connection(String),

    /// The transport rejected the request due to rate limiting.
    #[error("rate limited")]
    RateLimited,

    /// The transport returned a non-success status.
    #[error("transport returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TransportError {
    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::RateLimited
        ) || matches!(self, Self::Rejected { status, .. } if matches!(*status, 500 | 502 | 503 | 504))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(TransportError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(TransportError::Connection("reset".into()).is_retryable());
        assert!(TransportError::RateLimited.is_retryable());
        assert!(TransportError::Rejected { status: 503, body: String::new() }.is_retryable());
    }

    #[test]
    fn non_retryable_errors() {
        assert!(!TransportError::InvalidSignature.is_retryable());
        assert!(!TransportError::Rejected { status: 400, body: String::new() }.is_retryable());
        assert!(!TransportError::Serialization("x".into()).is_retryable());
    }
}
