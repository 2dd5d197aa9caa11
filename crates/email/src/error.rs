use thiserror::Error;

/// Errors surfaced by the e-mail provider adapter.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("e-mail provider returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EmailError {
    /// Whether the caller should retry the send.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Rejected { status, .. } => matches!(*status, 500 | 502 | 503 | 504),
            Self::InvalidAddress(_) | Self::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EmailError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(EmailError::Connection("refused".to_owned()).is_retryable());
        assert!(EmailError::Rejected { status: 503, body: String::new() }.is_retryable());
    }

    #[test]
    fn non_retryable_errors() {
        assert!(!EmailError::InvalidAddress("not-an-email".to_owned()).is_retryable());
        assert!(!EmailError::Rejected { status: 400, body: String::new() }.is_retryable());
    }
}
