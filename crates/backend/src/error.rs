use thiserror::Error;

/// Errors surfaced by the conversational AI backend adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("backend returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Rejected { status, .. } => matches!(*status, 500 | 502 | 503 | 504),
            Self::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(BackendError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(BackendError::Rejected { status: 502, body: String::new() }.is_retryable());
    }

    #[test]
    fn non_retryable_errors() {
        assert!(!BackendError::Rejected { status: 400, body: String::new() }.is_retryable());
        assert!(!BackendError::Serialization("bad json".to_owned()).is_retryable());
    }
}
