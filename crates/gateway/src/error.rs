use thiserror::Error;

use msgbridge_audit::AuditError;
use msgbridge_backend::BackendError;
use msgbridge_email::EmailError;
use msgbridge_identity::IdentityError;
use msgbridge_state::error::StateError;
use msgbridge_transport::TransportError;

/// The gateway's unified error type.
///
/// Every variant maps to one row of the error-handling table: an HTTP
/// status, a stable `error_code`, and a recovery hint. [`GatewayError::code`]
/// and [`GatewayError::status`] are the single source of truth for that
/// mapping so the HTTP layer never has to duplicate it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("sequence violation: {0}")]
    SequenceViolation(String),

    #[error("sequence expired")]
    SequenceExpired,

    #[error("sequence not found")]
    SequenceNotFound,

    #[error("data mismatch: {0}")]
    DataMismatch(String),

    #[error("data not found: {0}")]
    DataNotFound(String),

    #[error("could not acquire lock in time")]
    LockAcquisitionFailed,

    #[error("concurrent modification exceeded retry budget")]
    ConcurrentModification,

    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    #[error("operation timed out")]
    Timeout,

    #[error("invalid otp")]
    InvalidOtp,

    #[error("otp expired")]
    Expired,

    #[error("maximum otp attempts exceeded")]
    MaxAttemptsExceeded,

    #[error("no channel numbers available")]
    NoNumbersAvailable,

    #[error("identity authority error: {0}")]
    Identity(#[from] IdentityError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("conversation backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("email provider error: {0}")]
    Email(#[from] EmailError),

    #[error("audit store error: {0}")]
    Audit(#[from] AuditError),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The stable `error_code` string surfaced in the failure envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPhone(_) => "INVALID_PHONE",
            Self::InvalidEmail(_) => "INVALID_EMAIL",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::SequenceViolation(_) => "SEQUENCE_VIOLATION",
            Self::SequenceExpired => "SEQUENCE_EXPIRED",
            Self::SequenceNotFound => "SEQUENCE_NOT_FOUND",
            Self::DataMismatch(_) => "DATA_MISMATCH",
            Self::DataNotFound(_) => "DATA_NOT_FOUND",
            Self::LockAcquisitionFailed => "LOCK_ACQUISITION_FAILED",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::RateLimit { .. } => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::InvalidOtp => "INVALID_OTP",
            Self::Expired => "EXPIRED",
            Self::MaxAttemptsExceeded => "MAX_ATTEMPTS_EXCEEDED",
            Self::NoNumbersAvailable => "NO_NUMBERS_AVAILABLE",
            Self::Identity(_) => "IDENTITY_ERROR",
            Self::State(_) => "KV_ERROR",
            Self::Backend(_) => "BACKEND_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Email(_) => "EMAIL_ERROR",
            Self::Audit(_) => "SYSTEM_ERROR",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Internal(_) => "SYSTEM_ERROR",
        }
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidPhone(_)
            | Self::InvalidEmail(_)
            | Self::InvalidData(_)
            | Self::SequenceViolation(_)
            | Self::SequenceExpired
            | Self::SequenceNotFound
            | Self::InvalidOtp
            | Self::Expired
            | Self::MaxAttemptsExceeded => 400,
            Self::DataMismatch(_) | Self::DataNotFound(_) => 404,
            Self::LockAcquisitionFailed => 423,
            Self::ConcurrentModification => 409,
            Self::RateLimit { .. } => 429,
            Self::Timeout => 504,
            Self::NoNumbersAvailable => 503,
            Self::InvalidSignature => 403,
            Self::Identity(e) if e.is_retryable() => 503,
            Self::Identity(_) => 502,
            Self::Backend(e) if e.is_retryable() => 503,
            Self::Backend(_) => 502,
            Self::Transport(e) if e.is_retryable() => 503,
            Self::Transport(_) => 502,
            Self::Email(e) if e.is_retryable() => 503,
            Self::Email(_) => 502,
            Self::State(_) | Self::Audit(_) | Self::Internal(_) => 500,
        }
    }

    /// Seconds the client should wait before retrying, if applicable.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after } => Some(*retry_after),
            Self::Timeout => Some(30),
            Self::LockAcquisitionFailed => Some(1),
            _ => None,
        }
    }
}

trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for IdentityError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
            || matches!(self, Self::Rejected { status, .. } if matches!(*status, 500 | 502 | 503 | 504))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_table() {
        assert_eq!(GatewayError::InvalidPhone("x".into()).status(), 400);
        assert_eq!(GatewayError::SequenceViolation("x".into()).status(), 400);
        assert_eq!(GatewayError::LockAcquisitionFailed.status(), 423);
        assert_eq!(GatewayError::ConcurrentModification.status(), 409);
        assert_eq!(GatewayError::RateLimit { retry_after: 5 }.status(), 429);
        assert_eq!(GatewayError::Timeout.status(), 504);
        assert_eq!(GatewayError::NoNumbersAvailable.status(), 503);
    }

    #[test]
    fn codes_match_error_table() {
        assert_eq!(GatewayError::InvalidOtp.code(), "INVALID_OTP");
        assert_eq!(GatewayError::Expired.code(), "EXPIRED");
        assert_eq!(GatewayError::MaxAttemptsExceeded.code(), "MAX_ATTEMPTS_EXCEEDED");
    }
}
