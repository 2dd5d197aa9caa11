use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`crate::store::StateStore`] or
/// [`crate::lock::DistributedLock`] implementation.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state backend connection error: {0}")]
    Connection(String),

    #[error("state backend error: {0}")]
    Backend(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("lock is no longer held by this owner: {0}")]
    LockExpired(String),

    #[error("value failed schema validation: {0}")]
    InvalidData(String),
}
