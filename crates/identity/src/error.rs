use thiserror::Error;

/// Errors surfaced by the identity store adapter.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("authentication with the identity authority failed: {0}")]
    AuthFailed(String),

    #[error("identity record not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("identity authority returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}
