use async_trait::async_trait;

use crate::error::AuditError;
use crate::record::{AuditEntry, AuditPage, AuditQuery};

/// Trait for append-only audit storage backends.
///
/// Implementations must be `Send + Sync` to be shared across async tasks.
/// The audit database is append-only from the gateway's perspective; only
/// `cleanup_expired` removes rows, and only ones past their retention
/// window.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist an audit record.
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Retrieve an audit record by its unique ID.
    async fn get_by_id(&self, id: &str) -> Result<Option<AuditEntry>, AuditError>;

    /// Query audit records with filters and pagination.
    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError>;

    /// Remove expired records. Returns the number of records deleted.
    async fn cleanup_expired(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<u64, AuditError>;
}
