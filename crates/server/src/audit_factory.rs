use std::sync::Arc;

use msgbridge_audit::AuditStore;
use msgbridge_audit_memory::MemoryAuditStore;
use msgbridge_audit_postgres::{PostgresAuditConfig, PostgresAuditStore};

use crate::config::BackendChoice;
use crate::error::ServerError;

/// Construct the audit store named by `config.audit_backend`.
///
/// # Errors
/// Returns [`ServerError::Config`] for an unknown backend or a connection
/// failure.
pub async fn create_audit_store(config: &BackendChoice) -> Result<Arc<dyn AuditStore>, ServerError> {
    match config.audit_backend.as_str() {
        "memory" => Ok(Arc::new(MemoryAuditStore::new())),
        "postgres" => {
            let url = config
                .audit_url
                .as_deref()
                .ok_or_else(|| ServerError::Config("postgres audit backend requires AUDIT_URL".into()))?;
            let pg_config = PostgresAuditConfig::new(url);
            let store = PostgresAuditStore::new(&pg_config)
                .await
                .map_err(|e| ServerError::Config(format!("audit postgres: {e}")))?;
            Ok(Arc::new(store))
        }
        other => Err(ServerError::Config(format!("unsupported audit backend: {other}"))),
    }
}
