use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use msgbridge_audit::store::AuditStore;

/// Spawn a background task that periodically deletes audit rows older than
/// `retention`.
///
/// Returns a `JoinHandle` that can be used to abort the task on shutdown.
pub fn spawn_cleanup_task(
    store: Arc<dyn AuditStore>,
    interval: Duration,
    retention: chrono::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await;

        loop {
            timer.tick().await;
            let cutoff = chrono::Utc::now() - retention;
            match store.cleanup_expired(cutoff).await {
                Ok(0) => {}
                Ok(n) => info!(removed = n, "audit cleanup removed expired records"),
                Err(e) => warn!(error = %e, "audit cleanup failed"),
            }
        }
    })
}
