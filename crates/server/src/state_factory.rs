use std::sync::Arc;

use msgbridge_state::lock::DistributedLock;
use msgbridge_state::store::StateStore;
use msgbridge_state_memory::{MemoryDistributedLock, MemoryStateStore};
use msgbridge_state_redis::{RedisConfig, RedisDistributedLock, RedisStateStore};

use crate::config::BackendChoice;
use crate::error::ServerError;

/// A state store and distributed lock pair.
pub type StatePair = (Arc<dyn StateStore>, Arc<dyn DistributedLock>);

/// Construct the [`StatePair`] named by `config.state_backend`.
///
/// # Errors
/// Returns [`ServerError::Config`] for an unknown backend or a connection
/// failure.
pub fn create_state(config: &BackendChoice) -> Result<StatePair, ServerError> {
    match config.state_backend.as_str() {
        "memory" => Ok((Arc::new(MemoryStateStore::new()), Arc::new(MemoryDistributedLock::new()))),
        "redis" => {
            let url = config
                .state_url
                .as_deref()
                .ok_or_else(|| ServerError::Config("redis state backend requires KV_HOST".into()))?;
            let redis_config = RedisConfig::new(url);
            let store = Arc::new(
                RedisStateStore::new(&redis_config).map_err(|e| ServerError::Config(format!("redis store: {e}")))?,
            );
            let lock = Arc::new(
                RedisDistributedLock::new(&redis_config)
                    .map_err(|e| ServerError::Config(format!("redis lock: {e}")))?,
            );
            Ok((store, lock))
        }
        other => Err(ServerError::Config(format!("unsupported state backend: {other}"))),
    }
}
