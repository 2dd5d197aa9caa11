use std::time::Duration;

/// Configuration for a [`crate::RedisStateStore`] / [`crate::RedisDistributedLock`].
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379`.
    pub url: String,
    /// Key prefix, so multiple deployments can share one Redis instance.
    pub prefix: String,
    /// Maximum pool size.
    pub pool_size: usize,
    /// Timeout waiting for a pooled connection.
    pub connection_timeout: Duration,
}

impl RedisConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_owned(),
            prefix: "msgbridge".to_owned(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(5),
        }
    }
}
