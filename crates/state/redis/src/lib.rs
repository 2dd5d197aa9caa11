pub mod config;
pub mod lock;
pub mod scripts;
pub mod store;

pub use config::RedisConfig;
pub use lock::{RedisDistributedLock, RedisLockGuard};
pub use store::RedisStateStore;
