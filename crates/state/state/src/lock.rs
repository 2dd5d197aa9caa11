use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;

/// A held distributed lock. Dropping without explicit release is allowed
/// (the lock expires after its TTL), but explicit release is preferred for
/// prompt cleanup.
#[async_trait]
pub trait LockGuard: Send + Sync {
    /// Extend the lock's TTL. Fails if another owner has since taken the lock.
    async fn extend(&self, duration: Duration) -> Result<(), StateError>;

    /// Explicitly release the lock. Fails if another owner has since taken it.
    async fn release(self: Box<Self>) -> Result<(), StateError>;

    /// Check whether the lock is still held by this guard's owner.
    async fn is_held(&self) -> Result<bool, StateError>;
}

/// Trait for acquiring distributed locks.
///
/// Implementations MUST use an owner token for release (e.g. `SET NX` with a
/// random value, released via compare-and-delete) rather than unconditional
/// deletion, so that a stale holder can never release a lock it no longer
/// owns after its TTL has expired and been reacquired by someone else.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to acquire a lock with the given name and TTL.
    /// Returns `None` if the lock is already held by another owner.
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, StateError>;

    /// Acquire a lock, polling until it becomes available or `timeout` elapses.
    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, StateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_dyn_lock_guard(_: &dyn LockGuard) {}
    fn _assert_dyn_distributed_lock(_: &dyn DistributedLock) {}
}
