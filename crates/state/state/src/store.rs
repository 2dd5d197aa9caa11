use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};

/// Result of a compare-and-swap operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The swap succeeded; the new version is now stored.
    Ok,
    /// The swap failed because the current version didn't match.
    Conflict {
        current_value: Option<String>,
        current_version: u64,
    },
}

/// Trait for the shared key-value store backing counters, flags, locks, and
/// sequence state.
///
/// Implementations must be `Send + Sync` and safe for concurrent access from
/// many async tasks.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Set `key` to `value` only if it does not already exist. Returns `true`
    /// if the key was newly set, `false` if it already existed (and was left
    /// untouched). Used for idempotency flags and the first-writer-wins
    /// round-robin cursor.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError>;

    /// Get the current value for a key, or `None` if missing or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;

    /// Set a value unconditionally, with an optional TTL, bumping its version.
    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Atomically increment a counter by `delta`, creating it at zero first if
    /// absent, applying `ttl` on each call (so a TTL set at bucket creation is
    /// not lost on the first increment). Returns the new value.
    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError>;

    /// Read the current version of a key, defaulting to 0 if absent. Used to
    /// seed a compare-and-swap loop.
    async fn current_version(&self, key: &StateKey) -> Result<u64, StateError>;

    /// Compare-and-swap: write `new_value` only if the stored version still
    /// equals `expected_version`.
    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError>;

    /// Scan all `(id, value)` pairs currently stored under `kind`.
    ///
    /// May be expensive; used only by the periodic `cleanupExpired` sweep.
    async fn scan_keys_by_kind(&self, kind: KeyKind) -> Result<Vec<(String, String)>, StateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_dyn_store(_: &dyn StateStore) {}
}
