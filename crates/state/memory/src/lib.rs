//! In-memory [`StateStore`] and [`DistributedLock`] implementations.
//!
//! Intended for unit tests and single-process deployments where durability
//! across restarts is not required. Expiry is enforced lazily on read: an
//! entry past its deadline is treated as absent and lazily removed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use msgbridge_state::error::StateError;
use msgbridge_state::key::{KeyKind, StateKey};
use msgbridge_state::lock::{DistributedLock, LockGuard};
use msgbridge_state::store::{CasResult, StateStore};

struct Entry {
    value: String,
    version: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// An in-process [`StateStore`] backed by a [`DashMap`].
#[derive(Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let canonical = key.canonical();
        let mut inserted = false;
        self.entries
            .entry(canonical)
            .and_modify(|e| {
                if e.is_expired() {
                    *e = Entry {
                        value: value.to_owned(),
                        version: 1,
                        expires_at: ttl.map(|d| Instant::now() + d),
                    };
                    inserted = true;
                }
            })
            .or_insert_with(|| {
                inserted = true;
                Entry {
                    value: value.to_owned(),
                    version: 1,
                    expires_at: ttl.map(|d| Instant::now() + d),
                }
            });
        Ok(inserted)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let canonical = key.canonical();
        match self.entries.get(&canonical) {
            Some(e) if !e.is_expired() => Ok(Some(e.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let canonical = key.canonical();
        let next_version = self
            .entries
            .get(&canonical)
            .filter(|e| !e.is_expired())
            .map_or(1, |e| e.version + 1);
        self.entries.insert(
            canonical,
            Entry {
                value: value.to_owned(),
                version: next_version,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        Ok(self.entries.remove(&key.canonical()).is_some())
    }

    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError> {
        let canonical = key.canonical();
        let mut new_value = delta;
        self.entries
            .entry(canonical)
            .and_modify(|e| {
                if e.is_expired() {
                    e.value = delta.to_string();
                    e.version = 1;
                } else {
                    let current: i64 = e.value.parse().unwrap_or(0);
                    new_value = current + delta;
                    e.value = new_value.to_string();
                    e.version += 1;
                }
                e.expires_at = ttl.map(|d| Instant::now() + d);
            })
            .or_insert_with(|| Entry {
                value: delta.to_string(),
                version: 1,
                expires_at: ttl.map(|d| Instant::now() + d),
            });
        Ok(new_value)
    }

    async fn current_version(&self, key: &StateKey) -> Result<u64, StateError> {
        let canonical = key.canonical();
        Ok(self
            .entries
            .get(&canonical)
            .filter(|e| !e.is_expired())
            .map_or(0, |e| e.version))
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let canonical = key.canonical();
        let mut result = CasResult::Ok;
        self.entries
            .entry(canonical)
            .and_modify(|e| {
                let current_version = if e.is_expired() { 0 } else { e.version };
                if current_version == expected_version {
                    e.value = new_value.to_owned();
                    e.version = current_version + 1;
                    e.expires_at = ttl.map(|d| Instant::now() + d);
                } else {
                    result = CasResult::Conflict {
                        current_value: if e.is_expired() { None } else { Some(e.value.clone()) },
                        current_version,
                    };
                }
            })
            .or_insert_with(|| {
                if expected_version == 0 {
                    Entry {
                        value: new_value.to_owned(),
                        version: 1,
                        expires_at: ttl.map(|d| Instant::now() + d),
                    }
                } else {
                    result = CasResult::Conflict {
                        current_value: None,
                        current_version: 0,
                    };
                    Entry {
                        value: String::new(),
                        version: 0,
                        expires_at: Some(Instant::now()),
                    }
                }
            });
        Ok(result)
    }

    async fn scan_keys_by_kind(&self, kind: KeyKind) -> Result<Vec<(String, String)>, StateError> {
        let prefix = format!("{}:", kind.as_str());
        let mut out = Vec::new();
        for item in &self.entries {
            if item.is_expired() {
                continue;
            }
            if let Some(id) = item.key().strip_prefix(&prefix) {
                out.push((id.to_owned(), item.value.clone()));
            }
        }
        Ok(out)
    }
}

struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// An in-process [`DistributedLock`] backed by a [`DashMap`] of owner tokens.
///
/// Cheaply [`Clone`]: the underlying table is reference-counted, so clones
/// (and the guards handed out by `try_acquire`) all observe the same locks.
#[derive(Clone, Default)]
pub struct MemoryDistributedLock {
    locks: Arc<DashMap<String, LockEntry>>,
}

impl MemoryDistributedLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[async_trait]
impl DistributedLock for MemoryDistributedLock {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, StateError> {
        let owner = uuid::Uuid::new_v4().to_string();
        let expires_at = Instant::now() + ttl;

        let mut acquired = false;
        self.locks
            .entry(name.to_owned())
            .and_modify(|e| {
                if Instant::now() >= e.expires_at {
                    e.owner = owner.clone();
                    e.expires_at = expires_at;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                LockEntry { owner: owner.clone(), expires_at }
            });

        if acquired {
            Ok(Some(Box::new(MemoryLockGuard {
                locks: self.locks.clone(),
                name: name.to_owned(),
                owner,
            })))
        } else {
            Ok(None)
        }
    }

    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, StateError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(guard) = self.try_acquire(name, ttl).await? {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(StateError::Timeout(timeout));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(LOCK_POLL_INTERVAL.min(remaining)).await;
        }
    }
}

struct MemoryLockGuard {
    locks: Arc<DashMap<String, LockEntry>>,
    name: String,
    owner: String,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    async fn extend(&self, duration: Duration) -> Result<(), StateError> {
        let mut extended = false;
        if let Some(mut entry) = self.locks.get_mut(&self.name) {
            if entry.owner == self.owner {
                entry.expires_at = Instant::now() + duration;
                extended = true;
            }
        }
        if extended {
            Ok(())
        } else {
            Err(StateError::LockExpired(format!(
                "lock {} is no longer held by this owner",
                self.name
            )))
        }
    }

    async fn release(self: Box<Self>) -> Result<(), StateError> {
        let mut released = false;
        if let Some(entry) = self.locks.get(&self.name) {
            if entry.owner == self.owner {
                released = true;
            }
        }
        if released {
            self.locks.remove(&self.name);
            Ok(())
        } else {
            Err(StateError::LockExpired(format!(
                "lock {} was not held by this owner at release time",
                self.name
            )))
        }
    }

    async fn is_held(&self) -> Result<bool, StateError> {
        Ok(self
            .locks
            .get(&self.name)
            .is_some_and(|e| e.owner == self.owner && Instant::now() < e.expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_conformance() {
        let store = MemoryStateStore::new();
        msgbridge_state::testing::run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn lock_conformance() {
        let lock = MemoryDistributedLock::default();
        msgbridge_state::testing::run_lock_conformance_tests(&lock)
            .await
            .expect("conformance tests should pass");
    }
}
