use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use msgbridge_state::error::StateError;
use msgbridge_state::key::{KeyKind, StateKey};
use msgbridge_state::store::{CasResult, StateStore};

use crate::config::RateLimitRule;

const MAX_RETRIES: u32 = 3;

/// Outcome of a rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub retry_after: u64,
}

/// Per-rule, per-identifier rate limiter.
///
/// Sliding-log algorithm over a per-`(rule, identifier)` sorted set of
/// request timestamps, kept as a JSON-encoded, version-guarded value so any
/// [`StateStore`] backend supports it without a dedicated sorted-set
/// primitive: trim entries older than the window, count what's left, record
/// the current request, then compare-and-swap -- retrying on conflict the
/// same way [`crate::sequence::SequenceManager`] does.
pub struct RateLimiter {
    store: Arc<dyn StateStore>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Check and record one request against `rule` for `identifier`, keyed
    /// as `rate_limit:{rule_name}:{identifier}`.
    ///
    /// Limit exceeded iff the count of requests still inside the window
    /// *before* this one is recorded is greater than `rule.limit`.
    pub async fn check(
        &self,
        rule_name: &str,
        identifier: &str,
        rule: &RateLimitRule,
    ) -> Result<RateLimitResult, StateError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let window = rule.period.as_secs().max(1);
        let limit = rule.limit;
        let key = Self::bucket_key(rule_name, identifier);
        let cutoff = now.saturating_sub(window);

        for attempt in 1..=MAX_RETRIES {
            let version = self.store.current_version(&key).await?;
            let mut timestamps = match self.store.get(&key).await? {
                Some(raw) => serde_json::from_str::<Vec<u64>>(&raw).unwrap_or_default(),
                None => Vec::new(),
            };
            timestamps.retain(|&ts| ts > cutoff);

            let count = timestamps.len() as u64;
            let exceeded = count > limit;
            let oldest = timestamps.first().copied();

            timestamps.push(now);
            let serialized = serde_json::to_string(&timestamps)
                .map_err(|e| StateError::InvalidData(e.to_string()))?;

            let result = self.store.compare_and_swap(&key, version, &serialized, Some(Duration::from_secs(window))).await?;
            if matches!(result, CasResult::Conflict { .. }) {
                Self::backoff(attempt).await;
                continue;
            }

            let remaining = limit.saturating_sub(count);
            let retry_after = if exceeded {
                oldest.map_or(1, |ts| (ts + window).saturating_sub(now)).max(1)
            } else {
                window.saturating_sub(now.saturating_sub(cutoff))
            };

            return Ok(RateLimitResult { allowed: !exceeded, limit, remaining, retry_after });
        }

        Err(StateError::Backend(format!("rate limit check for {rule_name}:{identifier} lost the race {MAX_RETRIES} times")))
    }

    async fn backoff(attempt: u32) {
        tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
    }

    fn bucket_key(rule_name: &str, identifier: &str) -> StateKey {
        StateKey::new(KeyKind::RateLimit, format!("{rule_name}:{identifier}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitIdentifierType;
    use msgbridge_state_memory::MemoryStateStore;

    fn rule(limit: u64, period_secs: u64) -> RateLimitRule {
        RateLimitRule {
            limit,
            period: Duration::from_secs(period_secs),
            identifier_type: RateLimitIdentifierType::Ip,
        }
    }

    #[tokio::test]
    async fn allows_up_to_limit_plus_one_then_denies() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let limiter = RateLimiter::new(store);
        let rule = rule(3, 60);

        // ZCARD is read before this request's own ZADD, so `count > limit`
        // only trips once four requests (limit + 1) are already recorded.
        for _ in 0..4 {
            let result = limiter.check("check_phone", "1.2.3.4", &rule).await.unwrap();
            assert!(result.allowed);
        }
        let denied = limiter.check("check_phone", "1.2.3.4", &rule).await.unwrap();
        assert!(!denied.allowed);
        assert!(denied.retry_after >= 1);
    }

    #[tokio::test]
    async fn different_identifiers_have_independent_buckets() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let limiter = RateLimiter::new(store);
        let rule = rule(0, 60);

        assert!(limiter.check("check_phone", "a", &rule).await.unwrap().allowed);
        assert!(limiter.check("check_phone", "b", &rule).await.unwrap().allowed);
        assert!(!limiter.check("check_phone", "a", &rule).await.unwrap().allowed);
    }
}
