use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use msgbridge_audit::{AuditEntry, AuditStore, NumberLoadStatsRow};
use msgbridge_core::ChannelNumber;
use msgbridge_state::key::{KeyKind, StateKey};
use msgbridge_state::store::StateStore;

use crate::error::GatewayError;
use crate::queue::{Job, Priority, SendAlertJob, WorkQueue};

const BUCKET_SECONDS: u64 = 1;
const COOLDOWN_SECONDS: u64 = 300;
const STATS_CROSSING_FRACTION: f64 = 0.8;

/// Snapshot of every configured number's current load, as returned by
/// `/stats/load`.
#[derive(Debug, Clone)]
pub struct LoadSnapshot {
    pub number: ChannelNumber,
    pub message_count: i64,
    pub load_fraction: f64,
}

/// Picks an outbound channel number under a hard per-number messages-per-
/// second ceiling, alerting when a number crosses a configured threshold.
///
/// Selection: round-robins across `Numbers` under normal load; once any
/// number's current-bucket load exceeds `high_threshold`, switches to
/// picking the least-loaded number until load subsides.
pub struct LoadBalancer {
    store: Arc<dyn StateStore>,
    audit: Arc<dyn AuditStore>,
    queue: Option<Arc<dyn WorkQueue>>,
    numbers: Vec<ChannelNumber>,
    max_mps: u64,
    high_threshold: f64,
    alert_threshold: f64,
    bucket_seconds: u64,
}

impl LoadBalancer {
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        audit: Arc<dyn AuditStore>,
        numbers: Vec<ChannelNumber>,
        max_mps: u64,
        high_threshold: f64,
        alert_threshold: f64,
    ) -> Self {
        Self { store, audit, queue: None, numbers, max_mps, high_threshold, alert_threshold, bucket_seconds: BUCKET_SECONDS }
    }

    /// Route alert notifications through `queue` instead of only logging
    /// them, so a slow webhook notifier never blocks the dispatch path.
    #[must_use]
    pub fn with_alert_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Override the load-counting bucket width (`STATS_WINDOW`); defaults
    /// to [`BUCKET_SECONDS`].
    #[must_use]
    pub fn with_bucket_seconds(mut self, bucket_seconds: u64) -> Self {
        self.bucket_seconds = bucket_seconds.max(1);
        self
    }

    fn now_secs() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }

    fn bucket_key(number: &ChannelNumber, bucket: u64) -> StateKey {
        StateKey::new(KeyKind::MsgCount, format!("{}:{bucket}", number.as_str()))
    }

    async fn current_bucket_count(&self, number: &ChannelNumber) -> Result<i64, GatewayError> {
        let bucket = Self::now_secs() / self.bucket_seconds;
        let value = self.store.get(&Self::bucket_key(number, bucket)).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Load fraction for every configured number, in configured order.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoNumbersAvailable`] if no numbers are configured.
    pub async fn loads(&self) -> Result<Vec<LoadSnapshot>, GatewayError> {
        if self.numbers.is_empty() {
            return Err(GatewayError::NoNumbersAvailable);
        }
        let mut snapshots = Vec::with_capacity(self.numbers.len());
        for number in &self.numbers {
            let count = self.current_bucket_count(number).await?;
            #[allow(clippy::cast_precision_loss)]
            let fraction = count as f64 / self.max_mps as f64;
            snapshots.push(LoadSnapshot { number: number.clone(), message_count: count, load_fraction: fraction });
        }
        Ok(snapshots)
    }

    /// Select the outbound number for the next dispatch.
    pub async fn pick(&self) -> Result<ChannelNumber, GatewayError> {
        if self.numbers.is_empty() {
            return Err(GatewayError::NoNumbersAvailable);
        }

        match self.try_pick().await {
            Ok(number) => Ok(number),
            Err(_) => {
                let idx = (Self::now_secs() as usize) % self.numbers.len();
                Ok(self.numbers[idx].clone())
            }
        }
    }

    async fn try_pick(&self) -> Result<ChannelNumber, GatewayError> {
        let loads = self.loads().await?;
        let high = loads.iter().any(|l| l.load_fraction > self.high_threshold);

        if high {
            let least = loads
                .iter()
                .min_by(|a, b| a.load_fraction.partial_cmp(&b.load_fraction).unwrap_or(std::cmp::Ordering::Equal))
                .expect("loads is non-empty");
            return Ok(least.number.clone());
        }

        let cursor_key = StateKey::lb_current_index();
        let current = self.store.increment(&cursor_key, 1, None).await? - 1;
        #[allow(clippy::cast_sign_loss)]
        let idx = (current.max(0) as usize) % self.numbers.len();
        Ok(self.numbers[idx].clone())
    }

    /// Record one dispatch against `number`'s current bucket, audit-logging
    /// a `NumberLoadStats` row and raising a cooldown-gated alert as the
    /// load crosses its thresholds.
    pub async fn record_dispatch(&self, number: &ChannelNumber) -> Result<(), GatewayError> {
        let bucket = Self::now_secs() / self.bucket_seconds;
        let key = Self::bucket_key(number, bucket);
        let count = self.store.increment(&key, 1, Some(Duration::from_secs(self.bucket_seconds * 2))).await?;

        #[allow(clippy::cast_precision_loss)]
        let fraction = count as f64 / self.max_mps as f64;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        if fraction >= STATS_CROSSING_FRACTION {
            self.audit
                .record(AuditEntry::NumberLoadStats(NumberLoadStatsRow {
                    id: uuid::Uuid::new_v4().to_string(),
                    number: number.as_str().to_owned(),
                    load_fraction: fraction,
                    message_count: count,
                    bucket: bucket as i64,
                    created_at: Utc::now(),
                }))
                .await?;
        }

        if fraction >= self.alert_threshold {
            self.maybe_alert(number, fraction).await?;
        }

        Ok(())
    }

    async fn maybe_alert(&self, number: &ChannelNumber, fraction: f64) -> Result<(), GatewayError> {
        let cooldown_key = StateKey::new(KeyKind::LoadBalancerLastAlert, number.as_str());
        let already_cooling_down = self.store.get(&cooldown_key).await?.is_some();
        if already_cooling_down {
            return Ok(());
        }

        self.store.set(&cooldown_key, "1", Some(Duration::from_secs(COOLDOWN_SECONDS))).await?;
        tracing::warn!(number = number.as_str(), load_fraction = fraction, "channel number load crossed alert threshold");

        if let Some(queue) = &self.queue {
            let job = Job::SendAlert(SendAlertJob { number: number.as_str().to_owned(), load_fraction: fraction });
            if let Err(e) = queue.enqueue(Priority::Low, job).await {
                tracing::warn!(error = %e, "failed to enqueue alert notification, logged only");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgbridge_audit_memory::MemoryAuditStore;
    use msgbridge_state_memory::MemoryStateStore;

    fn balancer(numbers: Vec<&str>, max_mps: u64) -> LoadBalancer {
        LoadBalancer::new(
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryAuditStore::new()),
            numbers.into_iter().map(ChannelNumber::new).collect(),
            max_mps,
            0.7,
            0.9,
        )
    }

    #[tokio::test]
    async fn round_robin_under_low_load() {
        let lb = balancer(vec!["+A", "+B", "+C"], 10);
        let mut picks = Vec::new();
        for _ in 0..5 {
            picks.push(lb.pick().await.unwrap().as_str().to_owned());
        }
        assert_eq!(picks, vec!["+A", "+B", "+C", "+A", "+B"]);
    }

    #[tokio::test]
    async fn least_loaded_under_high_load() {
        let lb = balancer(vec!["+A", "+B", "+C"], 10);
        for _ in 0..8 {
            lb.record_dispatch(&ChannelNumber::new("+A")).await.unwrap();
        }
        for _ in 0..2 {
            lb.record_dispatch(&ChannelNumber::new("+B")).await.unwrap();
        }
        for _ in 0..9 {
            lb.record_dispatch(&ChannelNumber::new("+C")).await.unwrap();
        }

        let picked = lb.pick().await.unwrap();
        assert_eq!(picked.as_str(), "+B");
    }

    #[tokio::test]
    async fn empty_numbers_fails() {
        let lb = balancer(vec![], 10);
        assert!(matches!(lb.pick().await, Err(GatewayError::NoNumbersAvailable)));
    }

    #[tokio::test]
    async fn alert_cooldown_suppresses_repeat_alerts() {
        let lb = balancer(vec!["+A"], 10);
        for _ in 0..10 {
            lb.record_dispatch(&ChannelNumber::new("+A")).await.unwrap();
        }
        let cooldown_key = StateKey::new(KeyKind::LoadBalancerLastAlert, "+A");
        assert!(lb.store.get(&cooldown_key).await.unwrap().is_some());
    }
}
