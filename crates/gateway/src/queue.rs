use async_trait::async_trait;
use chrono::{DateTime, Utc};
use msgbridge_core::MediaAttachment;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A job to drive one inbound message through the conversation backend and
/// back out through the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMessageJob {
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
    pub request_log_id: String,
    #[serde(default)]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// A channel number crossing its alert threshold, to be delivered to the
/// configured webhook out of the hot dispatch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAlertJob {
    pub number: String,
    pub load_fraction: f64,
}

/// Discriminated job envelope. One generic `enqueue` operation models the
/// source's `.delay()` task dispatch; the worker decodes by discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    ProcessMessage(ProcessMessageJob),
    SendAlert(SendAlertJob),
}

/// Priority lane a job is enqueued onto, mirroring the `high`/`default`/`low`
/// queues of the work broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Default,
    Low,
}

/// Capability to hand a job to asynchronous processing without the caller
/// blocking on or caring about how it eventually runs.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue `job` onto `priority`'s lane. Returns once the job is
    /// durably queued, not once it has run.
    async fn enqueue(&self, priority: Priority, job: Job) -> Result<(), QueueError>;
}

/// Error raised when a job cannot be queued (broker unreachable, lane full).
#[derive(Debug, thiserror::Error)]
#[error("failed to enqueue job: {0}")]
pub struct QueueError(pub String);

/// In-process [`WorkQueue`] backed by one `mpsc` channel per priority lane.
///
/// Intended for single-process deployments and tests; a durable broker
/// (e.g. Redis streams, SQS) would implement the same trait.
pub struct InMemoryWorkQueue {
    high: mpsc::Sender<Job>,
    default: mpsc::Sender<Job>,
    low: mpsc::Sender<Job>,
}

/// The receiving end of an [`InMemoryWorkQueue`], handed to the worker pool.
pub struct WorkQueueReceivers {
    pub high: mpsc::Receiver<Job>,
    pub default: mpsc::Receiver<Job>,
    pub low: mpsc::Receiver<Job>,
}

impl InMemoryWorkQueue {
    /// Create a queue with the given per-lane channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, WorkQueueReceivers) {
        let (high_tx, high_rx) = mpsc::channel(capacity);
        let (default_tx, default_rx) = mpsc::channel(capacity);
        let (low_tx, low_rx) = mpsc::channel(capacity);
        (
            Self { high: high_tx, default: default_tx, low: low_tx },
            WorkQueueReceivers { high: high_rx, default: default_rx, low: low_rx },
        )
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, priority: Priority, job: Job) -> Result<(), QueueError> {
        let sender = match priority {
            Priority::High => &self.high,
            Priority::Default => &self.default,
            Priority::Low => &self.low,
        };
        sender.send(job).await.map_err(|e| QueueError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::ProcessMessage(ProcessMessageJob {
            message_id: "SM123".into(),
            sender: "+15551234567".into(),
            recipient: "+15557654321".into(),
            body: "hello".into(),
            media: vec![],
            request_log_id: "req-1".into(),
            attempt: 0,
            enqueued_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn enqueued_job_is_received_on_its_lane() {
        let (queue, mut rx) = InMemoryWorkQueue::new(8);
        queue.enqueue(Priority::High, sample_job()).await.unwrap();

        let received = rx.high.recv().await.unwrap();
        match received {
            Job::ProcessMessage(job) => assert_eq!(job.message_id, "SM123"),
            Job::SendAlert(_) => panic!("unexpected alert job"),
        }
        assert!(rx.default.try_recv().is_err());
    }
}
