use std::sync::Arc;

use msgbridge_gateway::{Job, Worker, WorkQueueReceivers};
use tokio::sync::Semaphore;

/// Per-priority-lane concurrency limits, mirroring the broker's fixed
/// worker-pool-per-queue sizing.
#[derive(Debug, Clone, Copy)]
pub struct PoolConcurrency {
    pub high: usize,
    pub default: usize,
    pub low: usize,
}

impl Default for PoolConcurrency {
    fn default() -> Self {
        Self { high: 8, default: 4, low: 2 }
    }
}

/// Spawn one draining task per priority lane, each bounding its own
/// in-flight job count with a semaphore so a burst on one lane cannot
/// starve the others.
pub fn spawn(worker: Arc<Worker>, receivers: WorkQueueReceivers, concurrency: PoolConcurrency) {
    spawn_lane("high", worker.clone(), receivers.high, concurrency.high);
    spawn_lane("default", worker.clone(), receivers.default, concurrency.default);
    spawn_lane("low", worker, receivers.low, concurrency.low);
}

fn spawn_lane(name: &'static str, worker: Arc<Worker>, mut rx: tokio::sync::mpsc::Receiver<Job>, max_concurrent: usize) {
    tokio::spawn(async move {
        let permits = Arc::new(Semaphore::new(max_concurrent));
        while let Some(job) = rx.recv().await {
            let permit = permits.clone().acquire_owned().await.expect("semaphore never closed");
            let worker = worker.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match job {
                    Job::ProcessMessage(job) => {
                        if let Err(e) = worker.process_with_retries(job).await {
                            tracing::error!(lane = name, error = %e, "job failed after retries");
                        }
                    }
                    Job::SendAlert(alert) => {
                        tracing::warn!(
                            lane = name,
                            number = %alert.number,
                            load_fraction = alert.load_fraction,
                            "channel number crossed alert threshold"
                        );
                    }
                }
            });
        }
    });
}
