//! Worker pool pulling deliveries from an [`ExecutionQueue`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::queue::ExecutionQueue;
use crate::repository::WorkflowRepository;

use super::consumer::{ConsumeOutcome, WorkflowConsumer};
use super::state_store::ExecutionStateStore;

/// Counts of delivery outcomes across all workers.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub processed: AtomicU64,
    pub skipped: AtomicU64,
    pub faulted: AtomicU64,
    pub dead_lettered: AtomicU64,
}

impl WorkerStats {
    fn record(&self, outcome: &ConsumeOutcome) {
        let counter = match outcome {
            ConsumeOutcome::Processed => &self.processed,
            ConsumeOutcome::Skipped | ConsumeOutcome::Missing => &self.skipped,
            ConsumeOutcome::Faulted { .. } => &self.faulted,
            ConsumeOutcome::DeadLettered => &self.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
            + self.skipped.load(Ordering::Relaxed)
            + self.faulted.load(Ordering::Relaxed)
            + self.dead_lettered.load(Ordering::Relaxed)
    }
}

/// N independent tasks consuming the same queue until cancelled.
///
/// Worker `i` prefers partition `i % partitions` and falls back to any
/// partition when its own is empty. Mutual exclusion per execution comes
/// from the coordinator lock, not from partition ownership.
pub struct WorkerPool<R, S, Q>
where
    R: WorkflowRepository + 'static,
    S: ExecutionStateStore + 'static,
    Q: ExecutionQueue + 'static,
{
    consumer: Arc<WorkflowConsumer<R, S, Q>>,
    concurrency: usize,
    poll_interval: Duration,
    cancel: CancellationToken,
    stats: Arc<WorkerStats>,
}

impl<R, S, Q> WorkerPool<R, S, Q>
where
    R: WorkflowRepository + 'static,
    S: ExecutionStateStore + 'static,
    Q: ExecutionQueue + 'static,
{
    pub fn new(
        consumer: Arc<WorkflowConsumer<R, S, Q>>,
        concurrency: usize,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            concurrency: concurrency.max(1),
            poll_interval,
            cancel,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Run all workers until the cancellation token fires.
    ///
    /// A delivery already being handled is finished before its worker exits.
    pub async fn run(self) -> Arc<WorkerStats> {
        tracing::info!(concurrency = self.concurrency, "starting worker pool");

        let mut workers = JoinSet::new();
        for index in 0..self.concurrency {
            let consumer = self.consumer.clone();
            let cancel = self.cancel.clone();
            let stats = self.stats.clone();
            let poll_interval = self.poll_interval;
            workers.spawn(async move {
                worker_loop(index, consumer, cancel, stats, poll_interval).await;
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }

        tracing::info!(handled = self.stats.total(), "worker pool stopped");
        self.stats
    }
}

async fn worker_loop<R, S, Q>(
    index: usize,
    consumer: Arc<WorkflowConsumer<R, S, Q>>,
    cancel: CancellationToken,
    stats: Arc<WorkerStats>,
    poll_interval: Duration,
) where
    R: WorkflowRepository,
    S: ExecutionStateStore,
    Q: ExecutionQueue,
{
    let queue = consumer.queue().clone();
    let preferred = (index as u32) % queue.partitions().max(1);
    tracing::debug!(worker = index, partition = preferred, "worker started");

    while !cancel.is_cancelled() {
        let next = match queue.next_delivery(Some(preferred)).await {
            Ok(None) => queue.next_delivery(None).await,
            other => other,
        };

        match next {
            Ok(Some(delivery)) => {
                let outcome = consumer.handle(&delivery).await;
                tracing::debug!(worker = index, outcome = ?outcome, "delivery handled");
                stats.record(&outcome);
            }
            Ok(None) => idle(&cancel, poll_interval).await,
            Err(e) => {
                tracing::error!(worker = index, error = %e, "failed to poll queue");
                idle(&cancel, poll_interval).await;
            }
        }
    }

    tracing::debug!(worker = index, "worker stopped");
}

async fn idle(cancel: &CancellationToken, poll_interval: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(poll_interval) => {}
    }
}
