//! In-memory partitioned queue.
//!
//! Claimed messages stay in an in-flight table until acknowledged. They are
//! only handed out again after an explicit [`InMemoryExecutionQueue::requeue_unacked`],
//! which stands in for a consumer-group rebalance.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use agentflow_core::queue::{Delivery, ExecutionQueue, QueueError, partition_for};
use agentflow_types::message::WorkflowMessage;

#[derive(Debug, Clone)]
struct Pending {
    seq: u64,
    partition: u32,
    delivery_count: u32,
    message: WorkflowMessage,
}

pub struct InMemoryExecutionQueue {
    partitions: u32,
    pending: DashMap<u32, VecDeque<Pending>>,
    in_flight: DashMap<String, Pending>,
    dead_letters: Mutex<Vec<WorkflowMessage>>,
    next_seq: AtomicU64,
}

impl InMemoryExecutionQueue {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            pending: DashMap::new(),
            in_flight: DashMap::new(),
            dead_letters: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Messages not yet claimed.
    pub fn pending_len(&self) -> usize {
        self.pending.iter().map(|q| q.value().len()).sum()
    }

    /// Claimed messages awaiting `ack`.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn dead_letters(&self) -> Vec<WorkflowMessage> {
        self.dead_letters
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Return every unacknowledged delivery to the front of its partition,
    /// preserving publish order. Returns how many were requeued.
    pub fn requeue_unacked(&self) -> usize {
        let receipts: Vec<String> = self.in_flight.iter().map(|e| e.key().clone()).collect();
        let mut reclaimed: Vec<Pending> = receipts
            .iter()
            .filter_map(|r| self.in_flight.remove(r).map(|(_, p)| p))
            .collect();
        reclaimed.sort_by_key(|p| std::cmp::Reverse(p.seq));

        let count = reclaimed.len();
        for pending in reclaimed {
            self.pending
                .entry(pending.partition)
                .or_default()
                .push_front(pending);
        }
        if count > 0 {
            tracing::info!(count, "requeued unacknowledged deliveries");
        }
        count
    }

    fn claim_from(&self, partition: u32) -> Option<Pending> {
        self.pending
            .get_mut(&partition)
            .and_then(|mut queue| queue.pop_front())
    }
}

impl Default for InMemoryExecutionQueue {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ExecutionQueue for InMemoryExecutionQueue {
    async fn enqueue(&self, message: &WorkflowMessage) -> Result<(), QueueError> {
        let partition = partition_for(&message.execution_id, self.partitions);
        let pending = Pending {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            partition,
            delivery_count: 0,
            message: message.clone(),
        };
        self.pending.entry(partition).or_default().push_back(pending);
        tracing::debug!(execution_id = %message.execution_id, partition, "enqueued workflow message");
        Ok(())
    }

    async fn dead_letter(&self, message: &WorkflowMessage) -> Result<(), QueueError> {
        self.dead_letters
            .lock()
            .map_err(|_| QueueError::Storage("dead-letter list poisoned".to_string()))?
            .push(message.clone());
        tracing::warn!(execution_id = %message.execution_id, "message dead-lettered");
        Ok(())
    }

    async fn next_delivery(&self, partition: Option<u32>) -> Result<Option<Delivery>, QueueError> {
        let claimed = match partition {
            Some(p) => self.claim_from(p),
            None => (0..self.partitions).find_map(|p| self.claim_from(p)),
        };
        let Some(mut pending) = claimed else {
            return Ok(None);
        };

        pending.delivery_count += 1;
        let receipt = format!("{}-{}", pending.seq, pending.delivery_count);
        let delivery = Delivery {
            receipt: receipt.clone(),
            partition: pending.partition,
            delivery_count: pending.delivery_count,
            message: pending.message.clone(),
        };
        self.in_flight.insert(receipt, pending);
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.in_flight
            .remove(&delivery.receipt)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownDelivery(delivery.receipt.clone()))
    }

    fn partitions(&self) -> u32 {
        self.partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_types::workflow::JsonMap;
    use uuid::Uuid;

    fn message() -> WorkflowMessage {
        WorkflowMessage::new(Uuid::now_v7(), Uuid::now_v7(), JsonMap::new())
    }

    #[tokio::test]
    async fn test_claim_and_ack() {
        let queue = InMemoryExecutionQueue::new(3);
        let msg = message();
        queue.enqueue(&msg).await.unwrap();

        let delivery = queue.next_delivery(None).await.unwrap().unwrap();
        assert_eq!(delivery.message, msg);
        assert_eq!(delivery.partition, partition_for(&msg.execution_id, 3));
        assert_eq!(queue.in_flight_len(), 1);

        queue.ack(&delivery).await.unwrap();
        assert_eq!(queue.in_flight_len(), 0);
        assert!(queue.ack(&delivery).await.is_err());
    }

    #[tokio::test]
    async fn test_unacked_redelivered_only_after_requeue() {
        let queue = InMemoryExecutionQueue::new(1);
        let first = message();
        let second = message();
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        let d1 = queue.next_delivery(None).await.unwrap().unwrap();
        assert_eq!(d1.message, first);
        assert_eq!(queue.requeue_unacked(), 1);

        let again = queue.next_delivery(Some(0)).await.unwrap().unwrap();
        assert_eq!(again.message, first);
        assert_eq!(again.delivery_count, 2);
        assert!(queue.ack(&d1).await.is_err(), "old receipt is stale");

        let d2 = queue.next_delivery(Some(0)).await.unwrap().unwrap();
        assert_eq!(d2.message, second);
        assert!(queue.next_delivery(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dead_letter() {
        let queue = InMemoryExecutionQueue::default();
        let msg = message();
        queue.dead_letter(&msg).await.unwrap();
        assert_eq!(queue.dead_letters(), vec![msg]);
        assert_eq!(queue.pending_len(), 0);
    }
}
