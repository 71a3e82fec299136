//! Execution queue port.
//!
//! An at-least-once, partitioned channel of `WorkflowMessage`s keyed by
//! execution id, plus a dead-letter channel for exhausted messages.
//! Adapters live in agentflow-infra.

use agentflow_types::message::WorkflowMessage;
use thiserror::Error;
use uuid::Uuid;

/// Errors from queue adapters.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(String),

    #[error("message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown delivery: {0}")]
    UnknownDelivery(String),
}

/// A claimed message awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Adapter-specific receipt used by `ack`.
    pub receipt: String,
    pub partition: u32,
    /// How many times this message has been handed out (1 on first delivery).
    pub delivery_count: u32,
    pub message: WorkflowMessage,
}

/// Queue trait for the asynchronous execution path.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutionQueue: Send + Sync {
    /// Publish a message to its execution's partition.
    fn enqueue(
        &self,
        message: &WorkflowMessage,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

    /// Publish a message verbatim to the dead-letter channel.
    fn dead_letter(
        &self,
        message: &WorkflowMessage,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

    /// Claim the next available message.
    ///
    /// `partition` restricts the claim to one partition; `None` takes from
    /// any. Messages within a partition are handed out in publish order.
    fn next_delivery(
        &self,
        partition: Option<u32>,
    ) -> impl std::future::Future<Output = Result<Option<Delivery>, QueueError>> + Send;

    /// Acknowledge a delivery so it is never handed out again.
    fn ack(
        &self,
        delivery: &Delivery,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

    /// Number of partitions messages are spread across.
    fn partitions(&self) -> u32;
}

/// Stable partition for an execution id (FNV-1a over the key bytes).
pub fn partition_for(execution_id: &Uuid, partitions: u32) -> u32 {
    if partitions <= 1 {
        return 0;
    }
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in execution_id.to_string().as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % u64::from(partitions)) as u32
}
