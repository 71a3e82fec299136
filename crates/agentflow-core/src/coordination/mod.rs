//! Cross-process coordination for asynchronous execution.
//!
//! - `state_store` -- TTL key-value port (locks, counters, projection)
//! - `coordinator` -- lock / fault counter / status projection per execution
//! - `consumer` -- handles one queue delivery under the lock
//! - `worker` -- pool of tasks feeding deliveries to the consumer

pub mod consumer;
pub mod coordinator;
pub mod state_store;
pub mod worker;

pub use consumer::{ConsumeOutcome, ConsumerError, WorkflowConsumer};
pub use coordinator::{ExecutionCoordinator, ExecutionState};
pub use state_store::{CoordinationError, ExecutionStateStore};
pub use worker::{WorkerPool, WorkerStats};
