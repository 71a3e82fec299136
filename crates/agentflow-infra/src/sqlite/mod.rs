//! SQLite storage layer.
//!
//! Repository, coordination store and queue implementations backed by SQLite
//! with WAL mode and split read/write connection pools.

pub mod pool;
pub mod queue;
pub mod state_store;
pub mod workflow;

pub use pool::DatabasePool;
pub use queue::SqliteExecutionQueue;
pub use state_store::SqliteStateStore;
pub use workflow::SqliteWorkflowRepository;
