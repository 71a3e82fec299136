//! In-memory adapters for tests and single-process deployments.
//!
//! Backed by `DashMap`; nothing survives a restart.

pub mod queue;
pub mod repo;
pub mod state_store;

pub use queue::InMemoryExecutionQueue;
pub use repo::InMemoryWorkflowRepository;
pub use state_store::InMemoryStateStore;
