//! Application services orchestrating the ports.

pub mod workflow;

pub use workflow::{ExecutionMode, ServiceError, WorkflowService};
