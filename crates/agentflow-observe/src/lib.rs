//! Observability setup shared by AgentFlow binaries.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, shutdown_tracing};
