//! Capability ("agent") contract, type-erased wrapper and registry.

pub mod box_agent;
pub mod contract;
pub mod registry;

pub use box_agent::BoxAgent;
pub use contract::{Agent, AgentCapabilities, AgentContext, AgentResult};
pub use registry::AgentRegistry;
