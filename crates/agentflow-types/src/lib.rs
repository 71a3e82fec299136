//! Shared domain types for AgentFlow.
//!
//! This crate contains the core domain types used across the AgentFlow engine:
//! workflow definitions, execution records, queue messages, configuration,
//! and the repository error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod message;
pub mod page;
pub mod workflow;
