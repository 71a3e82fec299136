//! Infrastructure layer for AgentFlow.
//!
//! Implements the ports defined in `agentflow-core`: SQLite storage,
//! coordination store and queue, their in-memory counterparts, and the
//! built-in `http` and `transform` agents. Also loads configuration and
//! resolves the data directory.

pub mod agent;
pub mod config;
pub mod filesystem;
pub mod memory;
pub mod sqlite;
