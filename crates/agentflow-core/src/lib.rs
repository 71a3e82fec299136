//! Workflow engine logic and port trait definitions for AgentFlow.
//!
//! This crate defines the "ports" (repository, state store, queue traits)
//! that the infrastructure layer implements. It depends only on
//! `agentflow-types` -- never on `agentflow-infra` or any database/IO crate.

pub mod agent;
pub mod coordination;
pub mod queue;
pub mod repository;
pub mod service;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
