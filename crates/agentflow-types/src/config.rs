//! Global configuration types for AgentFlow.
//!
//! `AgentflowConfig` represents the top-level `config.toml` in the data
//! directory. Every field has a default so an empty or missing file works.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.agentflow/config.toml`. All sections are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentflowConfig {
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Settings for the distributed lock, fault counter and status projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Lifetime of an execution lock record.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// Lifetime of the asynchronous fault counter.
    #[serde(default = "default_retry_ttl_secs")]
    pub retry_ttl_secs: u64,
    /// Lifetime of the status projection entry.
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,
    /// Faulted deliveries before a message is dead-lettered.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: i64,
}

fn default_lock_ttl_secs() -> u64 {
    600
}

fn default_retry_ttl_secs() -> u64 {
    86_400
}

fn default_state_ttl_secs() -> u64 {
    86_400
}

fn default_max_delivery_attempts() -> i64 {
    3
}

impl CoordinationConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn retry_ttl(&self) -> Duration {
        Duration::from_secs(self.retry_ttl_secs)
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: default_lock_ttl_secs(),
            retry_ttl_secs: default_retry_ttl_secs(),
            state_ttl_secs: default_state_ttl_secs(),
            max_delivery_attempts: default_max_delivery_attempts(),
        }
    }
}

/// Settings for the execution queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    /// How long a claimed message stays invisible before redelivery.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    /// Sleep between empty polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_topic() -> String {
    "workflow-executions".to_string()
}

fn default_dead_letter_topic() -> String {
    "workflow-executions-dlq".to_string()
}

fn default_partitions() -> u32 {
    3
}

fn default_lease_secs() -> u64 {
    900
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl QueueConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            dead_letter_topic: default_dead_letter_topic(),
            partitions: default_partitions(),
            lease_secs: default_lease_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Settings for the worker fleet started by `agentflow worker`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}
