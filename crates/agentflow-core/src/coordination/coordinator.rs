//! Distributed lock, fault counter and status projection per execution.
//!
//! The lock is a TTL record, so mutual exclusion is approximate: a holder
//! that crashes keeps the lock until expiry, and a holder that outlives the
//! TTL can overlap with a second worker.

use std::fmt;
use std::sync::Arc;

use agentflow_types::config::CoordinationConfig;
use uuid::Uuid;

use super::state_store::{CoordinationError, ExecutionStateStore};

const STATE_RUNNING: &str = "RUNNING";
const STATE_COMPLETED: &str = "COMPLETED";
const STATE_FAILED_PREFIX: &str = "FAILED:";

/// Lightweight status projection, separate from the durable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Completed,
    Failed(String),
    /// A value this version does not recognise.
    Unknown(String),
}

impl ExecutionState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            STATE_RUNNING => ExecutionState::Running,
            STATE_COMPLETED => ExecutionState::Completed,
            other => match other.strip_prefix(STATE_FAILED_PREFIX) {
                Some(detail) => ExecutionState::Failed(detail.to_string()),
                None => ExecutionState::Unknown(other.to_string()),
            },
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ExecutionState::Running => STATE_RUNNING.to_string(),
            ExecutionState::Completed => STATE_COMPLETED.to_string(),
            ExecutionState::Failed(detail) => format!("{STATE_FAILED_PREFIX}{detail}"),
            ExecutionState::Unknown(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Coordination operations over an [`ExecutionStateStore`].
pub struct ExecutionCoordinator<S: ExecutionStateStore> {
    store: Arc<S>,
    config: CoordinationConfig,
    /// Written as the lock value so a held lock can be attributed.
    holder: String,
}

impl<S: ExecutionStateStore> ExecutionCoordinator<S> {
    pub fn new(store: Arc<S>, config: CoordinationConfig) -> Self {
        Self {
            store,
            config,
            holder: format!("worker-{}", Uuid::now_v7()),
        }
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Faulted deliveries allowed before dead-lettering.
    pub fn max_delivery_attempts(&self) -> i64 {
        self.config.max_delivery_attempts
    }

    /// Try to take the execution lock. Exactly one concurrent caller wins.
    pub async fn try_lock(&self, execution_id: Uuid) -> Result<bool, CoordinationError> {
        let acquired = self
            .store
            .set_if_absent(&lock_key(execution_id), &self.holder, self.config.lock_ttl())
            .await?;
        tracing::debug!(execution_id = %execution_id, acquired, "execution lock attempt");
        Ok(acquired)
    }

    /// Release the lock unconditionally.
    pub async fn unlock(&self, execution_id: Uuid) -> Result<(), CoordinationError> {
        self.store.delete(&lock_key(execution_id)).await
    }

    /// Count one more faulted delivery and return the total.
    pub async fn increment_retry(&self, execution_id: Uuid) -> Result<i64, CoordinationError> {
        self.store
            .increment(&retry_key(execution_id), self.config.retry_ttl())
            .await
    }

    pub async fn mark_running(&self, execution_id: Uuid) -> Result<(), CoordinationError> {
        self.set_state(execution_id, &ExecutionState::Running).await
    }

    pub async fn mark_completed(&self, execution_id: Uuid) -> Result<(), CoordinationError> {
        self.set_state(execution_id, &ExecutionState::Completed).await
    }

    pub async fn mark_failed(&self, execution_id: Uuid, detail: &str) -> Result<(), CoordinationError> {
        self.set_state(execution_id, &ExecutionState::Failed(detail.to_string()))
            .await
    }

    pub async fn get_state(&self, execution_id: Uuid) -> Result<Option<ExecutionState>, CoordinationError> {
        let raw = self.store.get(&state_key(execution_id)).await?;
        Ok(raw.as_deref().map(ExecutionState::parse))
    }

    async fn set_state(&self, execution_id: Uuid, state: &ExecutionState) -> Result<(), CoordinationError> {
        self.store
            .set(&state_key(execution_id), &state.encode(), self.config.state_ttl())
            .await
    }
}

fn lock_key(id: Uuid) -> String {
    format!("lock:{id}")
}

fn retry_key(id: Uuid) -> String {
    format!("retry:{id}")
}

fn state_key(id: Uuid) -> String {
    format!("state:{id}")
}
