//! Queue consumer for the asynchronous execution path.
//!
//! Wraps a [`WorkflowExecutor`] call with the execution lock and the
//! delivery fault policy. Every delivery is acknowledged; a faulted message
//! is redelivered only by republishing it (after the lock is released), and
//! goes to the dead-letter channel once the fault counter reaches its ceiling.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use agentflow_types::error::RepositoryError;
use agentflow_types::message::WorkflowMessage;
use agentflow_types::workflow::ExecutionStatus;

use crate::queue::{Delivery, ExecutionQueue};
use crate::repository::WorkflowRepository;
use crate::workflow::executor::{ExecutorError, WorkflowExecutor};

use super::coordinator::ExecutionCoordinator;
use super::state_store::{CoordinationError, ExecutionStateStore};

/// What happened to a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The executor ran the execution to a terminal state.
    Processed,
    /// Another worker holds the lock, or the execution is already terminal.
    Skipped,
    /// The workflow or execution record no longer exists.
    Missing,
    /// Processing faulted; the message was republished.
    Faulted { attempt: i64 },
    /// Processing faulted at the ceiling; the message went to the dead-letter channel.
    DeadLettered,
}

/// Faults raised while processing a delivery.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

pub struct WorkflowConsumer<R, S, Q>
where
    R: WorkflowRepository,
    S: ExecutionStateStore,
    Q: ExecutionQueue,
{
    executor: Arc<WorkflowExecutor<R>>,
    coordinator: Arc<ExecutionCoordinator<S>>,
    queue: Arc<Q>,
}

impl<R, S, Q> WorkflowConsumer<R, S, Q>
where
    R: WorkflowRepository,
    S: ExecutionStateStore,
    Q: ExecutionQueue,
{
    pub fn new(
        executor: Arc<WorkflowExecutor<R>>,
        coordinator: Arc<ExecutionCoordinator<S>>,
        queue: Arc<Q>,
    ) -> Self {
        Self {
            executor,
            coordinator,
            queue,
        }
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    /// Handle one delivery. Never fails: faults are classified into the
    /// returned outcome, and the delivery is always acknowledged.
    pub async fn handle(&self, delivery: &Delivery) -> ConsumeOutcome {
        let message = &delivery.message;
        let execution_id = message.execution_id;
        tracing::info!(
            execution_id = %execution_id,
            partition = delivery.partition,
            delivery_count = delivery.delivery_count,
            "processing workflow message"
        );

        let outcome = match self.coordinator.try_lock(execution_id).await {
            Ok(false) => {
                tracing::warn!(execution_id = %execution_id, "execution already being processed");
                ConsumeOutcome::Skipped
            }
            Ok(true) => {
                let result = self.process(message).await;
                // Released before any republish so the next worker can claim it.
                if let Err(e) = self.coordinator.unlock(execution_id).await {
                    tracing::warn!(execution_id = %execution_id, error = %e, "failed to release execution lock");
                }
                match result {
                    Ok(outcome) => outcome,
                    Err(fault) => self.handle_fault(message, &fault).await,
                }
            }
            Err(e) => self.handle_fault(message, &ConsumerError::from(e)).await,
        };

        if let Err(e) = self.queue.ack(delivery).await {
            tracing::error!(
                execution_id = %execution_id,
                receipt = delivery.receipt.as_str(),
                error = %e,
                "failed to acknowledge delivery"
            );
        }
        outcome
    }

    async fn process(&self, message: &WorkflowMessage) -> Result<ConsumeOutcome, ConsumerError> {
        let execution_id = message.execution_id;
        let repo = self.executor.repo();

        let Some(workflow) = repo.get_workflow(&message.workflow_id).await? else {
            tracing::warn!(
                execution_id = %execution_id,
                workflow_id = %message.workflow_id,
                "skipping message for deleted workflow"
            );
            return Ok(ConsumeOutcome::Missing);
        };
        let Some(execution) = repo.get_execution(&execution_id).await? else {
            tracing::warn!(execution_id = %execution_id, "skipping message for deleted execution");
            return Ok(ConsumeOutcome::Missing);
        };
        if execution.status.is_terminal() {
            tracing::info!(
                execution_id = %execution_id,
                status = %execution.status,
                "execution already finished, skipping"
            );
            return Ok(ConsumeOutcome::Skipped);
        }

        self.coordinator.mark_running(execution_id).await?;
        let finished = self
            .executor
            .execute(&workflow.definition, execution, message.inputs.clone())
            .await?;

        match (finished.status, finished.error.as_deref()) {
            (ExecutionStatus::Failed, detail) => {
                self.coordinator
                    .mark_failed(execution_id, detail.unwrap_or_default())
                    .await?
            }
            _ => self.coordinator.mark_completed(execution_id).await?,
        }
        Ok(ConsumeOutcome::Processed)
    }

    async fn handle_fault(&self, message: &WorkflowMessage, fault: &ConsumerError) -> ConsumeOutcome {
        let execution_id = message.execution_id;
        let detail = fault.to_string();
        tracing::error!(execution_id = %execution_id, error = detail.as_str(), "workflow message faulted");

        let attempt = match self.coordinator.increment_retry(execution_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "failed to count fault");
                // Without a counter the ceiling cannot be enforced; dead-letter.
                self.coordinator.max_delivery_attempts()
            }
        };

        if attempt >= self.coordinator.max_delivery_attempts() {
            tracing::error!(
                execution_id = %execution_id,
                attempt,
                "max delivery attempts reached, sending to dead-letter channel"
            );
            if let Err(e) = self.queue.dead_letter(message).await {
                tracing::error!(execution_id = %execution_id, error = %e, "failed to dead-letter message");
            }
            self.mark_execution_failed(execution_id, &detail).await;
            return ConsumeOutcome::DeadLettered;
        }

        if let Err(e) = self.queue.enqueue(message).await {
            tracing::error!(execution_id = %execution_id, error = %e, "failed to republish message");
        }
        ConsumeOutcome::Faulted { attempt }
    }

    /// Best-effort: terminalize the durable record and the projection.
    async fn mark_execution_failed(&self, execution_id: Uuid, detail: &str) {
        let repo = self.executor.repo();
        match repo.get_execution(&execution_id).await {
            Ok(Some(mut execution)) if !execution.status.is_terminal() => {
                execution.mark_failed(detail);
                if let Err(e) = repo.save_execution(&execution).await {
                    tracing::error!(execution_id = %execution_id, error = %e, "failed to mark execution failed");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "failed to load execution");
            }
        }
        if let Err(e) = self.coordinator.mark_failed(execution_id, detail).await {
            tracing::warn!(execution_id = %execution_id, error = %e, "failed to update state projection");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
