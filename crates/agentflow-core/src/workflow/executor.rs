//! Sequential workflow executor.
//!
//! Walks the resolved step order one step at a time, interpolating each
//! step's config from the accumulated outputs, dispatching it to its agent,
//! and applying the step's retry policy. The first step that ends FAILED
//! aborts the run (fail-fast). Every return path leaves the execution in a
//! terminal state and attempts to persist it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use agentflow_types::error::RepositoryError;
use agentflow_types::workflow::{JsonMap, StepDefinition, WorkflowDefinition, WorkflowExecution};

use crate::agent::{AgentContext, AgentRegistry, AgentResult};
use crate::repository::WorkflowRepository;

use super::dag::DependencyResolver;
use super::definition::WorkflowError;
use super::interpolate::{InterpolationContext, VariableInterpolator};
use super::retry::{RetryDecision, RetryHandler};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Faults that escape the step loop.
///
/// Only `Persistence` is ever returned from [`WorkflowExecutor::execute`], and
/// only when the terminal save itself fails. Other faults are recorded on the
/// execution as its error.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("failed to persist execution {execution_id}: {source}")]
    Persistence {
        execution_id: Uuid,
        #[source]
        source: RepositoryError,
    },
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

enum RunOutcome {
    /// All steps completed; carries the `{id: {outputs}}` map.
    Completed(JsonMap),
    StepFailed { step_id: String, error: String },
}

enum StepOutcome {
    Completed(JsonMap),
    Failed(String),
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Drives the per-step state machine for one execution at a time.
///
/// Generic over `R: WorkflowRepository` for storage flexibility. Holds no
/// per-execution state, so one instance can be shared by many workers.
pub struct WorkflowExecutor<R: WorkflowRepository> {
    repo: Arc<R>,
    agents: Arc<AgentRegistry>,
    /// Interrupts retry-delay waits.
    cancel: CancellationToken,
}

impl<R: WorkflowRepository> WorkflowExecutor<R> {
    pub fn new(repo: Arc<R>, agents: Arc<AgentRegistry>) -> Self {
        Self {
            repo,
            agents,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an external token so shutdown can interrupt retry waits.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    /// Run `execution` to a terminal state and return it.
    ///
    /// The definition is assumed structurally valid. A resolver failure or a
    /// failed intermediate save marks the execution FAILED with the fault's
    /// message. Returns `Err` only if the final save fails.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        mut execution: WorkflowExecution,
        inputs: JsonMap,
    ) -> Result<WorkflowExecution, ExecutorError> {
        let execution_id = execution.id;
        let started = Instant::now();
        tracing::info!(
            execution_id = %execution_id,
            workflow = definition.name.as_str(),
            steps = definition.steps.len(),
            "starting workflow execution"
        );

        match self.run(definition, &mut execution, inputs).await {
            Ok(RunOutcome::Completed(steps)) => {
                let mut outputs = JsonMap::new();
                outputs.insert("steps".to_string(), Value::Object(steps));
                execution.mark_completed(outputs);
                tracing::info!(
                    execution_id = %execution_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "workflow execution completed"
                );
            }
            Ok(RunOutcome::StepFailed { step_id, error }) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    step_id = step_id.as_str(),
                    error = error.as_str(),
                    "workflow execution failed"
                );
                execution.mark_failed(format!("step failed: {step_id} - {error}"));
            }
            Err(fault) => {
                tracing::error!(
                    execution_id = %execution_id,
                    error = %fault,
                    "workflow execution faulted"
                );
                execution.mark_failed(fault.to_string());
            }
        }

        self.persist(&execution).await?;
        Ok(execution)
    }

    async fn run(
        &self,
        definition: &WorkflowDefinition,
        execution: &mut WorkflowExecution,
        inputs: JsonMap,
    ) -> Result<RunOutcome, ExecutorError> {
        let ordered = DependencyResolver::resolve(&definition.steps)?;

        execution.mark_running();
        execution.inputs = inputs.clone();
        self.persist(execution).await?;

        let mut ctx = InterpolationContext::new(inputs);
        for step in ordered {
            execution.current_step_id = Some(step.id.clone());
            self.persist(execution).await?;

            match self.run_step(step, execution, &ctx).await? {
                StepOutcome::Completed(outputs) => ctx.record_step(&step.id, outputs),
                StepOutcome::Failed(error) => {
                    return Ok(RunOutcome::StepFailed {
                        step_id: step.id.clone(),
                        error,
                    });
                }
            }
        }

        Ok(RunOutcome::Completed(ctx.into_steps()))
    }

    /// Run one step through its attempts, reusing a single record.
    async fn run_step(
        &self,
        step: &StepDefinition,
        execution: &mut WorkflowExecution,
        ctx: &InterpolationContext,
    ) -> Result<StepOutcome, ExecutorError> {
        let execution_id = execution.id;
        let config = VariableInterpolator::interpolate_map(&step.config, ctx);
        let idx = execution.ensure_step_execution(&step.id, &step.agent);

        let config = match config {
            Ok(config) => config,
            Err(e) => {
                let error = e.to_string();
                return self.fail_step(execution, idx, error).await;
            }
        };
        execution.step_executions[idx].inputs = Some(config.clone());

        let Some(agent) = self.agents.get(&step.agent) else {
            let error = format!("unknown agent type: {}", step.agent);
            return self.fail_step(execution, idx, error).await;
        };

        let agent_ctx = AgentContext::new(JsonMap::new(), config);
        loop {
            let record = &mut execution.step_executions[idx];
            record.mark_running();
            tracing::debug!(
                execution_id = %execution_id,
                step_id = step.id.as_str(),
                agent = step.agent.as_str(),
                attempt = record.retry_count + 1,
                "running step"
            );

            let result = match AssertUnwindSafe(agent.execute(&agent_ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let error = format!("agent panicked: {}", panic_message(panic.as_ref()));
                    return self.fail_step(execution, idx, error).await;
                }
            };

            if result.success {
                return self.complete_step(execution, idx, result).await;
            }

            let error = result.error_message();
            let record = &mut execution.step_executions[idx];
            match RetryHandler::decide(step.retry.as_ref(), record.retry_count) {
                RetryDecision::Retry { delay } => {
                    record.schedule_retry();
                    record.error = Some(error.clone());
                    tracing::warn!(
                        execution_id = %execution_id,
                        step_id = step.id.as_str(),
                        retry = record.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = error.as_str(),
                        "step failed, retrying"
                    );
                    if !RetryHandler::wait(delay, &self.cancel).await {
                        let error = format!("{error} (retry interrupted)");
                        return self.fail_step(execution, idx, error).await;
                    }
                }
                RetryDecision::GiveUp => {
                    return self.fail_step(execution, idx, error).await;
                }
            }
        }
    }

    async fn complete_step(
        &self,
        execution: &mut WorkflowExecution,
        idx: usize,
        result: AgentResult,
    ) -> Result<StepOutcome, ExecutorError> {
        let record = &mut execution.step_executions[idx];
        record.mark_completed(result.outputs.clone());
        tracing::debug!(
            execution_id = %execution.id,
            step_id = record.step_id.as_str(),
            retries = record.retry_count,
            duration_ms = result.duration.as_millis() as u64,
            "step completed"
        );
        self.persist(execution).await?;
        Ok(StepOutcome::Completed(result.outputs))
    }

    async fn fail_step(
        &self,
        execution: &mut WorkflowExecution,
        idx: usize,
        error: String,
    ) -> Result<StepOutcome, ExecutorError> {
        let record = &mut execution.step_executions[idx];
        record.mark_failed(error.clone());
        tracing::warn!(
            execution_id = %execution.id,
            step_id = record.step_id.as_str(),
            retries = record.retry_count,
            error = error.as_str(),
            "step failed"
        );
        self.persist(execution).await?;
        Ok(StepOutcome::Failed(error))
    }

    async fn persist(&self, execution: &WorkflowExecution) -> Result<(), ExecutorError> {
        self.repo
            .save_execution(execution)
            .await
            .map_err(|source| ExecutorError::Persistence {
                execution_id: execution.id,
                source,
            })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
