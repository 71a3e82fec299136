//! Workflow domain types for AgentFlow.
//!
//! Defines the canonical representation of a workflow (`WorkflowDefinition`),
//! its registered form (`WorkflowRecord`), and the execution tracking types
//! (`WorkflowExecution`, `StepExecution`) mutated by the executor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JSON object used for inputs, step configuration, and outputs.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A parsed, validated workflow definition.
///
/// Produced by the document parser and stored inside a `WorkflowRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name (non-blank).
    pub name: String,
    /// Version string, "1.0" when the document omits it.
    pub version: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps in document order. Execution order is computed by the resolver.
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// A single step in the workflow DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Step id, unique within the workflow, matching `^[A-Za-z][A-Za-z0-9_-]*$`.
    pub id: String,
    /// Capability type identifier (e.g. "http", "transform").
    pub agent: String,
    /// Capability configuration. String leaves may contain `${...}` templates.
    #[serde(default)]
    pub config: JsonMap,
    /// Ids of steps that must complete before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Retry policy. `None` means a failed attempt is final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl StepDefinition {
    /// Build a step with no dependencies, empty config and no retry policy.
    pub fn new(id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            config: JsonMap::new(),
            depends_on: Vec::new(),
            retry: None,
        }
    }

    pub fn with_config(mut self, config: JsonMap) -> Self {
        self.config = config;
        self
    }

    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Returns true if `id` matches `^[A-Za-z][A-Za-z0-9_-]*$`.
pub fn is_valid_step_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ---------------------------------------------------------------------------
// Retry Policy
// ---------------------------------------------------------------------------

/// Upper bound for `RetryPolicy::max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Upper bound for `RetryPolicy::delay_ms` (one minute).
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// In-process retry policy for a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Additional attempts after the first failure, in `[0, 10]`.
    pub max_retries: u32,
    /// Wait between attempts in milliseconds, in `[0, 60000]`.
    pub delay_ms: u64,
}

impl RetryPolicy {
    /// Build a policy, clamping both values into range.
    pub fn new(max_retries: i64, delay_ms: i64) -> Self {
        Self {
            max_retries: max_retries.clamp(0, MAX_RETRIES_LIMIT as i64) as u32,
            delay_ms: delay_ms.clamp(0, MAX_RETRY_DELAY_MS as i64) as u64,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay_ms: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Registered workflow
// ---------------------------------------------------------------------------

/// A workflow definition registered with the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// UUIDv7 assigned at registration.
    pub id: Uuid,
    /// Denormalized from the definition for lookups.
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The validated definition.
    pub definition: WorkflowDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRecord {
    /// Wrap a validated definition in a new record.
    pub fn new(definition: WorkflowDefinition, created_by: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: definition.name.clone(),
            version: definition.version.clone(),
            description: definition.description.clone(),
            definition,
            created_by,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution Status
// ---------------------------------------------------------------------------

/// Status shared by workflow and step executions.
///
/// `Pending -> Running -> {Completed, Failed}`. `Cancelled` and `Skipped` are
/// terminal states the executor does not currently produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl ExecutionStatus {
    /// Whether no further transitions are expected.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
                | ExecutionStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            "skipped" => Ok(ExecutionStatus::Skipped),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow Execution
// ---------------------------------------------------------------------------

/// One run of a workflow, owning its step execution records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    /// ID of the `WorkflowRecord` being executed.
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub inputs: JsonMap,
    /// `{steps: {<id>: {outputs: ...}}}` once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Step records in the order they were first attempted.
    #[serde(default)]
    pub step_executions: Vec<StepExecution>,
}

impl WorkflowExecution {
    /// Create a `Pending` execution for a workflow.
    pub fn new(workflow_id: Uuid, inputs: JsonMap) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            status: ExecutionStatus::Pending,
            inputs,
            outputs: None,
            current_step_id: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            step_executions: Vec::new(),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, outputs: JsonMap) {
        self.status = ExecutionStatus::Completed;
        self.outputs = Some(outputs);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Find the record for a step, if it has been attempted.
    pub fn step_execution(&self, step_id: &str) -> Option<&StepExecution> {
        self.step_executions.iter().find(|s| s.step_id == step_id)
    }

    /// Return the index of the step's record, creating a `Pending` one on
    /// first attempt.
    pub fn ensure_step_execution(&mut self, step_id: &str, agent_type: &str) -> usize {
        if let Some(idx) = self.step_executions.iter().position(|s| s.step_id == step_id) {
            return idx;
        }
        self.step_executions
            .push(StepExecution::new(step_id, agent_type));
        self.step_executions.len() - 1
    }
}

/// Execution record for a single step. Retries mutate the same record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    /// UUIDv7 step execution ID.
    pub id: Uuid,
    pub step_id: String,
    pub agent_type: String,
    pub status: ExecutionStatus,
    /// Interpolated configuration handed to the capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of retries performed (0 on first attempt).
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepExecution {
    pub fn new(step_id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            step_id: step_id.into(),
            agent_type: agent_type.into(),
            status: ExecutionStatus::Pending,
            inputs: None,
            outputs: None,
            error: None,
            retry_count: 0,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, outputs: JsonMap) {
        self.status = ExecutionStatus::Completed;
        self.outputs = Some(outputs);
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Count a retry and cycle back to `Pending`.
    pub fn schedule_retry(&mut self) {
        self.retry_count += 1;
        self.status = ExecutionStatus::Pending;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
