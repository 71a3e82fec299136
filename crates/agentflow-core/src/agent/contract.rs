//! Agent trait definition and its input/output types.
//!
//! Every step invokes exactly one agent through this uniform contract.
//! Failures are reported in-band through [`AgentResult`] so the executor
//! can classify them without error-based control flow.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use agentflow_types::workflow::JsonMap;

/// Trait for pluggable step capabilities (HTTP calls, transforms, ...).
///
/// Implementations must be safe to retry: the executor re-invokes
/// `execute` with the same context after a reported failure.
///
/// Built-in implementations live in agentflow-infra.
pub trait Agent: Send + Sync {
    /// Type identifier matched against a step's `agent` field.
    fn agent_type(&self) -> &str;

    /// Human-readable description for listings.
    fn capabilities(&self) -> AgentCapabilities;

    /// Run the capability once.
    fn execute(
        &self,
        ctx: &AgentContext,
    ) -> impl std::future::Future<Output = AgentResult> + Send;
}

/// Describes a registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentCapabilities {
    pub agent_type: String,
    pub description: String,
}

impl AgentCapabilities {
    pub fn new(agent_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            description: description.into(),
        }
    }
}

/// Input handed to an agent: runtime inputs plus its interpolated config.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub inputs: JsonMap,
    pub config: JsonMap,
}

impl AgentContext {
    pub fn new(inputs: JsonMap, config: JsonMap) -> Self {
        Self { inputs, config }
    }

    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// String config value, if present and a string.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// String config value or a descriptive error message.
    pub fn required_config(&self, key: &str) -> Result<&str, String> {
        match self.config.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
            Some(Value::String(_)) | None => Err(format!("missing required config: {key}")),
            Some(_) => Err(format!("config '{key}' must be a string")),
        }
    }
}

/// Outcome of a single agent invocation.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub success: bool,
    pub outputs: JsonMap,
    pub error: Option<String>,
    pub duration: Duration,
}

impl AgentResult {
    pub fn success(outputs: JsonMap, duration: Duration) -> Self {
        Self {
            success: true,
            outputs,
            error: None,
            duration,
        }
    }

    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            outputs: JsonMap::new(),
            error: Some(error.into()),
            duration,
        }
    }

    /// Error message, or a generic one if the agent left it empty.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "agent reported failure".to_string())
    }
}
