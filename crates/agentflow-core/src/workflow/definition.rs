//! Workflow definition parsing, validation, and file loading.
//!
//! Parsing is split into two pure stages:
//! - `parse_document` turns text (YAML or JSON) into a generic document
//! - `definition_from_document` maps that document onto `WorkflowDefinition`
//!
//! `validate_definition` then checks semantic constraints (unique ids,
//! referential integrity, acyclicity). `parse_workflow` composes all three.

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use agentflow_types::workflow::{
    is_valid_step_id, JsonMap, RetryPolicy, StepDefinition, WorkflowDefinition,
};

use super::dag::DependencyResolver;

/// Largest accepted workflow document in bytes.
pub const MAX_DOCUMENT_BYTES: usize = 100 * 1024;

/// Largest accepted number of steps per workflow.
pub const MAX_STEPS: usize = 100;

const DEFAULT_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while turning a document into a runnable definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed or oversized document, missing field, bad step id.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A step references an unknown dependency.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),
}

// ---------------------------------------------------------------------------
// Stage 1: text -> document
// ---------------------------------------------------------------------------

/// Parse YAML or JSON text into a generic document.
///
/// JSON is accepted through the YAML parser. The top level must be a mapping.
pub fn parse_document(text: &str) -> Result<Value, WorkflowError> {
    if text.trim().is_empty() {
        return Err(WorkflowError::ParseError(
            "workflow document cannot be empty".to_string(),
        ));
    }
    if text.len() > MAX_DOCUMENT_BYTES {
        return Err(WorkflowError::ParseError(format!(
            "workflow document too large ({} bytes, max {MAX_DOCUMENT_BYTES})",
            text.len()
        )));
    }

    let doc: Value =
        serde_yaml_ng::from_str(text).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    if !doc.is_object() {
        return Err(WorkflowError::ParseError(
            "workflow document must be a mapping".to_string(),
        ));
    }
    Ok(doc)
}

// ---------------------------------------------------------------------------
// Stage 2: document -> definition
// ---------------------------------------------------------------------------

/// Map a generic document onto a `WorkflowDefinition`, applying defaults.
///
/// Enforces the step-count cap and the step id pattern. Does not check
/// uniqueness or dependencies; see [`validate_definition`].
pub fn definition_from_document(doc: &Value) -> Result<WorkflowDefinition, WorkflowError> {
    let root = doc.as_object().ok_or_else(|| {
        WorkflowError::ParseError("workflow document must be a mapping".to_string())
    })?;

    let name = required_text(root, "name", "name")?;
    let version = optional_text(root, "version", "version")?
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());
    let description = optional_text(root, "description", "description")?;

    let steps_value = match root.get("steps") {
        None | Some(Value::Null) => {
            return Err(WorkflowError::ParseError(
                "missing required field: steps".to_string(),
            ));
        }
        Some(v) => v,
    };
    let raw_steps = steps_value
        .as_array()
        .ok_or_else(|| WorkflowError::ParseError("field 'steps' must be a list".to_string()))?;
    if raw_steps.len() > MAX_STEPS {
        return Err(WorkflowError::ParseError(format!(
            "too many steps ({}, max {MAX_STEPS})",
            raw_steps.len()
        )));
    }

    let steps = raw_steps
        .iter()
        .enumerate()
        .map(|(i, raw)| step_from_document(i, raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WorkflowDefinition {
        name,
        version,
        description,
        steps,
    })
}

fn step_from_document(index: usize, raw: &Value) -> Result<StepDefinition, WorkflowError> {
    let map = raw.as_object().ok_or_else(|| {
        WorkflowError::ParseError(format!("steps[{index}] must be a mapping"))
    })?;

    let id = required_text(map, "id", &format!("steps[{index}].id"))?;
    if !is_valid_step_id(&id) {
        return Err(WorkflowError::ParseError(format!(
            "invalid step id '{id}': must start with a letter and contain only letters, digits, '_' or '-'"
        )));
    }
    let agent = required_text(map, "agent", &format!("steps[{index}].agent"))?;

    let config = match map.get("config") {
        None | Some(Value::Null) => JsonMap::new(),
        Some(Value::Object(c)) => c.clone(),
        Some(_) => {
            return Err(WorkflowError::ParseError(format!(
                "step '{id}': config must be a mapping"
            )));
        }
    };

    let depends_on = match map.get("dependsOn") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                scalar_text(item).ok_or_else(|| {
                    WorkflowError::ParseError(format!(
                        "step '{id}': dependsOn entries must be step ids"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(WorkflowError::ParseError(format!(
                "step '{id}': dependsOn must be a list"
            )));
        }
    };

    let retry = match map.get("retry") {
        None | Some(Value::Null) => RetryPolicy::default(),
        Some(Value::Object(r)) => {
            let defaults = RetryPolicy::default();
            let max_retries = integer_field(r, "maxRetries", &id)?
                .unwrap_or(i64::from(defaults.max_retries));
            let delay_ms = integer_field(r, "delayMs", &id)?.unwrap_or(defaults.delay_ms as i64);
            RetryPolicy::new(max_retries, delay_ms)
        }
        Some(_) => {
            return Err(WorkflowError::ParseError(format!(
                "step '{id}': retry must be a mapping"
            )));
        }
    };

    Ok(StepDefinition {
        id,
        agent,
        config,
        depends_on,
        retry: Some(retry),
    })
}

/// Text form of a scalar: strings as-is, numbers and booleans rendered.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(map: &JsonMap, key: &str, label: &str) -> Result<String, WorkflowError> {
    optional_text(map, key, label)?
        .ok_or_else(|| WorkflowError::ParseError(format!("missing required field: {label}")))
}

fn optional_text(map: &JsonMap, key: &str, label: &str) -> Result<Option<String>, WorkflowError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_text(v)
            .map(Some)
            .ok_or_else(|| WorkflowError::ParseError(format!("field '{label}' must be a scalar"))),
    }
}

/// Read an integer given as a number or a numeric string.
fn integer_field(map: &JsonMap, key: &str, step_id: &str) -> Result<Option<i64>, WorkflowError> {
    let invalid =
        || WorkflowError::ParseError(format!("step '{step_id}': retry.{key} must be an integer"));
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

// ---------------------------------------------------------------------------
// Stage 3: validation
// ---------------------------------------------------------------------------

/// Validate semantic constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - Name is not blank
/// - At least one step exists
/// - Step ids match the id pattern and are unique
/// - All `depends_on` references point to existing step ids
/// - The dependency graph is acyclic
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be blank".to_string(),
        ));
    }

    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if !is_valid_step_id(&step.id) {
            return Err(WorkflowError::ValidationError(format!(
                "invalid step id: '{}'",
                step.id
            )));
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
    }

    for step in &def.steps {
        for dep in &step.depends_on {
            if !seen_ids.contains(dep.as_str()) {
                return Err(WorkflowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                )));
            }
        }
    }

    DependencyResolver::resolve(&def.steps)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Composition and serialization
// ---------------------------------------------------------------------------

/// Parse text into a validated `WorkflowDefinition`.
pub fn parse_workflow(text: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let doc = parse_document(text)?;
    let def = definition_from_document(&doc)?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string (camelCase keys).
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Load and validate a workflow definition from a YAML or JSON file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow(&content)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
