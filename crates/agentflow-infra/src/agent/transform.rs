//! `transform` agent: extract and reshape JSON between steps.
//!
//! The source document is config `data`, else input `data`, else the whole
//! input map. Paths are JSON pointers (`/body/title`) or dotted paths
//! (`body.title`); a path that does not resolve yields `null`.

use std::time::Instant;

use serde_json::Value;

use agentflow_core::agent::{Agent, AgentCapabilities, AgentContext, AgentResult};
use agentflow_types::workflow::JsonMap;

#[derive(Debug, Default)]
pub struct TransformAgent;

impl TransformAgent {
    pub fn new() -> Self {
        Self
    }
}

/// Resolve `path` against `root`.
pub fn extract(root: &Value, path: &str) -> Value {
    let pointer = if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path.replace('.', "/"))
    };
    root.pointer(&pointer).cloned().unwrap_or(Value::Null)
}

/// Templates always render to text, so string `data` holding a JSON object
/// or array is decoded back into structure.
fn source(ctx: &AgentContext) -> Value {
    let data = ctx
        .config_value("data")
        .or_else(|| ctx.inputs.get("data"))
        .cloned()
        .unwrap_or_else(|| Value::Object(ctx.inputs.clone()));

    match data {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
            _ => Value::String(text),
        },
        other => other,
    }
}

fn transform(ctx: &AgentContext) -> Result<JsonMap, String> {
    let data = source(ctx);
    let mut outputs = JsonMap::new();

    match (ctx.config_value("expression"), ctx.config_value("mappings")) {
        (Some(Value::String(expression)), _) => {
            outputs.insert("result".to_string(), extract(&data, expression));
        }
        (Some(other), _) if !other.is_null() => {
            return Err("config 'expression' must be a string".to_string());
        }
        (_, Some(Value::Object(mappings))) => {
            for (key, path) in mappings {
                let path = path
                    .as_str()
                    .ok_or_else(|| format!("mapping '{key}' must be a string path"))?;
                outputs.insert(key.clone(), extract(&data, path));
            }
        }
        (_, Some(other)) if !other.is_null() => {
            return Err("config 'mappings' must be an object".to_string());
        }
        _ => {
            outputs.insert("result".to_string(), data);
        }
    }
    Ok(outputs)
}

impl Agent for TransformAgent {
    fn agent_type(&self) -> &str {
        "transform"
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities::new(
            "transform",
            "Transforms data using JSON Pointer or dotted-path expressions. Extract and restructure data.",
        )
    }

    async fn execute(&self, ctx: &AgentContext) -> AgentResult {
        let start = Instant::now();
        match transform(ctx) {
            Ok(outputs) => AgentResult::success(outputs, start.elapsed()),
            Err(e) => AgentResult::failure(format!("Transform failed: {e}"), start.elapsed()),
        }
    }
}
