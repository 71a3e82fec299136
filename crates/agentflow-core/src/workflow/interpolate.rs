//! `${...}` template resolution against workflow inputs and step outputs.
//!
//! Supported expressions:
//! - `inputs` -- the whole inputs mapping
//! - `inputs.a.b` -- dotted traversal into inputs
//! - `steps.<id>.outputs.x` / `steps['<id>'].outputs.x` -- a completed step's
//!   recorded outputs (each step is stored as `{outputs: ...}`)
//! - `name` -- a top-level key in inputs
//!
//! Substituted text may itself contain markers. Resolution repeats until a
//! fixed point, bounded by [`MAX_INTERPOLATION_PASSES`].

use serde_json::Value;
use thiserror::Error;

use agentflow_types::workflow::JsonMap;

/// Upper bound on substitution passes over a single template.
pub const MAX_INTERPOLATION_PASSES: usize = 5;

const MARKER_OPEN: &str = "${";
const MARKER_CLOSE: char = '}';

/// Errors raised while resolving a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    /// The expression names nothing defined in the context.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// The path traverses a non-mapping value or is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The referenced step has not completed (or does not exist).
    #[error("step not found or not yet executed: {0}")]
    StepNotFound(String),

    /// Markers kept producing new markers past the pass limit.
    #[error("maximum interpolation depth of {0} passes exceeded")]
    DepthExceeded(usize),
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Values visible to templates while a step is being prepared.
#[derive(Debug, Clone, Default)]
pub struct InterpolationContext {
    inputs: JsonMap,
    /// Step id -> `{"outputs": <recorded outputs>}`.
    steps: JsonMap,
}

impl InterpolationContext {
    pub fn new(inputs: JsonMap) -> Self {
        Self {
            inputs,
            steps: JsonMap::new(),
        }
    }

    /// Record a completed step's outputs under its id.
    pub fn record_step(&mut self, step_id: &str, outputs: JsonMap) {
        let mut entry = JsonMap::new();
        entry.insert("outputs".to_string(), Value::Object(outputs));
        self.steps.insert(step_id.to_string(), Value::Object(entry));
    }

    pub fn inputs(&self) -> &JsonMap {
        &self.inputs
    }

    /// Accumulated `{id: {outputs: ...}}` map.
    pub fn steps(&self) -> &JsonMap {
        &self.steps
    }

    pub fn into_steps(self) -> JsonMap {
        self.steps
    }
}

// ---------------------------------------------------------------------------
// Interpolator
// ---------------------------------------------------------------------------

/// Resolves `${...}` markers in strings and nested JSON values.
pub struct VariableInterpolator;

impl VariableInterpolator {
    /// Substitute every marker in `template`.
    ///
    /// A template without markers is returned unchanged. Resolution stops
    /// at a fixed point; if the text is still changing after
    /// `MAX_INTERPOLATION_PASSES` passes the call fails.
    pub fn interpolate(
        template: &str,
        ctx: &InterpolationContext,
    ) -> Result<String, InterpolationError> {
        if !template.contains(MARKER_OPEN) {
            return Ok(template.to_string());
        }

        let mut current = template.to_string();
        for _ in 0..MAX_INTERPOLATION_PASSES {
            let next = substitute_once(&current, ctx)?;
            if !next.contains(MARKER_OPEN) || next == current {
                return Ok(next);
            }
            current = next;
        }
        Err(InterpolationError::DepthExceeded(MAX_INTERPOLATION_PASSES))
    }

    /// Structure-preserving traversal: strings are interpolated, mapping
    /// values and sequence elements recursed into, other scalars copied.
    pub fn interpolate_value(
        value: &Value,
        ctx: &InterpolationContext,
    ) -> Result<Value, InterpolationError> {
        match value {
            Value::String(s) => Self::interpolate(s, ctx).map(Value::String),
            Value::Object(map) => Self::interpolate_map(map, ctx).map(Value::Object),
            Value::Array(items) => items
                .iter()
                .map(|item| Self::interpolate_value(item, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    /// Interpolate every value of a mapping; keys are untouched.
    pub fn interpolate_map(
        map: &JsonMap,
        ctx: &InterpolationContext,
    ) -> Result<JsonMap, InterpolationError> {
        map.iter()
            .map(|(k, v)| Ok::<_, InterpolationError>((k.clone(), Self::interpolate_value(v, ctx)?)))
            .collect()
    }

    /// Evaluate one expression (the text between `${` and `}`).
    pub fn evaluate(expression: &str, ctx: &InterpolationContext) -> Result<Value, InterpolationError> {
        let expr = expression.trim();

        if expr == "inputs" {
            return Ok(Value::Object(ctx.inputs.clone()));
        }
        if let Some(path) = expr.strip_prefix("inputs.") {
            return resolve_path(&ctx.inputs, path, expr);
        }
        if let Some(rest) = expr.strip_prefix("steps[") {
            let (step_id, path) = split_bracket_reference(rest, expr)?;
            return resolve_step(ctx, step_id, path, expr);
        }
        if let Some(rest) = expr.strip_prefix("steps.") {
            let (step_id, path) = match rest.split_once('.') {
                Some((id, path)) => (id, Some(path)),
                None => (rest, None),
            };
            return resolve_step(ctx, step_id, path, expr);
        }

        ctx.inputs
            .get(expr)
            .cloned()
            .ok_or_else(|| InterpolationError::UnknownVariable(expr.to_string()))
    }
}

/// Canonical text form used for substitution.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// One left-to-right pass replacing each complete `${expr}` marker.
fn substitute_once(template: &str, ctx: &InterpolationContext) -> Result<String, InterpolationError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(MARKER_OPEN) {
        let after_open = &rest[start + MARKER_OPEN.len()..];
        let Some(end) = after_open.find(MARKER_CLOSE) else {
            break;
        };
        if end == 0 {
            // `${}` is left as literal text.
            out.push_str(&rest[..start + MARKER_OPEN.len() + 1]);
            rest = &after_open[1..];
            continue;
        }

        out.push_str(&rest[..start]);
        let value = VariableInterpolator::evaluate(&after_open[..end], ctx)?;
        out.push_str(&value_to_string(&value));
        rest = &after_open[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Split `'id'].path` (the text after `steps[`) into the id and optional path.
fn split_bracket_reference<'a>(
    rest: &'a str,
    expr: &str,
) -> Result<(&'a str, Option<&'a str>), InterpolationError> {
    let malformed = || InterpolationError::InvalidPath(format!("malformed step reference '{expr}'"));

    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"').ok_or_else(malformed)?;
    let body = &rest[1..];
    let close = format!("{quote}]");
    let end = body.find(&close).ok_or_else(malformed)?;

    let step_id = &body[..end];
    let tail = &body[end + close.len()..];
    match tail {
        "" => Ok((step_id, None)),
        _ => tail
            .strip_prefix('.')
            .map(|path| (step_id, Some(path)))
            .ok_or_else(malformed),
    }
}

fn resolve_step(
    ctx: &InterpolationContext,
    step_id: &str,
    path: Option<&str>,
    expr: &str,
) -> Result<Value, InterpolationError> {
    let entry = ctx
        .steps
        .get(step_id)
        .ok_or_else(|| InterpolationError::StepNotFound(step_id.to_string()))?;

    match (path, entry) {
        (None, value) => Ok(value.clone()),
        (Some(path), Value::Object(map)) => resolve_path(map, path, expr),
        (Some(_), _) => Err(InterpolationError::InvalidPath(format!(
            "step '{step_id}' has no structured outputs"
        ))),
    }
}

/// Dotted traversal starting from a mapping.
fn resolve_path(root: &JsonMap, path: &str, expr: &str) -> Result<Value, InterpolationError> {
    let mut current: Option<&Value> = None;

    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(InterpolationError::InvalidPath(format!(
                "empty path segment in '{expr}'"
            )));
        }
        let map = match current {
            None => root,
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(InterpolationError::InvalidPath(format!(
                    "cannot access '{segment}' on non-object value in '{expr}'"
                )));
            }
        };
        current = Some(
            map.get(segment)
                .ok_or_else(|| InterpolationError::UnknownVariable(expr.to_string()))?,
        );
    }

    Ok(current.cloned().unwrap_or_else(|| Value::Object(root.clone())))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
