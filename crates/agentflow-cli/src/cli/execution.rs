//! Running workflows and inspecting their executions.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;

use agentflow_core::coordination::ExecutionCoordinator;
use agentflow_core::service::ExecutionMode;
use agentflow_types::page::PageRequest;
use agentflow_types::workflow::{ExecutionStatus, JsonMap, WorkflowExecution};

use super::{format_status, parse_id, short_id};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum ExecutionCommand {
    /// Show an execution and its step records.
    Show {
        /// Execution UUID.
        id: String,
    },

    /// List a workflow's executions, newest first.
    #[command(alias = "ls")]
    List {
        /// Workflow UUID.
        workflow_id: String,

        /// Zero-based page number.
        #[arg(long, default_value = "0")]
        page: u32,

        /// Page size (1-100).
        #[arg(long, default_value = "20")]
        size: u32,
    },
}

pub async fn handle_execution_command(
    cmd: ExecutionCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        ExecutionCommand::Show { id } => handle_show(&id, state, json).await,
        ExecutionCommand::List {
            workflow_id,
            page,
            size,
        } => handle_list(&workflow_id, page, size, state, json).await,
    }
}

/// Parse `--inputs` into a JSON object; absent means empty.
fn parse_inputs(raw: Option<&str>) -> Result<JsonMap> {
    let Some(raw) = raw else {
        return Ok(JsonMap::new());
    };
    match serde_json::from_str::<Value>(raw).context("Invalid JSON inputs")? {
        Value::Object(map) => Ok(map),
        _ => bail!("Inputs must be a JSON object"),
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn run_workflow(
    state: &AppState,
    workflow_id: &str,
    inputs: Option<&str>,
    background: bool,
    json: bool,
) -> Result<()> {
    let workflow_id = parse_id(workflow_id, "workflow")?;
    let inputs = parse_inputs(inputs)?;
    let mode = if background {
        ExecutionMode::Async
    } else {
        ExecutionMode::Sync
    };

    let execution = state.service.execute(&workflow_id, inputs, mode).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
        return Ok(());
    }

    println!();
    match execution.status {
        ExecutionStatus::Pending => {
            println!(
                "  {} Queued execution {}",
                style("*").green().bold(),
                style(execution.id).cyan()
            );
            println!(
                "  Start a worker with: {}",
                style("agentflow worker").dim()
            );
            println!(
                "  Check progress: {}",
                style(format!("agentflow execution show {}", execution.id)).dim()
            );
            println!();
        }
        _ => display_execution(&execution, None),
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

async fn handle_show(id: &str, state: &AppState, json: bool) -> Result<()> {
    let id = parse_id(id, "execution")?;
    let execution = state.service.find_execution(&id).await?;

    // The projection only exists for executions that went through a worker.
    let coordinator =
        ExecutionCoordinator::new(state.state_store.clone(), state.config.coordination.clone());
    let projection = match coordinator.get_state(id).await {
        Ok(p) => p.map(|s| s.to_string()),
        Err(e) => {
            tracing::warn!(execution_id = %id, error = %e, "failed to read execution state");
            None
        }
    };

    if json {
        let mut out = serde_json::to_value(&execution)?;
        if let Value::Object(ref mut map) = out {
            map.insert(
                "workerState".to_string(),
                projection.map(Value::String).unwrap_or(Value::Null),
            );
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    display_execution(&execution, projection.as_deref());
    Ok(())
}

fn display_execution(execution: &WorkflowExecution, projection: Option<&str>) {
    let status = match execution.status {
        ExecutionStatus::Completed => style(execution.status.as_str()).green(),
        ExecutionStatus::Failed => style(execution.status.as_str()).red(),
        _ => style(execution.status.as_str()).yellow(),
    };

    println!(
        "  {} {}",
        style("Execution:").bold(),
        style(execution.id).cyan()
    );
    println!("  Workflow: {}", execution.workflow_id);
    println!("  Status: {status}");
    if let Some(state) = projection {
        println!("  Worker state: {state}");
    }
    if let Some(ref step) = execution.current_step_id {
        println!("  Current step: {step}");
    }
    println!("  Created: {}", execution.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(started) = execution.started_at {
        println!("  Started: {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(completed) = execution.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(ref err) = execution.error {
        println!("  Error: {}", style(err).red());
    }
    println!();

    if !execution.step_executions.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Agent"),
                Cell::new("Status"),
                Cell::new("Retries"),
                Cell::new("Error"),
            ]);

        for s in &execution.step_executions {
            table.add_row(vec![
                Cell::new(&s.step_id),
                Cell::new(&s.agent_type),
                format_status(s.status),
                Cell::new(s.retry_count),
                Cell::new(s.error.as_deref().unwrap_or("-")),
            ]);
        }
        println!("{table}");
        println!();
    }

    if let Some(ref outputs) = execution.outputs {
        if let Ok(pretty) = serde_json::to_string_pretty(outputs) {
            println!("{}", style("── Outputs ──").dim());
            println!("{pretty}");
            println!();
        }
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(
    workflow_id: &str,
    page: u32,
    size: u32,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let workflow_id = parse_id(workflow_id, "workflow")?;
    let result = state
        .service
        .list_executions(&workflow_id, PageRequest::new(page, size))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.items.is_empty() {
        println!();
        println!("  No executions for workflow {}.", short_id(&workflow_id));
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Execution").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Steps"),
            Cell::new("Created"),
            Cell::new("Completed"),
        ]);

    for e in &result.items {
        let completed = e
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(e.id),
            format_status(e.status),
            Cell::new(e.step_executions.len()),
            Cell::new(e.created_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(completed),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  {}",
        style(format!("{} of {} executions", result.items.len(), result.total)).dim()
    );
    println!();

    Ok(())
}
