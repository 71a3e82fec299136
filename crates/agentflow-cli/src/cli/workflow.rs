//! CLI workflow management subcommands.
//!
//! Provides create, list, show and delete operations for registered workflow
//! definitions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use agentflow_core::service::ServiceError;
use agentflow_core::workflow::WorkflowError;
use agentflow_core::workflow::definition::serialize_workflow_yaml;
use agentflow_types::page::PageRequest;
use agentflow_types::workflow::WorkflowRecord;

use super::{parse_id, short_id};
use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Register a workflow from a YAML or JSON file.
    Create {
        /// Path to the workflow document.
        file: PathBuf,

        /// Recorded as the workflow's author.
        #[arg(long)]
        created_by: Option<String>,
    },

    /// List registered workflows, newest first.
    #[command(alias = "ls")]
    List {
        /// Zero-based page number.
        #[arg(long, default_value = "0")]
        page: u32,

        /// Page size (1-100).
        #[arg(long, default_value = "20")]
        size: u32,
    },

    /// Show a workflow definition.
    Show {
        /// Workflow UUID.
        id: String,
    },

    /// Delete a workflow and all of its executions.
    #[command(alias = "rm")]
    Delete {
        /// Workflow UUID.
        id: String,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Create { file, created_by } => {
            handle_create(&file, created_by, state, json).await
        }
        WorkflowCommand::List { page, size } => handle_list(page, size, state, json).await,
        WorkflowCommand::Show { id } => handle_show(&id, state, json).await,
        WorkflowCommand::Delete { id } => handle_delete(&id, state, json).await,
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

async fn handle_create(
    file: &Path,
    created_by: Option<String>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let record = state
        .service
        .create_from_yaml(&text, created_by)
        .await
        .map_err(|e| match e {
            ServiceError::Workflow(WorkflowError::ParseError(msg)) => {
                anyhow::anyhow!("Failed to parse workflow: {msg}")
            }
            ServiceError::Workflow(other) => anyhow::anyhow!("Workflow validation failed: {other}"),
            other => anyhow::anyhow!("Failed to register workflow: {other}"),
        })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Registered workflow '{}' v{}",
        style("*").green().bold(),
        style(&record.name).cyan(),
        record.version
    );
    println!("  ID: {}", record.id);
    println!("  Steps: {}", record.definition.steps.len());
    println!();
    println!(
        "  Run it with: {}",
        style(format!("agentflow run {}", record.id)).dim()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(page: u32, size: u32, state: &AppState, json: bool) -> Result<()> {
    let result = state
        .service
        .list_workflows(PageRequest::new(page, size))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list workflows: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.items.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!(
            "  Create one with: {}",
            style("agentflow workflow create <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Version"),
            Cell::new("Steps"),
            Cell::new("Created"),
        ]);

    for w in &result.items {
        table.add_row(vec![
            Cell::new(w.id),
            Cell::new(&w.name),
            Cell::new(&w.version),
            Cell::new(w.definition.steps.len()),
            Cell::new(w.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  {}",
        style(format!(
            "page {} of {} ({} total)",
            result.page + 1,
            result.total_pages().max(1),
            result.total
        ))
        .dim()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

async fn handle_show(id: &str, state: &AppState, json: bool) -> Result<()> {
    let id = parse_id(id, "workflow")?;
    let record = state.service.find_workflow(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    display_workflow(&record)
}

fn display_workflow(record: &WorkflowRecord) -> Result<()> {
    println!();
    println!(
        "  {} {} v{}",
        style("Workflow:").bold(),
        style(&record.name).cyan(),
        record.version
    );
    println!("  ID: {}", record.id);
    if let Some(ref description) = record.description {
        println!("  Description: {description}");
    }
    if let Some(ref author) = record.created_by {
        println!("  Created by: {author}");
    }
    println!("  Created: {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Agent"),
            Cell::new("Depends on"),
            Cell::new("Retries"),
        ]);

    for step in &record.definition.steps {
        let deps = if step.depends_on.is_empty() {
            "-".to_string()
        } else {
            step.depends_on.join(", ")
        };
        let retries = step
            .retry
            .as_ref()
            .map(|r| format!("{} x {}ms", r.max_retries, r.delay_ms))
            .unwrap_or_else(|| "none".to_string());
        table.add_row(vec![
            Cell::new(&step.id),
            Cell::new(&step.agent),
            Cell::new(deps),
            Cell::new(retries),
        ]);
    }
    println!("{table}");
    println!();

    let yaml = serialize_workflow_yaml(&record.definition)
        .map_err(|e| anyhow::anyhow!("Failed to render workflow: {e}"))?;
    println!("{}", style("── Definition ──").dim());
    println!("{yaml}");

    Ok(())
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

async fn handle_delete(id: &str, state: &AppState, json: bool) -> Result<()> {
    let id = parse_id(id, "workflow")?;
    let record = state.service.find_workflow(&id).await?;
    state.service.delete_workflow(&id).await?;

    if json {
        let out = serde_json::json!({
            "id": id.to_string(),
            "name": record.name,
            "deleted": true,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Deleted workflow '{}' ({})",
            style("*").green().bold(),
            style(&record.name).cyan(),
            short_id(&id)
        );
        println!();
    }

    Ok(())
}
