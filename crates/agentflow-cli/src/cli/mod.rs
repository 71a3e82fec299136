//! CLI command definitions for the `agentflow` binary.
//!
//! Uses clap derive macros. Resource commands are noun-verb
//! (`agentflow workflow create`, `agentflow execution show`).

pub mod agents;
pub mod execution;
pub mod worker;
pub mod workflow;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use uuid::Uuid;

use agentflow_types::workflow::ExecutionStatus;

/// Run declarative multi-step agent workflows.
#[derive(Parser)]
#[command(name = "agentflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "AGENTFLOW_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register, inspect and delete workflows.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Execute a registered workflow.
    Run {
        /// Workflow UUID.
        workflow_id: String,

        /// Runtime inputs as a JSON object.
        #[arg(long)]
        inputs: Option<String>,

        /// Queue the execution for a worker instead of running it inline.
        #[arg(long = "async")]
        background: bool,
    },

    /// Inspect executions.
    #[command(alias = "exec")]
    Execution {
        #[command(subcommand)]
        action: execution::ExecutionCommand,
    },

    /// Consume queued executions until Ctrl+C.
    Worker {
        /// Number of concurrent worker tasks (defaults to `[worker]` config).
        #[arg(long, short)]
        concurrency: Option<usize>,

        /// Purge expired coordination records before starting.
        #[arg(long)]
        purge_expired: bool,
    },

    /// List registered agent types.
    Agents,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Parse a UUID argument with a readable error.
pub fn parse_id(raw: &str, what: &str) -> anyhow::Result<Uuid> {
    raw.trim()
        .parse::<Uuid>()
        .with_context(|| format!("Invalid {what} ID: '{raw}'"))
}

/// First eight characters of an id, for tables.
pub fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

pub fn format_status(status: ExecutionStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        ExecutionStatus::Pending => cell.fg(Color::Yellow),
        ExecutionStatus::Running => cell.fg(Color::Blue),
        ExecutionStatus::Completed => cell.fg(Color::Green),
        ExecutionStatus::Failed => cell.fg(Color::Red),
        ExecutionStatus::Cancelled | ExecutionStatus::Skipped => cell.fg(Color::DarkYellow),
    }
}
