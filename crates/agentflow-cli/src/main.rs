//! AgentFlow CLI entry point.
//!
//! Binary name: `agentflow`
//!
//! Parses CLI arguments, opens the database and wires services, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise verbosity picks the filter.
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,agentflow=debug",
        _ => "trace",
    };
    agentflow_observe::init_tracing(cli.otel, filter)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    agentflow_observe::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "agentflow", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;

    match cli.command {
        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, &state, cli.json).await?;
        }
        Commands::Run {
            workflow_id,
            inputs,
            background,
        } => {
            cli::execution::run_workflow(&state, &workflow_id, inputs.as_deref(), background, cli.json)
                .await?;
        }
        Commands::Execution { action } => {
            cli::execution::handle_execution_command(action, &state, cli.json).await?;
        }
        Commands::Worker {
            concurrency,
            purge_expired,
        } => {
            cli::worker::run_worker(&state, concurrency, purge_expired, cli.json).await?;
        }
        Commands::Agents => {
            cli::agents::list_agents(&state, cli.json)?;
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
