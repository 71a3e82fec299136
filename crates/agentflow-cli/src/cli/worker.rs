//! `agentflow worker`: consume the execution queue until Ctrl+C.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use console::style;
use tokio_util::sync::CancellationToken;

use agentflow_core::coordination::{ExecutionCoordinator, WorkerPool, WorkflowConsumer};
use agentflow_core::repository::WorkflowRepository;
use agentflow_core::workflow::WorkflowExecutor;
use agentflow_types::workflow::ExecutionStatus;

use crate::state::AppState;

pub async fn run_worker(
    state: &AppState,
    concurrency: Option<usize>,
    purge_expired: bool,
    json: bool,
) -> Result<()> {
    let concurrency = concurrency.unwrap_or(state.config.worker.concurrency);

    if purge_expired {
        let purged = state.state_store.purge_expired().await?;
        tracing::info!(purged, "purged expired coordination records");
    }

    // Executions a crashed worker left behind stay visible here; the queue
    // lease hands their messages out again.
    for status in [ExecutionStatus::Pending, ExecutionStatus::Running] {
        let stale = state.repo.list_executions_by_status(status).await?;
        if !stale.is_empty() {
            tracing::info!(status = %status, count = stale.len(), "unfinished executions on startup");
        }
    }

    let cancel = CancellationToken::new();
    let executor = Arc::new(
        WorkflowExecutor::new(state.repo.clone(), state.agents.clone())
            .with_cancellation(cancel.clone()),
    );
    let coordinator = Arc::new(ExecutionCoordinator::new(
        state.state_store.clone(),
        state.config.coordination.clone(),
    ));
    let consumer = Arc::new(WorkflowConsumer::new(executor, coordinator, state.queue.clone()));
    let pool = WorkerPool::new(
        consumer,
        concurrency,
        state.config.queue.poll_interval(),
        cancel.clone(),
    );

    if !json {
        println!();
        println!(
            "  {} Worker started with {} task(s) on {}",
            style("⚡").bold(),
            concurrency,
            style(state.data_dir.display()).cyan()
        );
        println!("  {}", style("Press Ctrl+C to stop").dim());
        println!();
    }

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested");
        signal_cancel.cancel();
    });

    let stats = pool.run().await;

    let processed = stats.processed.load(Ordering::Relaxed);
    let skipped = stats.skipped.load(Ordering::Relaxed);
    let faulted = stats.faulted.load(Ordering::Relaxed);
    let dead_lettered = stats.dead_lettered.load(Ordering::Relaxed);

    if json {
        let out = serde_json::json!({
            "processed": processed,
            "skipped": skipped,
            "faulted": faulted,
            "deadLettered": dead_lettered,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!("  Worker stopped.");
        println!("  Processed:     {}", style(processed).green());
        println!("  Skipped:       {skipped}");
        if faulted > 0 {
            println!("  Faulted:       {}", style(faulted).yellow());
        }
        if dead_lettered > 0 {
            println!("  Dead-lettered: {}", style(dead_lettered).red());
        }
        println!();
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
