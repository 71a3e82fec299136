//! Application state wiring the SQLite adapters into the core services.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use agentflow_core::agent::AgentRegistry;
use agentflow_core::service::WorkflowService;
use agentflow_core::workflow::WorkflowExecutor;
use agentflow_infra::agent::default_registry;
use agentflow_infra::config::load_config;
use agentflow_infra::filesystem::{database_path, ensure_data_dir, resolve_data_dir};
use agentflow_infra::sqlite::{
    DatabasePool, SqliteExecutionQueue, SqliteStateStore, SqliteWorkflowRepository,
};
use agentflow_types::config::AgentflowConfig;

/// Workflow service pinned to the SQLite adapters.
pub type ConcreteWorkflowService = WorkflowService<SqliteWorkflowRepository, SqliteExecutionQueue>;

/// Shared state for every command.
pub struct AppState {
    pub service: ConcreteWorkflowService,
    pub repo: Arc<SqliteWorkflowRepository>,
    pub agents: Arc<AgentRegistry>,
    pub queue: Arc<SqliteExecutionQueue>,
    pub state_store: Arc<SqliteStateStore>,
    pub config: AgentflowConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load config, open the database and wire
    /// the services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_data_dir(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;

        let db_path = database_path(&data_dir);
        let pool = DatabasePool::open(&db_path)
            .await
            .with_context(|| format!("failed to open database {}", db_path.display()))?;

        let repo = Arc::new(SqliteWorkflowRepository::new(pool.clone()));
        let queue = Arc::new(SqliteExecutionQueue::new(pool.clone(), &config.queue));
        let state_store = Arc::new(SqliteStateStore::new(pool));
        let agents = Arc::new(default_registry(Vec::new()));

        let executor = Arc::new(WorkflowExecutor::new(repo.clone(), agents.clone()));
        let service = WorkflowService::new(executor, queue.clone());

        tracing::debug!(data_dir = %data_dir.display(), "application state ready");

        Ok(Self {
            service,
            repo,
            agents,
            queue,
            state_store,
            config,
            data_dir,
        })
    }
}
