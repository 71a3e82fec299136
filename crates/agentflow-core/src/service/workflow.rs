//! Workflow management service.
//!
//! Registers workflow documents, starts executions synchronously or through
//! the execution queue, and answers lookups for both.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use agentflow_types::error::RepositoryError;
use agentflow_types::message::WorkflowMessage;
use agentflow_types::page::{Page, PageRequest};
use agentflow_types::workflow::{JsonMap, WorkflowExecution, WorkflowRecord};

use crate::agent::AgentCapabilities;
use crate::queue::{ExecutionQueue, QueueError};
use crate::repository::WorkflowRepository;
use crate::workflow::definition::{WorkflowError, parse_workflow};
use crate::workflow::executor::{ExecutorError, WorkflowExecutor};

/// Errors returned by [`WorkflowService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("workflow '{name}' version '{version}' already exists")]
    AlreadyExists { name: String, version: String },

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// How `execute` runs the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Run inline and return the terminal record.
    #[default]
    Sync,
    /// Persist a PENDING record, enqueue it, and return immediately.
    Async,
}

/// Service orchestrating workflow registration and execution.
///
/// Generic over repository and queue traits to maintain clean
/// architecture -- agentflow-core never depends on agentflow-infra.
pub struct WorkflowService<R: WorkflowRepository, Q: ExecutionQueue> {
    repo: Arc<R>,
    executor: Arc<WorkflowExecutor<R>>,
    queue: Arc<Q>,
}

impl<R: WorkflowRepository, Q: ExecutionQueue> WorkflowService<R, Q> {
    /// `executor` must share `repo` so executions land in the same store.
    pub fn new(executor: Arc<WorkflowExecutor<R>>, queue: Arc<Q>) -> Self {
        Self {
            repo: executor.repo().clone(),
            executor,
            queue,
        }
    }

    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Parse, validate and register a workflow document.
    ///
    /// Nothing is stored if the document is invalid.
    pub async fn create_from_yaml(
        &self,
        text: &str,
        created_by: Option<String>,
    ) -> Result<WorkflowRecord, ServiceError> {
        let definition = parse_workflow(text)?;

        if self
            .repo
            .find_workflow_by_name_and_version(&definition.name, &definition.version)
            .await?
            .is_some()
        {
            return Err(ServiceError::AlreadyExists {
                name: definition.name,
                version: definition.version,
            });
        }

        let record = WorkflowRecord::new(definition, created_by);
        self.repo.save_workflow(&record).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => ServiceError::AlreadyExists {
                name: record.name.clone(),
                version: record.version.clone(),
            },
            other => ServiceError::Repository(other),
        })?;

        tracing::info!(
            workflow_id = %record.id,
            name = record.name.as_str(),
            version = record.version.as_str(),
            steps = record.definition.steps.len(),
            "registered workflow"
        );
        Ok(record)
    }

    pub async fn find_workflow(&self, id: &Uuid) -> Result<WorkflowRecord, ServiceError> {
        self.repo
            .get_workflow(id)
            .await?
            .ok_or(ServiceError::WorkflowNotFound(*id))
    }

    pub async fn list_workflows(&self, page: PageRequest) -> Result<Page<WorkflowRecord>, ServiceError> {
        Ok(self.repo.list_workflows(page).await?)
    }

    /// Delete a workflow; its executions go with it.
    pub async fn delete_workflow(&self, id: &Uuid) -> Result<(), ServiceError> {
        if !self.repo.delete_workflow(id).await? {
            return Err(ServiceError::WorkflowNotFound(*id));
        }
        tracing::info!(workflow_id = %id, "deleted workflow");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Start an execution of a registered workflow.
    pub async fn execute(
        &self,
        workflow_id: &Uuid,
        inputs: JsonMap,
        mode: ExecutionMode,
    ) -> Result<WorkflowExecution, ServiceError> {
        let workflow = self.find_workflow(workflow_id).await?;

        let mut execution = WorkflowExecution::new(workflow.id, inputs.clone());
        self.repo.save_execution(&execution).await?;

        match mode {
            ExecutionMode::Sync => {
                let finished = self
                    .executor
                    .execute(&workflow.definition, execution, inputs)
                    .await?;
                Ok(finished)
            }
            ExecutionMode::Async => {
                let message = WorkflowMessage::new(workflow.id, execution.id, inputs);
                if let Err(e) = self.queue.enqueue(&message).await {
                    tracing::error!(execution_id = %execution.id, error = %e, "failed to queue execution");
                    execution.mark_failed(format!("failed to queue execution: {e}"));
                    self.repo.save_execution(&execution).await?;
                    return Err(e.into());
                }
                tracing::info!(
                    execution_id = %execution.id,
                    workflow_id = %workflow.id,
                    "queued workflow execution"
                );
                Ok(execution)
            }
        }
    }

    pub async fn find_execution(&self, id: &Uuid) -> Result<WorkflowExecution, ServiceError> {
        self.repo
            .get_execution(id)
            .await?
            .ok_or(ServiceError::ExecutionNotFound(*id))
    }

    /// Page through a workflow's executions, newest first.
    pub async fn list_executions(
        &self,
        workflow_id: &Uuid,
        page: PageRequest,
    ) -> Result<Page<WorkflowExecution>, ServiceError> {
        self.find_workflow(workflow_id).await?;
        Ok(self.repo.list_executions(workflow_id, page).await?)
    }

    pub fn list_agents(&self) -> Vec<AgentCapabilities> {
        self.executor.agents().list()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::BoxAgent;
    use crate::testing::{EchoAgent, MemoryQueue, MemoryRepo, json_map, registry};
    use agentflow_types::workflow::ExecutionStatus;
    use serde_json::json;

    const DOC: &str = r#"
name: greet
version: "2.0"
steps:
  - id: hello
    agent: echo
    config:
      text: "hi ${inputs.name}"
"#;

    fn service() -> (WorkflowService<MemoryRepo, MemoryQueue>, Arc<MemoryRepo>, Arc<MemoryQueue>) {
        let repo = Arc::new(MemoryRepo::default());
        let queue = Arc::new(MemoryQueue::default());
        let executor = Arc::new(WorkflowExecutor::new(
            repo.clone(),
            registry(vec![BoxAgent::new(EchoAgent::new("echo"))]),
        ));
        (WorkflowService::new(executor, queue.clone()), repo, queue)
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (svc, _, _) = service();
        let record = svc.create_from_yaml(DOC, Some("ops".to_string())).await.unwrap();
        assert_eq!(record.name, "greet");
        assert_eq!(record.version, "2.0");
        assert_eq!(record.created_by.as_deref(), Some("ops"));

        let found = svc.find_workflow(&record.id).await.unwrap();
        assert_eq!(found.definition, record.definition);
    }

    #[tokio::test]
    async fn test_duplicate_name_and_version_rejected() {
        let (svc, _, _) = service();
        svc.create_from_yaml(DOC, None).await.unwrap();
        let err = svc.create_from_yaml(DOC, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists { .. }), "got: {err}");

        let bumped = DOC.replace("\"2.0\"", "\"2.1\"");
        svc.create_from_yaml(&bumped, None).await.unwrap();
        assert_eq!(svc.list_workflows(PageRequest::default()).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_invalid_document_stores_nothing() {
        let (svc, repo, _) = service();
        let err = svc.create_from_yaml("name: broken\nsteps: []\n", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Workflow(_)), "got: {err}");
        assert_eq!(repo.workflow_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_execution_returns_terminal_record() {
        let (svc, _, queue) = service();
        let record = svc.create_from_yaml(DOC, None).await.unwrap();

        let execution = svc
            .execute(&record.id, json_map(json!({"name": "ada"})), ExecutionMode::Sync)
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(
            execution.outputs.unwrap()["steps"]["hello"]["outputs"]["text"],
            json!("hi ada")
        );
        assert!(queue.published().is_empty());
    }

    #[tokio::test]
    async fn test_async_execution_enqueues_pending_record() {
        let (svc, _, queue) = service();
        let record = svc.create_from_yaml(DOC, None).await.unwrap();

        let execution = svc
            .execute(&record.id, json_map(json!({"name": "ada"})), ExecutionMode::Async)
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Pending);
        let published = queue.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].execution_id, execution.id);
        assert_eq!(published[0].workflow_id, record.id);
        assert_eq!(published[0].inputs["name"], json!("ada"));

        let stored = svc.find_execution(&execution.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Pending);
    }

    #[tokio::test]
    async fn test_async_enqueue_failure_marks_execution_failed() {
        let (svc, repo, queue) = service();
        let record = svc.create_from_yaml(DOC, None).await.unwrap();
        queue.fail_enqueues(true);

        let err = svc
            .execute(&record.id, JsonMap::new(), ExecutionMode::Async)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Queue(_)));

        let page = repo.list_executions(&record.id, PageRequest::default()).await.unwrap();
        assert_eq!(page.items[0].status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let (svc, _, _) = service();
        let id = Uuid::now_v7();
        assert!(matches!(
            svc.execute(&id, JsonMap::new(), ExecutionMode::Sync).await,
            Err(ServiceError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            svc.find_execution(&id).await,
            Err(ServiceError::ExecutionNotFound(_))
        ));
        assert!(matches!(
            svc.delete_workflow(&id).await,
            Err(ServiceError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_executions() {
        let (svc, repo, _) = service();
        let record = svc.create_from_yaml(DOC, None).await.unwrap();
        let execution = svc
            .execute(&record.id, JsonMap::new(), ExecutionMode::Sync)
            .await
            .unwrap();

        svc.delete_workflow(&record.id).await.unwrap();
        assert!(repo.execution(&execution.id).is_none());
        assert!(matches!(
            svc.find_workflow(&record.id).await,
            Err(ServiceError::WorkflowNotFound(_))
        ));
    }

    #[test]
    fn test_list_agents() {
        let (svc, _, _) = service();
        let agents = svc.list_agents();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].agent_type, "echo");
    }
}
