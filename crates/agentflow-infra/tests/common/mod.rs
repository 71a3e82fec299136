#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use uuid::Uuid;

use agentflow_core::repository::WorkflowRepository;
use agentflow_infra::sqlite::DatabasePool;
use agentflow_types::error::RepositoryError;
use agentflow_types::page::{Page, PageRequest};
use agentflow_types::workflow::{ExecutionStatus, JsonMap, WorkflowExecution, WorkflowRecord};

/// Three transform steps: parse an order, pick its total, render a label.
pub const ORDERS_YAML: &str = r#"
name: orders
version: "1.0"
description: shape an order into a label
steps:
  - id: load
    agent: transform
    config:
      data: '{"order": {"id": 7, "total": 19.5}}'
      expression: order
  - id: total
    agent: transform
    dependsOn: [load]
    config:
      data: "${steps.load.outputs.result}"
      expression: total
  - id: label
    agent: transform
    dependsOn: [total]
    config:
      data: "order ${inputs.customer} paid ${steps.total.outputs.result}"
"#;

pub fn json_map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub async fn sqlite_pool() -> DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("agentflow.db");
    std::mem::forget(dir);
    DatabasePool::open(&db_path).await.unwrap()
}

/// Poll `cond` until it holds, panicking after ten seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Repository wrapper whose execution saves can be switched to fail.
pub struct FailingSaves<R> {
    inner: R,
    fail: AtomicBool,
}

impl<R: WorkflowRepository> FailingSaves<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl<R: WorkflowRepository> WorkflowRepository for FailingSaves<R> {
    async fn save_workflow(&self, workflow: &WorkflowRecord) -> Result<(), RepositoryError> {
        self.inner.save_workflow(workflow).await
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<WorkflowRecord>, RepositoryError> {
        self.inner.get_workflow(id).await
    }

    async fn find_workflow_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowRecord>, RepositoryError> {
        self.inner.find_workflow_by_name_and_version(name, version).await
    }

    async fn list_workflows(&self, page: PageRequest) -> Result<Page<WorkflowRecord>, RepositoryError> {
        self.inner.list_workflows(page).await
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        self.inner.delete_workflow(id).await
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk full".to_string()));
        }
        self.inner.save_execution(execution).await
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        self.inner.get_execution(id).await
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        page: PageRequest,
    ) -> Result<Page<WorkflowExecution>, RepositoryError> {
        self.inner.list_executions(workflow_id, page).await
    }

    async fn list_executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        self.inner.list_executions_by_status(status).await
    }
}
