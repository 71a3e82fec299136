//! Service, executor and worker pool driven over both adapter families.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use agentflow_core::coordination::{
    ExecutionCoordinator, ExecutionState, ExecutionStateStore, WorkerPool, WorkflowConsumer,
};
use agentflow_core::queue::ExecutionQueue;
use agentflow_core::repository::WorkflowRepository;
use agentflow_core::service::{ExecutionMode, ServiceError, WorkflowService};
use agentflow_core::workflow::{WorkflowError, WorkflowExecutor};
use agentflow_infra::agent::default_registry;
use agentflow_infra::memory::{InMemoryExecutionQueue, InMemoryStateStore, InMemoryWorkflowRepository};
use agentflow_infra::sqlite::{SqliteExecutionQueue, SqliteStateStore, SqliteWorkflowRepository};
use agentflow_types::config::{CoordinationConfig, QueueConfig};
use agentflow_types::page::PageRequest;
use agentflow_types::workflow::{ExecutionStatus, JsonMap};

use common::{ORDERS_YAML, json_map, sqlite_pool, wait_until};

async fn orders_round_trip<R, S, Q>(repo: Arc<R>, store: Arc<S>, queue: Arc<Q>)
where
    R: WorkflowRepository + 'static,
    S: ExecutionStateStore + 'static,
    Q: ExecutionQueue + 'static,
{
    let executor = Arc::new(WorkflowExecutor::new(repo, Arc::new(default_registry(Vec::new()))));
    let service = WorkflowService::new(executor.clone(), queue.clone());
    let record = service
        .create_from_yaml(ORDERS_YAML, Some("it".to_string()))
        .await
        .unwrap();
    assert_eq!(record.definition.steps.len(), 3);

    // Synchronous path.
    let done = service
        .execute(&record.id, json_map(json!({"customer": "ada"})), ExecutionMode::Sync)
        .await
        .unwrap();
    assert_eq!(done.status, ExecutionStatus::Completed, "error: {:?}", done.error);
    let outputs = done.outputs.clone().unwrap();
    assert_eq!(outputs["steps"]["total"]["outputs"]["result"], json!(19.5));
    assert_eq!(
        outputs["steps"]["label"]["outputs"]["result"],
        json!("order ada paid 19.5")
    );

    let stored = service.find_execution(&done.id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    let order: Vec<&str> = stored
        .step_executions
        .iter()
        .map(|s| s.step_id.as_str())
        .collect();
    assert_eq!(order, vec!["load", "total", "label"]);
    assert!(
        stored
            .step_executions
            .iter()
            .all(|s| s.status == ExecutionStatus::Completed && s.retry_count == 0)
    );
    assert_eq!(
        stored.step_executions[2].inputs.as_ref().unwrap()["data"],
        json!("order ada paid 19.5")
    );

    // Asynchronous path through the worker pool.
    let pending = service
        .execute(&record.id, json_map(json!({"customer": "bob"})), ExecutionMode::Async)
        .await
        .unwrap();
    assert_eq!(pending.status, ExecutionStatus::Pending);

    let coordinator = Arc::new(ExecutionCoordinator::new(store, CoordinationConfig::default()));
    let consumer = Arc::new(WorkflowConsumer::new(executor, coordinator.clone(), queue));
    let cancel = CancellationToken::new();
    let pool = WorkerPool::new(consumer, 2, Duration::from_millis(10), cancel.clone());
    let stats = pool.stats();
    let handle = tokio::spawn(pool.run());

    wait_until(|| stats.total() >= 1).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.processed.load(Ordering::Relaxed), 1);

    let finished = service.find_execution(&pending.id).await.unwrap();
    assert_eq!(finished.status, ExecutionStatus::Completed);
    assert_eq!(
        finished.outputs.unwrap()["steps"]["label"]["outputs"]["result"],
        json!("order bob paid 19.5")
    );
    assert_eq!(
        coordinator.get_state(pending.id).await.unwrap(),
        Some(ExecutionState::Completed)
    );

    let page = service
        .list_executions(&record.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].id, pending.id);
}

async fn failures_are_recorded<R, Q>(repo: Arc<R>, queue: Arc<Q>)
where
    R: WorkflowRepository + 'static,
    Q: ExecutionQueue + 'static,
{
    let executor = Arc::new(WorkflowExecutor::new(repo, Arc::new(default_registry(Vec::new()))));
    let service = WorkflowService::new(executor, queue);

    let cyclic = r#"
name: loop
steps:
  - id: a
    agent: transform
    dependsOn: [b]
  - id: b
    agent: transform
    dependsOn: [a]
"#;
    let err = service.create_from_yaml(cyclic, None).await.unwrap_err();
    assert!(
        matches!(err, ServiceError::Workflow(WorkflowError::CycleDetected(_))),
        "got: {err}"
    );
    assert_eq!(
        service.list_workflows(PageRequest::default()).await.unwrap().total,
        0
    );

    let broken = r#"
name: broken
steps:
  - id: first
    agent: transform
  - id: second
    agent: nope
    dependsOn: [first]
  - id: third
    agent: transform
    dependsOn: [second]
"#;
    let record = service.create_from_yaml(broken, None).await.unwrap();
    let done = service
        .execute(&record.id, JsonMap::new(), ExecutionMode::Sync)
        .await
        .unwrap();
    assert_eq!(done.status, ExecutionStatus::Failed);
    assert_eq!(
        done.error.as_deref(),
        Some("step failed: second - unknown agent type: nope")
    );
    assert!(done.outputs.is_none());

    let stored = service.find_execution(&done.id).await.unwrap();
    assert_eq!(stored.step_executions.len(), 2);
    assert_eq!(stored.step_executions[0].status, ExecutionStatus::Completed);
    assert_eq!(stored.step_executions[1].status, ExecutionStatus::Failed);
    assert!(stored.step_execution("third").is_none());

    service.delete_workflow(&record.id).await.unwrap();
    assert!(matches!(
        service.find_execution(&done.id).await,
        Err(ServiceError::ExecutionNotFound(_))
    ));
}

#[tokio::test]
async fn test_orders_round_trip_in_memory() {
    orders_round_trip(
        Arc::new(InMemoryWorkflowRepository::new()),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(InMemoryExecutionQueue::new(3)),
    )
    .await;
}

#[tokio::test]
async fn test_orders_round_trip_sqlite() {
    let pool = sqlite_pool().await;
    orders_round_trip(
        Arc::new(SqliteWorkflowRepository::new(pool.clone())),
        Arc::new(SqliteStateStore::new(pool.clone())),
        Arc::new(SqliteExecutionQueue::new(pool, &QueueConfig::default())),
    )
    .await;
}

#[tokio::test]
async fn test_failures_recorded_in_memory() {
    failures_are_recorded(
        Arc::new(InMemoryWorkflowRepository::new()),
        Arc::new(InMemoryExecutionQueue::default()),
    )
    .await;
}

#[tokio::test]
async fn test_failures_recorded_sqlite() {
    let pool = sqlite_pool().await;
    failures_are_recorded(
        Arc::new(SqliteWorkflowRepository::new(pool.clone())),
        Arc::new(SqliteExecutionQueue::new(pool, &QueueConfig::default())),
    )
    .await;
}
