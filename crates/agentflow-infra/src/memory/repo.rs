//! In-memory workflow repository.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use agentflow_core::repository::WorkflowRepository;
use agentflow_types::error::RepositoryError;
use agentflow_types::page::{Page, PageRequest};
use agentflow_types::workflow::{ExecutionStatus, WorkflowExecution, WorkflowRecord};

/// `WorkflowRepository` over `DashMap`s, for tests and single-process use.
///
/// Records are cloned in and out; no `DashMap` guard outlives a call.
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: DashMap<Uuid, WorkflowRecord>,
    /// (name, version) -> workflow id
    names: DashMap<(String, String), Uuid>,
    executions: DashMap<Uuid, WorkflowExecution>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sort newest first by (created_at, id) and cut one page.
fn page_newest_first<T>(
    mut items: Vec<T>,
    key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, Uuid),
    page: PageRequest,
) -> Page<T> {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Page::new(items, page, total)
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_workflow(&self, workflow: &WorkflowRecord) -> Result<(), RepositoryError> {
        match self
            .names
            .entry((workflow.name.clone(), workflow.version.clone()))
        {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "workflow '{}' version '{}' already exists",
                workflow.name, workflow.version
            ))),
            Entry::Vacant(slot) => {
                slot.insert(workflow.id);
                self.workflows.insert(workflow.id, workflow.clone());
                Ok(())
            }
        }
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<WorkflowRecord>, RepositoryError> {
        Ok(self.workflows.get(id).map(|w| w.value().clone()))
    }

    async fn find_workflow_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowRecord>, RepositoryError> {
        let id = self
            .names
            .get(&(name.to_string(), version.to_string()))
            .map(|r| *r.value());
        Ok(id.and_then(|id| self.workflows.get(&id).map(|w| w.value().clone())))
    }

    async fn list_workflows(&self, page: PageRequest) -> Result<Page<WorkflowRecord>, RepositoryError> {
        let all: Vec<WorkflowRecord> = self.workflows.iter().map(|w| w.value().clone()).collect();
        Ok(page_newest_first(all, |w| (w.created_at, w.id), page))
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let Some((_, removed)) = self.workflows.remove(id) else {
            return Ok(false);
        };
        self.names.remove(&(removed.name, removed.version));
        self.executions.retain(|_, e| e.workflow_id != *id);
        Ok(true)
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        if !self.workflows.contains_key(&execution.workflow_id) {
            return Err(RepositoryError::NotFound);
        }
        self.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.executions.get(id).map(|e| e.value().clone()))
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        page: PageRequest,
    ) -> Result<Page<WorkflowExecution>, RepositoryError> {
        let matching: Vec<WorkflowExecution> = self
            .executions
            .iter()
            .filter(|e| e.workflow_id == *workflow_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(page_newest_first(matching, |e| (e.created_at, e.id), page))
    }

    async fn list_executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut matching: Vec<WorkflowExecution> = self
            .executions
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.value().clone())
            .collect();
        matching.sort_by_key(|e| (e.created_at, e.id));
        Ok(matching)
    }
}
