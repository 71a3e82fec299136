//! Workflow repository trait definition.
//!
//! Defines the storage interface for registered workflows and their
//! executions. The infrastructure layer (agentflow-infra) implements this
//! trait with SQLite and in-memory persistence.

use agentflow_types::error::RepositoryError;
use agentflow_types::page::{Page, PageRequest};
use agentflow_types::workflow::{ExecutionStatus, WorkflowExecution, WorkflowRecord};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Covers two entity families:
/// - **Workflows:** registered definitions (`WorkflowRecord`).
/// - **Executions:** runs with their owned step execution records, saved
///   and loaded as one unit.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Insert a workflow. Fails with `Conflict` if name+version is taken.
    fn save_workflow(
        &self,
        workflow: &WorkflowRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowRecord>, RepositoryError>> + Send;

    fn find_workflow_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowRecord>, RepositoryError>> + Send;

    /// Page through workflows, newest first.
    fn list_workflows(
        &self,
        page: PageRequest,
    ) -> impl std::future::Future<Output = Result<Page<WorkflowRecord>, RepositoryError>> + Send;

    /// Delete a workflow and its executions. Returns `true` if it existed.
    fn delete_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Upsert an execution together with its full step execution list.
    fn save_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// Page through one workflow's executions, newest first.
    fn list_executions(
        &self,
        workflow_id: &Uuid,
        page: PageRequest,
    ) -> impl std::future::Future<Output = Result<Page<WorkflowExecution>, RepositoryError>> + Send;

    /// All executions currently in `status`, oldest first.
    fn list_executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;
}
