//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `agentflow-core` using sqlx with split
//! read/write pools. Definitions are stored as JSON text; an execution and its
//! step records are written in one transaction so a reader never sees a
//! half-saved step list.

use agentflow_core::repository::WorkflowRepository;
use agentflow_types::error::RepositoryError;
use agentflow_types::page::{Page, PageRequest};
use agentflow_types::workflow::{
    ExecutionStatus, JsonMap, StepExecution, WorkflowDefinition, WorkflowExecution,
    WorkflowRecord,
};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: String,
    definition: String,
    created_by: Option<String>,
    created_at: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            definition: row.try_get("definition")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_record(self) -> Result<WorkflowRecord, RepositoryError> {
        let definition: WorkflowDefinition = serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::Query(format!("invalid definition JSON: {e}")))?;

        Ok(WorkflowRecord {
            id: parse_uuid(&self.id)?,
            name: definition.name.clone(),
            version: definition.version.clone(),
            description: definition.description.clone(),
            definition,
            created_by: self.created_by,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct ExecutionRow {
    id: String,
    workflow_id: String,
    status: String,
    inputs: String,
    outputs: Option<String>,
    current_step_id: Option<String>,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            status: row.try_get("status")?,
            inputs: row.try_get("inputs")?,
            outputs: row.try_get("outputs")?,
            current_step_id: row.try_get("current_step_id")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_execution(
        self,
        step_executions: Vec<StepExecution>,
    ) -> Result<WorkflowExecution, RepositoryError> {
        Ok(WorkflowExecution {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            status: parse_status(&self.status)?,
            inputs: parse_map(&self.inputs)?,
            outputs: self.outputs.as_deref().map(parse_map).transpose()?,
            current_step_id: self.current_step_id,
            error: self.error,
            created_at: parse_datetime(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            step_executions,
        })
    }
}

struct StepRow {
    id: String,
    step_id: String,
    agent_type: String,
    status: String,
    inputs: Option<String>,
    outputs: Option<String>,
    error: Option<String>,
    retry_count: i64,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl StepRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            step_id: row.try_get("step_id")?,
            agent_type: row.try_get("agent_type")?,
            status: row.try_get("status")?,
            inputs: row.try_get("inputs")?,
            outputs: row.try_get("outputs")?,
            error: row.try_get("error")?,
            retry_count: row.try_get("retry_count")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_step(self) -> Result<StepExecution, RepositoryError> {
        Ok(StepExecution {
            id: parse_uuid(&self.id)?,
            step_id: self.step_id,
            agent_type: self.agent_type,
            status: parse_status(&self.status)?,
            inputs: self.inputs.as_deref().map(parse_map).transpose()?,
            outputs: self.outputs.as_deref().map(parse_map).transpose()?,
            error: self.error,
            retry_count: self.retry_count.max(0) as u32,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width so that text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_status(s: &str) -> Result<ExecutionStatus, RepositoryError> {
    s.parse::<ExecutionStatus>().map_err(RepositoryError::Query)
}

fn parse_map(s: &str) -> Result<JsonMap, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid JSON object: {e}")))
}

fn to_json(map: &JsonMap) -> Result<String, RepositoryError> {
    serde_json::to_string(map).map_err(|e| RepositoryError::Query(e.to_string()))
}

fn map_write_error(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(db.message().to_string())
        }
        _ => RepositoryError::Query(e.to_string()),
    }
}

impl SqliteWorkflowRepository {
    async fn load_steps(&self, execution_id: &str) -> Result<Vec<StepExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM step_executions WHERE execution_id = ? ORDER BY position ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            steps.push(r.into_step()?);
        }
        Ok(steps)
    }

    async fn hydrate(
        &self,
        rows: &[sqlx::sqlite::SqliteRow],
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut executions = Vec::with_capacity(rows.len());
        for row in rows {
            let r = ExecutionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let steps = self.load_steps(&r.id).await?;
            executions.push(r.into_execution(steps)?);
        }
        Ok(executions)
    }
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_workflow(&self, workflow: &WorkflowRecord) -> Result<(), RepositoryError> {
        let definition_json = serde_json::to_string(&workflow.definition)
            .map_err(|e| RepositoryError::Query(format!("serialize definition: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflows (id, name, version, description, definition, created_by, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.version)
        .bind(&workflow.description)
        .bind(&definition_json)
        .bind(&workflow.created_by)
        .bind(format_datetime(&workflow.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(map_write_error)?;

        tracing::debug!(workflow_id = %workflow.id, "saved workflow");
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<WorkflowRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn find_workflow_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE name = ? AND version = ?")
            .bind(name)
            .bind(version)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn list_workflows(&self, page: PageRequest) -> Result<Page<WorkflowRecord>, RepositoryError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workflows")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let rows = sqlx::query(
            "SELECT * FROM workflows ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = WorkflowRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            records.push(r.into_record()?);
        }
        Ok(Page::new(records, page, total.max(0) as u64))
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let execution_id = execution.id.to_string();
        let inputs = to_json(&execution.inputs)?;
        let outputs = execution.outputs.as_ref().map(to_json).transpose()?;

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_id, status, inputs, outputs, current_step_id, error,
                created_at, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 inputs = excluded.inputs,
                 outputs = excluded.outputs,
                 current_step_id = excluded.current_step_id,
                 error = excluded.error,
                 started_at = excluded.started_at,
                 completed_at = excluded.completed_at"#,
        )
        .bind(&execution_id)
        .bind(execution.workflow_id.to_string())
        .bind(execution.status.as_str())
        .bind(&inputs)
        .bind(&outputs)
        .bind(&execution.current_step_id)
        .bind(&execution.error)
        .bind(format_datetime(&execution.created_at))
        .bind(execution.started_at.as_ref().map(format_datetime))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
            _ => RepositoryError::Query(e.to_string()),
        })?;

        sqlx::query("DELETE FROM step_executions WHERE execution_id = ?")
            .bind(&execution_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        for (position, step) in execution.step_executions.iter().enumerate() {
            let step_inputs = step.inputs.as_ref().map(to_json).transpose()?;
            let step_outputs = step.outputs.as_ref().map(to_json).transpose()?;

            sqlx::query(
                r#"INSERT INTO step_executions
                   (id, execution_id, position, step_id, agent_type, status, inputs, outputs,
                    error, retry_count, started_at, completed_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(step.id.to_string())
            .bind(&execution_id)
            .bind(position as i64)
            .bind(&step.step_id)
            .bind(&step.agent_type)
            .bind(step.status.as_str())
            .bind(&step_inputs)
            .bind(&step_outputs)
            .bind(&step.error)
            .bind(i64::from(step.retry_count))
            .bind(step.started_at.as_ref().map(format_datetime))
            .bind(step.completed_at.as_ref().map(format_datetime))
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::trace!(
            execution_id = %execution.id,
            status = execution.status.as_str(),
            steps = execution.step_executions.len(),
            "saved execution"
        );
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let mut executions = self.hydrate(std::slice::from_ref(&row)).await?;
                Ok(executions.pop())
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        page: PageRequest,
    ) -> Result<Page<WorkflowExecution>, RepositoryError> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM workflow_executions WHERE workflow_id = ?")
                .bind(workflow_id.to_string())
                .fetch_one(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let rows = sqlx::query(
            "SELECT * FROM workflow_executions WHERE workflow_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(workflow_id.to_string())
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let executions = self.hydrate(&rows).await?;
        Ok(Page::new(executions, page, total.max(0) as u64))
    }

    async fn list_executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_executions WHERE status = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        self.hydrate(&rows).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
