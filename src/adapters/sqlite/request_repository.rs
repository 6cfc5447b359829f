//! SQLite implementation of the RequestRepository.
//!
//! A request row, its workflow row and the completed-step rows are always
//! written in one transaction. Completed steps are append-only: an update only
//! inserts the steps beyond what is already stored.

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::VecDeque;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CompletedStep, CustomerNotification, PartNumberRequest, ReleaseWorkflow, Role, WorkflowStatus,
};
use crate::domain::ports::{DeleteOutcome, OpenResponsibility, RequestRepository, TrackedRequest};

const REQUEST_COLUMNS: &str = "id, part_number, customer_code, created_by, product_manager, product_specialist, comments, version, created_at, updated_at";
const WORKFLOW_COLUMNS: &str = "id, request_id, status, customer_notification, current_role, current_responsible_id, remaining_steps, started_at, finished_at, rejection_reason_or_follow_up";

#[derive(Clone)]
pub struct SqliteRequestRepository {
    pool: SqlitePool,
}

impl SqliteRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_steps(&self, workflow_id: &str) -> DomainResult<Vec<CompletedStep>> {
        let rows: Vec<CompletedStepRow> = sqlx::query_as(
            "SELECT role, employee_id, completed_at FROM workflow_completed_steps WHERE workflow_id = ? ORDER BY position",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CompletedStep::try_from).collect()
    }

    async fn load_workflow(&self, row: WorkflowRow) -> DomainResult<ReleaseWorkflow> {
        let steps = self.load_steps(&row.id).await?;
        row.try_into_workflow(steps)
    }
}

/// Append the completed steps at positions `from..`.
async fn insert_steps(
    tx: &mut Transaction<'_, Sqlite>,
    workflow: &ReleaseWorkflow,
    from: usize,
) -> DomainResult<()> {
    for (position, step) in workflow.completed_steps.iter().enumerate().skip(from) {
        sqlx::query(
            "INSERT INTO workflow_completed_steps (workflow_id, position, role, employee_id, completed_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(workflow.id.to_string())
        .bind(i64::try_from(position).map_err(|e| DomainError::SerializationError(e.to_string()))?)
        .bind(step.role.as_str())
        .bind(step.employee.map(|id| id.to_string()))
        .bind(format_datetime(step.completed_at))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl RequestRepository for SqliteRequestRepository {
    async fn insert(&self, request: &PartNumberRequest, workflow: &ReleaseWorkflow) -> DomainResult<()> {
        let remaining_json = serde_json::to_string(&workflow.remaining_steps)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO part_number_requests (id, part_number, customer_code, created_by, product_manager, product_specialist, comments, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(request.id.to_string())
        .bind(&request.part_number)
        .bind(&request.customer_code)
        .bind(request.created_by.map(|id| id.to_string()))
        .bind(request.product_manager.map(|id| id.to_string()))
        .bind(request.product_specialist.map(|id| id.to_string()))
        .bind(&request.comments)
        .bind(request.version)
        .bind(format_datetime(request.created_at))
        .bind(format_datetime(request.updated_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO release_workflows (id, request_id, status, customer_notification, current_role, current_responsible_id, remaining_steps, started_at, finished_at, rejection_reason_or_follow_up)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow.id.to_string())
        .bind(workflow.request_id.map(|id| id.to_string()))
        .bind(workflow.status.as_str())
        .bind(workflow.customer_notification.as_str())
        .bind(workflow.current_role.map(Role::as_str))
        .bind(workflow.current_responsible.map(|id| id.to_string()))
        .bind(&remaining_json)
        .bind(format_datetime(workflow.started_at))
        .bind(workflow.finished_at.map(format_datetime))
        .bind(&workflow.rejection_reason_or_follow_up)
        .execute(&mut *tx)
        .await?;

        insert_steps(&mut tx, workflow, 0).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<TrackedRequest>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {REQUEST_COLUMNS} FROM part_number_requests WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let request = PartNumberRequest::try_from(row)?;

        let workflow_row: WorkflowRow = sqlx::query_as(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM release_workflows WHERE request_id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DomainError::ValidationFailed(format!("Request {id} has no release workflow")))?;

        let workflow = self.load_workflow(workflow_row).await?;
        Ok(Some(TrackedRequest { request, workflow }))
    }

    async fn update(&self, request: &PartNumberRequest, workflow: &ReleaseWorkflow) -> DomainResult<i64> {
        let remaining_json = serde_json::to_string(&workflow.remaining_steps)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE part_number_requests SET part_number = ?, customer_code = ?, created_by = ?,
               product_manager = ?, product_specialist = ?, comments = ?, updated_at = ?,
               version = version + 1
               WHERE id = ? AND version = ?"#,
        )
        .bind(&request.part_number)
        .bind(&request.customer_code)
        .bind(request.created_by.map(|id| id.to_string()))
        .bind(request.product_manager.map(|id| id.to_string()))
        .bind(request.product_specialist.map(|id| id.to_string()))
        .bind(&request.comments)
        .bind(format_datetime(request.updated_at))
        .bind(request.id.to_string())
        .bind(request.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let (exists,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM part_number_requests WHERE id = ?")
                .bind(request.id.to_string())
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists == 0 {
                DomainError::RequestNotFound(request.id)
            } else {
                DomainError::ConcurrencyConflict {
                    entity: "part_number_request".to_string(),
                    id: request.id.to_string(),
                }
            });
        }

        let result = sqlx::query(
            r#"UPDATE release_workflows SET status = ?, customer_notification = ?, current_role = ?,
               current_responsible_id = ?, remaining_steps = ?, finished_at = ?,
               rejection_reason_or_follow_up = ?
               WHERE id = ? AND request_id = ?"#,
        )
        .bind(workflow.status.as_str())
        .bind(workflow.customer_notification.as_str())
        .bind(workflow.current_role.map(Role::as_str))
        .bind(workflow.current_responsible.map(|id| id.to_string()))
        .bind(&remaining_json)
        .bind(workflow.finished_at.map(format_datetime))
        .bind(&workflow.rejection_reason_or_follow_up)
        .bind(workflow.id.to_string())
        .bind(request.id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::WorkflowNotFound(workflow.id));
        }

        let (stored,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workflow_completed_steps WHERE workflow_id = ?")
            .bind(workflow.id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let stored = usize::try_from(stored).map_err(|e| DomainError::SerializationError(e.to_string()))?;
        if stored > workflow.completed_steps.len() {
            return Err(DomainError::ValidationFailed(format!(
                "Completed steps of workflow {} are append-only ({} stored, {} given)",
                workflow.id,
                stored,
                workflow.completed_steps.len()
            )));
        }

        insert_steps(&mut tx, workflow, stored).await?;
        tx.commit().await?;
        Ok(request.version + 1)
    }

    async fn delete(&self, id: Uuid) -> DomainResult<DeleteOutcome> {
        let request_id = id.to_string();
        let mut tx = self.pool.begin().await?;

        // Detach first: the write takes the database lock, so `finished_at` is
        // read as of this transaction and a decision committed just before is kept.
        let detached: Option<(String,)> = sqlx::query_as(
            "UPDATE release_workflows SET request_id = NULL WHERE request_id = ? AND finished_at IS NOT NULL RETURNING id",
        )
        .bind(&request_id)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match detached {
            Some((workflow_id,)) => Some(DeleteOutcome::Detached {
                workflow_id: parse_uuid(&workflow_id)?,
            }),
            None => {
                let deleted: Option<(String,)> = sqlx::query_as(
                    "DELETE FROM release_workflows WHERE request_id = ? AND finished_at IS NULL RETURNING id",
                )
                .bind(&request_id)
                .fetch_optional(&mut *tx)
                .await?;
                deleted
                    .map(|(workflow_id,)| parse_uuid(&workflow_id).map(|workflow_id| DeleteOutcome::Deleted { workflow_id }))
                    .transpose()?
            }
        };

        let result = sqlx::query("DELETE FROM part_number_requests WHERE id = ?")
            .bind(&request_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::RequestNotFound(id));
        }
        let outcome =
            outcome.ok_or_else(|| DomainError::ValidationFailed(format!("Request {id} has no release workflow")))?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> DomainResult<Option<ReleaseWorkflow>> {
        let row: Option<WorkflowRow> = sqlx::query_as(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM release_workflows WHERE id = ?"
        ))
        .bind(workflow_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.load_workflow(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_open_responsibilities(
        &self,
        employee: Option<Uuid>,
    ) -> DomainResult<Vec<OpenResponsibility>> {
        let employee = employee.map(|id| id.to_string());
        let rows: Vec<OpenResponsibilityRow> = sqlx::query_as(
            r#"SELECT w.id AS workflow_id, w.request_id AS request_id, r.part_number AS part_number,
                      w.current_role AS current_role, w.current_responsible_id AS responsible,
                      w.started_at AS started_at,
                      (SELECT MAX(s.completed_at) FROM workflow_completed_steps s WHERE s.workflow_id = w.id)
                          AS last_step_completed_at
               FROM release_workflows w
               JOIN part_number_requests r ON r.id = w.request_id
               WHERE w.finished_at IS NULL
                 AND w.current_role IS NOT NULL
                 AND w.current_responsible_id IS NOT NULL
                 AND (? IS NULL OR w.current_responsible_id = ?)
               ORDER BY w.started_at"#,
        )
        .bind(employee.clone())
        .bind(employee)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OpenResponsibility::try_from).collect()
    }

    async fn clear_employee_references(&self, employee: Uuid) -> DomainResult<u64> {
        let employee = employee.to_string();
        let mut tx = self.pool.begin().await?;
        let mut touched = 0;

        // Every request whose slots or workflow mention the employee gets a new
        // version before anything is cleared, so a writer that loaded earlier
        // conflicts instead of recording the removed employee.
        sqlx::query(
            r#"UPDATE part_number_requests SET version = version + 1
               WHERE created_by = ? OR product_manager = ? OR product_specialist = ?
                  OR id IN (
                      SELECT w.request_id FROM release_workflows w
                      WHERE w.request_id IS NOT NULL
                        AND (w.current_responsible_id = ?
                             OR EXISTS (SELECT 1 FROM workflow_completed_steps s
                                        WHERE s.workflow_id = w.id AND s.employee_id = ?)))"#,
        )
        .bind(&employee)
        .bind(&employee)
        .bind(&employee)
        .bind(&employee)
        .bind(&employee)
        .execute(&mut *tx)
        .await?;

        for column in ["created_by", "product_manager", "product_specialist"] {
            let result = sqlx::query(&format!(
                "UPDATE part_number_requests SET {column} = NULL WHERE {column} = ?"
            ))
            .bind(&employee)
            .execute(&mut *tx)
            .await?;
            touched += result.rows_affected();
        }

        let result = sqlx::query(
            "UPDATE release_workflows SET current_responsible_id = NULL WHERE current_responsible_id = ?",
        )
        .bind(&employee)
        .execute(&mut *tx)
        .await?;
        touched += result.rows_affected();

        let result = sqlx::query("UPDATE workflow_completed_steps SET employee_id = NULL WHERE employee_id = ?")
            .bind(&employee)
            .execute(&mut *tx)
            .await?;
        touched += result.rows_affected();

        tx.commit().await?;
        Ok(touched)
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    part_number: String,
    customer_code: Option<String>,
    created_by: Option<String>,
    product_manager: Option<String>,
    product_specialist: Option<String>,
    comments: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RequestRow> for PartNumberRequest {
    type Error = DomainError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            part_number: row.part_number,
            customer_code: row.customer_code,
            created_by: parse_optional_uuid(row.created_by)?,
            product_manager: parse_optional_uuid(row.product_manager)?,
            product_specialist: parse_optional_uuid(row.product_specialist)?,
            comments: row.comments,
            version: row.version,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: String,
    request_id: Option<String>,
    status: String,
    customer_notification: String,
    current_role: Option<String>,
    current_responsible_id: Option<String>,
    remaining_steps: String,
    started_at: String,
    finished_at: Option<String>,
    rejection_reason_or_follow_up: Option<String>,
}

impl WorkflowRow {
    fn try_into_workflow(self, completed_steps: Vec<CompletedStep>) -> DomainResult<ReleaseWorkflow> {
        let status = WorkflowStatus::parse_str(&self.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", self.status)))?;
        let customer_notification = CustomerNotification::parse_str(&self.customer_notification)
            .ok_or_else(|| {
                DomainError::SerializationError(format!(
                    "Invalid customer notification: {}",
                    self.customer_notification
                ))
            })?;
        let remaining_steps: VecDeque<Role> = serde_json::from_str(&self.remaining_steps)?;

        Ok(ReleaseWorkflow {
            id: parse_uuid(&self.id)?,
            request_id: parse_optional_uuid(self.request_id)?,
            status,
            customer_notification,
            current_role: self.current_role.as_deref().map(parse_role).transpose()?,
            current_responsible: parse_optional_uuid(self.current_responsible_id)?,
            remaining_steps,
            completed_steps,
            started_at: parse_datetime(&self.started_at)?,
            finished_at: parse_optional_datetime(self.finished_at)?,
            rejection_reason_or_follow_up: self.rejection_reason_or_follow_up,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CompletedStepRow {
    role: String,
    employee_id: Option<String>,
    completed_at: String,
}

impl TryFrom<CompletedStepRow> for CompletedStep {
    type Error = DomainError;

    fn try_from(row: CompletedStepRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: parse_role(&row.role)?,
            employee: parse_optional_uuid(row.employee_id)?,
            completed_at: parse_datetime(&row.completed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OpenResponsibilityRow {
    workflow_id: String,
    request_id: String,
    part_number: String,
    current_role: String,
    responsible: String,
    started_at: String,
    last_step_completed_at: Option<String>,
}

impl TryFrom<OpenResponsibilityRow> for OpenResponsibility {
    type Error = DomainError;

    fn try_from(row: OpenResponsibilityRow) -> Result<Self, Self::Error> {
        Ok(Self {
            request_id: parse_uuid(&row.request_id)?,
            workflow_id: parse_uuid(&row.workflow_id)?,
            part_number: row.part_number,
            role: parse_role(&row.current_role)?,
            responsible: parse_uuid(&row.responsible)?,
            started_at: parse_datetime(&row.started_at)?,
            last_step_completed_at: parse_optional_datetime(row.last_step_completed_at)?,
        })
    }
}

fn parse_role(s: &str) -> DomainResult<Role> {
    s.parse().map_err(DomainError::SerializationError)
}
