//! Request repository port.
//!
//! A part-number request and its release workflow are loaded and saved as one
//! unit. Saves are optimistic: `update` fails with
//! `DomainError::ConcurrencyConflict` when the stored version differs from the
//! version carried by the request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{PartNumberRequest, ReleaseWorkflow, Role};

/// A request together with its workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRequest {
    pub request: PartNumberRequest,
    pub workflow: ReleaseWorkflow,
}

/// Summary row for the open-responsibilities overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenResponsibility {
    pub request_id: Uuid,
    pub workflow_id: Uuid,
    pub part_number: String,
    pub role: Role,
    pub responsible: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_step_completed_at: Option<DateTime<Utc>>,
}

/// What happened to a workflow when its request was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The workflow had been decided and is kept as an audit record.
    Detached { workflow_id: Uuid },
    /// The workflow was still open and was deleted with the request.
    Deleted { workflow_id: Uuid },
}

/// Repository interface for request + workflow persistence.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Insert a new request and its workflow atomically.
    async fn insert(&self, request: &PartNumberRequest, workflow: &ReleaseWorkflow) -> DomainResult<()>;

    /// Load a request and its workflow.
    async fn get(&self, id: Uuid) -> DomainResult<Option<TrackedRequest>>;

    /// Save a request and its workflow in one transaction.
    ///
    /// `request.version` is the version the caller loaded. Returns the new version.
    async fn update(&self, request: &PartNumberRequest, workflow: &ReleaseWorkflow) -> DomainResult<i64>;

    /// Delete a request.
    ///
    /// Whether the workflow is decided is read inside the deleting
    /// transaction: a decided workflow is detached and kept as an audit
    /// record, an open one is deleted with the request.
    async fn delete(&self, id: Uuid) -> DomainResult<DeleteOutcome>;

    /// Load a workflow by its own id, including detached ones.
    async fn get_workflow(&self, workflow_id: Uuid) -> DomainResult<Option<ReleaseWorkflow>>;

    /// Unfinished workflows with a responsible employee, optionally for one employee.
    async fn list_open_responsibilities(
        &self,
        employee: Option<Uuid>,
    ) -> DomainResult<Vec<OpenResponsibility>>;

    /// Clear every reference to an employee: request slots, current
    /// responsibilities and completed-step records. Returns rows touched.
    async fn clear_employee_references(&self, employee: Uuid) -> DomainResult<u64>;
}
