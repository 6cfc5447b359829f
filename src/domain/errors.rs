//! Domain errors for the release workflow.

use thiserror::Error;
use uuid::Uuid;

use super::models::{Role, WorkflowStatus};

/// Business-rule violations raised by the release workflow engine.
///
/// None of these are fatal. Each is recoverable by a corrective user action
/// and is raised before any workflow state is changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Next step of task cannot be assigned to any employee: nobody holds the {0} role")]
    EmployeeNotSet(Role),

    #[error("Request is denied but no comments specified")]
    DenialNeedsComments,

    #[error("Invalid customer contact: {0}")]
    InvalidCustomerContact(String),

    #[error("Release decision already made (status: {0})")]
    AlreadyDecided(WorkflowStatus),

    #[error("Workflow is closed: no role is currently responsible")]
    WorkflowClosed,

    #[error("Role {0} cannot be a step of the release flow")]
    InvalidReleaseFlow(Role),

    #[error("No role is currently responsible, nothing to reassign")]
    NoCurrentRole,
}

/// Errors surfaced by the service and persistence layers.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether reloading and retrying the operation may succeed.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// The engine error behind this failure, if any.
    pub const fn as_workflow_error(&self) -> Option<&WorkflowError> {
        match self {
            Self::Workflow(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
