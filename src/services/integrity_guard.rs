//! Workflow integrity guard.
//!
//! Completed steps record who acted for which role. If a role's slot on the
//! request has been emptied since (typically because that employee was removed
//! from the system), the history no longer resolves and the workflow must not
//! advance until the slot is reassigned.

use serde::Serialize;

use crate::domain::errors::WorkflowError;
use crate::domain::models::{PartNumberRequest, ReleaseWorkflow, Role};
use crate::services::resolver::resolve;

/// Result of an integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "role", rename_all = "snake_case")]
pub enum IntegrityReport {
    Ok,
    /// The first historical role whose employee can no longer be resolved.
    MissingEmployee(Role),
}

impl IntegrityReport {
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    pub const fn failing_role(self) -> Option<Role> {
        match self {
            Self::Ok => None,
            Self::MissingEmployee(role) => Some(role),
        }
    }

    pub const fn into_result(self) -> Result<(), WorkflowError> {
        match self {
            Self::Ok => Ok(()),
            Self::MissingEmployee(role) => Err(WorkflowError::EmployeeNotSet(role)),
        }
    }
}

/// Check that every completed step (except the requester's) still resolves.
pub fn integrity_check(workflow: &ReleaseWorkflow, request: &PartNumberRequest) -> IntegrityReport {
    workflow
        .completed_steps
        .iter()
        .filter(|step| step.role != Role::Requester)
        .find(|step| resolve(step.role, request).is_none())
        .map_or(IntegrityReport::Ok, |step| IntegrityReport::MissingEmployee(step.role))
}
