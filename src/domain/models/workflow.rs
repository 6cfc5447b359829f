//! Release workflow domain model.
//!
//! One `ReleaseWorkflow` exists per part-number request. It tracks whose turn
//! it is, the roles still to visit and the ordered audit trail of completed
//! steps. All transitions go through `ReleaseWorkflowEngine`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

use super::role::Role;

// ============================================================================
// Status enums
// ============================================================================

/// Main decision state of a release workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    InProgress,
    Released,
    Denied,
}

impl WorkflowStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Released => "released",
            Self::Denied => "denied",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "released" => Some(Self::Released),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the customer-contact sub-flow.
///
/// `Accepted` and `Rejected` follow a release; `Notified` follows a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerNotification {
    NotNotified,
    Accepted,
    Rejected,
    Notified,
}

impl CustomerNotification {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotNotified => "not_notified",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Notified => "notified",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "not_notified" => Some(Self::NotNotified),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "notified" => Some(Self::Notified),
            _ => None,
        }
    }
}

impl fmt::Display for CustomerNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CustomerNotification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(&s.trim().to_lowercase().replace(['-', ' '], "_"))
            .ok_or_else(|| format!("Unknown customer notification: {s}"))
    }
}

// ============================================================================
// Completed steps
// ============================================================================

/// Immutable audit record of one role having finished acting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub role: Role,
    /// Employee who acted. Cleared when that employee is removed from the system.
    pub employee: Option<Uuid>,
    pub completed_at: DateTime<Utc>,
}

// ============================================================================
// Workflow
// ============================================================================

/// Per-request release workflow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseWorkflow {
    pub id: Uuid,
    /// Owning request. `None` once the workflow has been detached as an audit record.
    pub request_id: Option<Uuid>,
    pub status: WorkflowStatus,
    pub customer_notification: CustomerNotification,
    /// Whose turn it currently is.
    pub current_role: Option<Role>,
    /// Who must act next. `None` with a current role means reassignment is needed.
    pub current_responsible: Option<Uuid>,
    /// Roles still to visit, front to back.
    pub remaining_steps: VecDeque<Role>,
    /// Append-only audit trail in completion order.
    pub completed_steps: Vec<CompletedStep>,
    pub started_at: DateTime<Utc>,
    /// Set once, when the release or denial decision is made.
    pub finished_at: Option<DateTime<Utc>>,
    /// Customer rejection reason, or follow-up note after a denial.
    pub rejection_reason_or_follow_up: Option<String>,
}

impl ReleaseWorkflow {
    /// Whether the main decision has been made.
    pub const fn is_terminal(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Whether nobody is current any more: decided and customer contacted.
    pub const fn is_closed(&self) -> bool {
        self.current_role.is_none()
    }

    /// Whether a current role exists but nobody can act on it.
    pub const fn needs_reassignment(&self) -> bool {
        self.current_role.is_some() && self.current_responsible.is_none()
    }

    /// Time of the most recently completed step.
    pub fn last_completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_steps.last().map(|s| s.completed_at)
    }
}
