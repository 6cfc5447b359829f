//! Release workflow engine.
//!
//! Drives a `ReleaseWorkflow` through its release flow. Every transition is a
//! pure function of the current workflow and request: the engine works on a
//! draft copy and returns it only when the whole transition succeeded, so a
//! failed call leaves the caller's workflow untouched.
//!
//! Lifecycle:
//! 1. `start_workflow` - requester is current, flow queued
//! 2. `advance_step` - current role completes, next role (or the requester) takes over
//! 3. `deny_request` - decision made early, requester takes over
//! 4. `apply_customer_contact` - requester reports the customer reaction and the workflow closes

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::WorkflowError;
use crate::domain::models::{
    CompletedStep, CustomerNotification, PartNumberRequest, ReleaseWorkflow, Role, WorkflowStatus,
};
use crate::services::integrity_guard::{self, IntegrityReport};
use crate::services::resolver::resolve;

/// What finishing the current step would do, computed without changing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Submission {
    /// No release steps were ever configured for this workflow.
    NoReleaseFlow,
    /// The queue is exhausted: submitting makes the release decision.
    Finish,
    /// The next role resolves to an employee.
    NextEmployee { role: Role, employee: Uuid },
    /// The next role has nobody assigned; submitting would fail.
    ResponsibilityMissing { role: Role },
    /// The release decision has already been made.
    Decided,
}

/// Stateless engine applying release-flow transitions.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseWorkflowEngine {
    clock: fn() -> DateTime<Utc>,
}

impl Default for ReleaseWorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseWorkflowEngine {
    pub fn new() -> Self {
        Self { clock: Utc::now }
    }

    /// Use a fixed time source. Used by tests to assert on timestamps.
    pub fn with_clock(clock: fn() -> DateTime<Utc>) -> Self {
        Self { clock }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Create the workflow for a new request.
    ///
    /// The requester is current and responsible first; `release_flow` is queued
    /// in order. Requester and slot-less roles are refused as flow steps.
    pub fn start_workflow(
        &self,
        request: &PartNumberRequest,
        release_flow: impl IntoIterator<Item = Role>,
    ) -> Result<ReleaseWorkflow, WorkflowError> {
        let remaining_steps = release_flow
            .into_iter()
            .map(|role| {
                if role.can_be_release_step() {
                    Ok(role)
                } else {
                    Err(WorkflowError::InvalidReleaseFlow(role))
                }
            })
            .collect::<Result<VecDeque<_>, _>>()?;

        let workflow = ReleaseWorkflow {
            id: Uuid::new_v4(),
            request_id: Some(request.id),
            status: WorkflowStatus::InProgress,
            customer_notification: CustomerNotification::NotNotified,
            current_role: Some(Role::Requester),
            current_responsible: request.created_by,
            remaining_steps,
            completed_steps: Vec::new(),
            started_at: self.now(),
            finished_at: None,
            rejection_reason_or_follow_up: None,
        };

        info!(
            workflow_id = %workflow.id,
            request_id = %request.id,
            steps = workflow.remaining_steps.len(),
            "Release workflow started"
        );
        Ok(workflow)
    }

    /// Record a save of the request and, if `step_finished`, hand the
    /// workflow to the next responsible party.
    ///
    /// The integrity check runs on every call, even when the step is not finished.
    pub fn advance_step(
        &self,
        workflow: &ReleaseWorkflow,
        request: &PartNumberRequest,
        step_finished: bool,
    ) -> Result<ReleaseWorkflow, WorkflowError> {
        if let IntegrityReport::MissingEmployee(role) = integrity_guard::integrity_check(workflow, request) {
            warn!(
                workflow_id = %workflow.id,
                role = %role,
                "Completed step no longer resolves to an employee"
            );
            return Err(WorkflowError::EmployeeNotSet(role));
        }

        let mut draft = workflow.clone();
        if step_finished {
            self.transfer_to_next(&mut draft, request)?;
        }
        Ok(draft)
    }

    /// Append the current step to the history and decide who acts next.
    fn transfer_to_next(
        &self,
        draft: &mut ReleaseWorkflow,
        request: &PartNumberRequest,
    ) -> Result<(), WorkflowError> {
        let role = draft.current_role.ok_or(WorkflowError::WorkflowClosed)?;
        let employee = draft
            .current_responsible
            .or_else(|| resolve(role, request))
            .ok_or(WorkflowError::EmployeeNotSet(role))?;

        let now = self.now();
        draft.completed_steps.push(CompletedStep {
            role,
            employee: Some(employee),
            completed_at: now,
        });

        let notified = draft.customer_notification != CustomerNotification::NotNotified;
        match draft.status {
            WorkflowStatus::Denied if !notified => {
                draft.finished_at.get_or_insert(now);
                hand_back_to_requester(draft, request);
            }
            WorkflowStatus::Denied => close(draft),
            _ => match draft.remaining_steps.pop_front() {
                Some(next_role) => {
                    let Some(next_employee) = resolve(next_role, request) else {
                        return Err(WorkflowError::EmployeeNotSet(next_role));
                    };
                    draft.current_role = Some(next_role);
                    draft.current_responsible = Some(next_employee);
                    debug!(
                        workflow_id = %draft.id,
                        role = %next_role,
                        employee = %next_employee,
                        "Release step handed over"
                    );
                }
                None if !notified => {
                    draft.status = WorkflowStatus::Released;
                    draft.finished_at.get_or_insert(now);
                    hand_back_to_requester(draft, request);
                    info!(workflow_id = %draft.id, "Request released");
                }
                None => close(draft),
            },
        }
        Ok(())
    }

    /// Deny the request and hand it back to the requester.
    ///
    /// `comment` is only checked here; storing it on the request is up to the caller.
    pub fn deny_request(
        &self,
        workflow: &ReleaseWorkflow,
        request: &PartNumberRequest,
        comment: Option<&str>,
    ) -> Result<ReleaseWorkflow, WorkflowError> {
        if workflow.is_terminal() || workflow.status != WorkflowStatus::InProgress {
            return Err(WorkflowError::AlreadyDecided(workflow.status));
        }

        let has_comment = comment.is_some_and(|c| !c.trim().is_empty());
        if !has_comment && !request.has_comments() {
            return Err(WorkflowError::DenialNeedsComments);
        }

        let mut draft = workflow.clone();
        draft.status = WorkflowStatus::Denied;
        let denied = self.advance_step(&draft, request, true)?;
        info!(workflow_id = %denied.id, "Request denied");
        Ok(denied)
    }

    /// Record the customer's reaction to the release decision and close the workflow.
    ///
    /// A released request takes `Accepted`, or `Rejected` with a reason. A
    /// denied request takes `Notified` with an optional follow-up note.
    pub fn apply_customer_contact(
        &self,
        workflow: &ReleaseWorkflow,
        request: &PartNumberRequest,
        decision: CustomerNotification,
        text: Option<&str>,
    ) -> Result<ReleaseWorkflow, WorkflowError> {
        if !workflow.is_terminal() {
            return Err(WorkflowError::InvalidCustomerContact(
                "no release decision has been made yet".to_string(),
            ));
        }
        if workflow.customer_notification != CustomerNotification::NotNotified {
            return Err(WorkflowError::InvalidCustomerContact(format!(
                "customer was already contacted ({})",
                workflow.customer_notification
            )));
        }

        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let note = match (workflow.status, decision) {
            (WorkflowStatus::Released, CustomerNotification::Accepted) => None,
            (WorkflowStatus::Released, CustomerNotification::Rejected) => {
                let reason = text.ok_or_else(|| {
                    WorkflowError::InvalidCustomerContact("a customer rejection needs a reason".to_string())
                })?;
                Some(reason.to_string())
            }
            (WorkflowStatus::Denied, CustomerNotification::Notified) => text.map(str::to_string),
            (status, decision) => {
                return Err(WorkflowError::InvalidCustomerContact(format!(
                    "{decision} is not a valid customer reaction for a {status} request"
                )));
            }
        };

        let mut draft = workflow.clone();
        draft.customer_notification = decision;
        draft.rejection_reason_or_follow_up = note;
        self.advance_step(&draft, request, true)
    }

    /// Check that the completed history still resolves against `request`.
    pub fn integrity_check(&self, workflow: &ReleaseWorkflow, request: &PartNumberRequest) -> IntegrityReport {
        integrity_guard::integrity_check(workflow, request)
    }

    pub const fn is_terminal(&self, workflow: &ReleaseWorkflow) -> bool {
        workflow.is_terminal()
    }

    /// Whether a current role exists but nobody is responsible for it.
    pub const fn needs_reassignment(&self, workflow: &ReleaseWorkflow) -> bool {
        workflow.needs_reassignment()
    }

    /// Preview what finishing the current step would do.
    pub fn preview_submission(&self, workflow: &ReleaseWorkflow, request: &PartNumberRequest) -> Submission {
        if workflow.is_terminal() {
            return Submission::Decided;
        }
        match workflow.remaining_steps.front() {
            None if workflow.completed_steps.is_empty() => Submission::NoReleaseFlow,
            None => Submission::Finish,
            Some(&role) => match resolve(role, request) {
                Some(employee) => Submission::NextEmployee { role, employee },
                None => Submission::ResponsibilityMissing { role },
            },
        }
    }

    /// Make `employee` responsible for the current role.
    ///
    /// Recovery path after an employee removal; the request slot for the role
    /// is expected to be updated by the caller as well.
    pub fn reassign_current(&self, workflow: &ReleaseWorkflow, employee: Uuid) -> Result<ReleaseWorkflow, WorkflowError> {
        let role = workflow.current_role.ok_or(WorkflowError::NoCurrentRole)?;
        let mut draft = workflow.clone();
        draft.current_responsible = Some(employee);
        info!(
            workflow_id = %draft.id,
            role = %role,
            employee = %employee,
            "Current responsibility reassigned"
        );
        Ok(draft)
    }
}

fn hand_back_to_requester(draft: &mut ReleaseWorkflow, request: &PartNumberRequest) {
    draft.current_role = Some(Role::Requester);
    draft.current_responsible = request.created_by;
}

fn close(draft: &mut ReleaseWorkflow) {
    draft.current_role = None;
    draft.current_responsible = None;
    info!(
        workflow_id = %draft.id,
        status = %draft.status,
        customer_notification = %draft.customer_notification,
        "Release workflow closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    struct Staff {
        creator: Uuid,
        pm: Uuid,
        ps: Uuid,
    }

    fn staffed_request() -> (PartNumberRequest, Staff) {
        let staff = Staff {
            creator: Uuid::new_v4(),
            pm: Uuid::new_v4(),
            ps: Uuid::new_v4(),
        };
        let request = PartNumberRequest::new("PN-4711", staff.creator)
            .with_product_manager(staff.pm)
            .with_product_specialist(staff.ps);
        (request, staff)
    }

    fn engine() -> ReleaseWorkflowEngine {
        ReleaseWorkflowEngine::with_clock(fixed_now)
    }

    fn roles_of(wf: &ReleaseWorkflow) -> Vec<Role> {
        wf.completed_steps.iter().map(|s| s.role).collect()
    }

    #[test]
    fn test_start_workflow_puts_requester_first() {
        let (request, staff) = staffed_request();
        let wf = engine()
            .start_workflow(&request, [Role::ProductSpecialist, Role::ProductManager])
            .unwrap();

        assert_eq!(wf.request_id, Some(request.id));
        assert_eq!(wf.status, WorkflowStatus::InProgress);
        assert_eq!(wf.customer_notification, CustomerNotification::NotNotified);
        assert_eq!(wf.current_role, Some(Role::Requester));
        assert_eq!(wf.current_responsible, Some(staff.creator));
        assert_eq!(
            wf.remaining_steps,
            VecDeque::from([Role::ProductSpecialist, Role::ProductManager])
        );
        assert!(wf.completed_steps.is_empty());
        assert_eq!(wf.started_at, fixed_now());
        assert!(wf.finished_at.is_none());
    }

    #[test]
    fn test_start_workflow_refuses_requester_and_administrative_steps() {
        let (request, _) = staffed_request();
        let err = engine()
            .start_workflow(&request, [Role::ProductManager, Role::Requester])
            .unwrap_err();
        assert_eq!(err, WorkflowError::InvalidReleaseFlow(Role::Requester));

        let err = engine().start_workflow(&request, [Role::SlcEmployee]).unwrap_err();
        assert_eq!(err, WorkflowError::InvalidReleaseFlow(Role::SlcEmployee));
    }

    #[test]
    fn test_happy_path_release_and_acceptance() {
        let engine = engine();
        let (request, staff) = staffed_request();
        let wf = engine
            .start_workflow(&request, [Role::ProductSpecialist, Role::ProductManager])
            .unwrap();

        let wf = engine.advance_step(&wf, &request, true).unwrap();
        assert_eq!(wf.current_role, Some(Role::ProductSpecialist));
        assert_eq!(wf.current_responsible, Some(staff.ps));
        assert_eq!(wf.remaining_steps, VecDeque::from([Role::ProductManager]));

        let wf = engine.advance_step(&wf, &request, true).unwrap();
        assert_eq!(wf.current_role, Some(Role::ProductManager));
        assert_eq!(wf.current_responsible, Some(staff.pm));

        let wf = engine.advance_step(&wf, &request, true).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Released);
        assert_eq!(wf.finished_at, Some(fixed_now()));
        assert_eq!(wf.current_role, Some(Role::Requester));
        assert_eq!(wf.current_responsible, Some(staff.creator));
        assert_eq!(
            roles_of(&wf),
            vec![Role::Requester, Role::ProductSpecialist, Role::ProductManager]
        );

        let wf = engine
            .apply_customer_contact(&wf, &request, CustomerNotification::Accepted, None)
            .unwrap();
        assert_eq!(wf.customer_notification, CustomerNotification::Accepted);
        assert_eq!(wf.current_role, None);
        assert_eq!(wf.current_responsible, None);
        assert_eq!(wf.completed_steps.len(), 4);
        assert_eq!(wf.completed_steps[3].employee, Some(staff.creator));
    }

    #[test]
    fn test_save_without_finishing_changes_nothing() {
        let engine = engine();
        let (request, _) = staffed_request();
        let wf = engine.start_workflow(&request, [Role::ProductManager]).unwrap();

        let saved = engine.advance_step(&wf, &request, false).unwrap();
        assert_eq!(saved, wf);
    }

    #[test]
    fn test_denial_mid_flow_keeps_queue_and_hands_back() {
        let engine = engine();
        let (request, staff) = staffed_request();
        let request = request.with_comments("price missing");
        let wf = engine
            .start_workflow(&request, [Role::ProductSpecialist, Role::ProductManager])
            .unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();

        let wf = engine.deny_request(&wf, &request, None).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Denied);
        assert_eq!(wf.finished_at, Some(fixed_now()));
        assert_eq!(wf.current_role, Some(Role::Requester));
        assert_eq!(wf.current_responsible, Some(staff.creator));
        assert_eq!(roles_of(&wf), vec![Role::Requester, Role::ProductSpecialist]);
        assert_eq!(wf.remaining_steps, VecDeque::from([Role::ProductManager]));

        let wf = engine
            .apply_customer_contact(&wf, &request, CustomerNotification::Notified, Some("called"))
            .unwrap();
        assert_eq!(wf.customer_notification, CustomerNotification::Notified);
        assert_eq!(wf.rejection_reason_or_follow_up.as_deref(), Some("called"));
        assert!(wf.is_closed());
    }

    #[test]
    fn test_denial_without_comments_is_refused() {
        let engine = engine();
        let (request, _) = staffed_request();
        let wf = engine.start_workflow(&request, [Role::ProductManager]).unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();

        let err = engine.deny_request(&wf, &request, Some("  ")).unwrap_err();
        assert_eq!(err, WorkflowError::DenialNeedsComments);

        let denied = engine.deny_request(&wf, &request, Some("wrong customer")).unwrap();
        assert_eq!(denied.status, WorkflowStatus::Denied);
    }

    #[test]
    fn test_denial_after_decision_is_refused() {
        let engine = engine();
        let (request, _) = staffed_request();
        let request = request.with_comments("late objection");
        let wf = engine.start_workflow(&request, []).unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Released);

        let err = engine.deny_request(&wf, &request, None).unwrap_err();
        assert_eq!(err, WorkflowError::AlreadyDecided(WorkflowStatus::Released));
    }

    #[test]
    fn test_missing_responsible_fails_without_mutation() {
        let engine = engine();
        let (mut request, _) = staffed_request();
        request.product_manager = None;
        let wf = engine
            .start_workflow(&request, [Role::ProductSpecialist, Role::ProductManager])
            .unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();
        let before = wf.clone();

        let err = engine.advance_step(&wf, &request, true).unwrap_err();
        assert_eq!(err, WorkflowError::EmployeeNotSet(Role::ProductManager));
        assert_eq!(wf, before);
        assert_eq!(wf.current_role, Some(Role::ProductSpecialist));
    }

    #[test]
    fn test_integrity_failure_blocks_even_plain_saves() {
        let engine = engine();
        let (mut request, _) = staffed_request();
        let wf = engine
            .start_workflow(&request, [Role::ProductSpecialist, Role::ProductManager])
            .unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();

        request.product_specialist = None;
        assert_eq!(
            engine.integrity_check(&wf, &request),
            IntegrityReport::MissingEmployee(Role::ProductSpecialist)
        );
        let err = engine.advance_step(&wf, &request, false).unwrap_err();
        assert_eq!(err, WorkflowError::EmployeeNotSet(Role::ProductSpecialist));
    }

    #[test]
    fn test_customer_rejection_requires_reason() {
        let engine = engine();
        let (request, _) = staffed_request();
        let wf = engine.start_workflow(&request, []).unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();

        let err = engine
            .apply_customer_contact(&wf, &request, CustomerNotification::Rejected, None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidCustomerContact(_)));

        let wf = engine
            .apply_customer_contact(&wf, &request, CustomerNotification::Rejected, Some("too expensive"))
            .unwrap();
        assert_eq!(wf.customer_notification, CustomerNotification::Rejected);
        assert_eq!(wf.rejection_reason_or_follow_up.as_deref(), Some("too expensive"));
        assert!(wf.is_closed());
    }

    #[test]
    fn test_customer_contact_rules() {
        let engine = engine();
        let (request, _) = staffed_request();
        let open = engine.start_workflow(&request, [Role::ProductManager]).unwrap();

        let err = engine
            .apply_customer_contact(&open, &request, CustomerNotification::Accepted, None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidCustomerContact(_)));

        let released = engine.start_workflow(&request, []).unwrap();
        let released = engine.advance_step(&released, &request, true).unwrap();
        for wrong in [CustomerNotification::Notified, CustomerNotification::NotNotified] {
            let err = engine
                .apply_customer_contact(&released, &request, wrong, None)
                .unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidCustomerContact(_)));
        }

        let closed = engine
            .apply_customer_contact(&released, &request, CustomerNotification::Accepted, None)
            .unwrap();
        let err = engine
            .apply_customer_contact(&closed, &request, CustomerNotification::Accepted, None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidCustomerContact(_)));
    }

    #[test]
    fn test_advance_on_closed_workflow_is_refused() {
        let engine = engine();
        let (request, _) = staffed_request();
        let wf = engine.start_workflow(&request, []).unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();
        let wf = engine
            .apply_customer_contact(&wf, &request, CustomerNotification::Accepted, None)
            .unwrap();

        let err = engine.advance_step(&wf, &request, true).unwrap_err();
        assert_eq!(err, WorkflowError::WorkflowClosed);
    }

    #[test]
    fn test_empty_release_flow_releases_on_first_submit() {
        let engine = engine();
        let (request, staff) = staffed_request();
        let wf = engine.start_workflow(&request, []).unwrap();
        assert_eq!(engine.preview_submission(&wf, &request), Submission::NoReleaseFlow);

        let wf = engine.advance_step(&wf, &request, true).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Released);
        assert_eq!(wf.current_responsible, Some(staff.creator));
        assert!(engine.is_terminal(&wf));
        assert_eq!(engine.preview_submission(&wf, &request), Submission::Decided);
    }

    #[test]
    fn test_requester_removed_before_start_blocks_first_step() {
        let engine = engine();
        let (mut request, _) = staffed_request();
        request.created_by = None;
        let wf = engine.start_workflow(&request, [Role::ProductManager]).unwrap();
        assert!(engine.needs_reassignment(&wf));

        let err = engine.advance_step(&wf, &request, true).unwrap_err();
        assert_eq!(err, WorkflowError::EmployeeNotSet(Role::Requester));
    }

    #[test]
    fn test_preview_reports_next_employee_or_missing() {
        let engine = engine();
        let (mut request, staff) = staffed_request();
        let wf = engine
            .start_workflow(&request, [Role::ProductManager, Role::ProductSpecialist])
            .unwrap();

        assert_eq!(
            engine.preview_submission(&wf, &request),
            Submission::NextEmployee { role: Role::ProductManager, employee: staff.pm }
        );

        request.product_manager = None;
        assert_eq!(
            engine.preview_submission(&wf, &request),
            Submission::ResponsibilityMissing { role: Role::ProductManager }
        );
    }

    #[test]
    fn test_preview_finish_when_queue_exhausted() {
        let engine = engine();
        let (request, _) = staffed_request();
        let wf = engine.start_workflow(&request, [Role::ProductManager]).unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();
        assert_eq!(engine.preview_submission(&wf, &request), Submission::Finish);
    }

    #[test]
    fn test_reassign_current_unblocks_workflow() {
        let engine = engine();
        let (request, _) = staffed_request();
        let wf = engine.start_workflow(&request, [Role::ProductManager]).unwrap();
        let mut wf = engine.advance_step(&wf, &request, true).unwrap();
        wf.current_responsible = None;
        assert!(engine.needs_reassignment(&wf));

        let replacement = Uuid::new_v4();
        let wf = engine.reassign_current(&wf, replacement).unwrap();
        assert_eq!(wf.current_responsible, Some(replacement));
        assert!(!engine.needs_reassignment(&wf));

        let wf = engine.advance_step(&wf, &request, true).unwrap();
        assert_eq!(wf.completed_steps.last().and_then(|s| s.employee), Some(replacement));
    }

    #[test]
    fn test_reassign_on_closed_workflow_is_refused() {
        let engine = engine();
        let (request, _) = staffed_request();
        let wf = engine.start_workflow(&request, []).unwrap();
        let wf = engine.advance_step(&wf, &request, true).unwrap();
        let wf = engine
            .apply_customer_contact(&wf, &request, CustomerNotification::Accepted, None)
            .unwrap();

        let err = engine.reassign_current(&wf, Uuid::new_v4()).unwrap_err();
        assert_eq!(err, WorkflowError::NoCurrentRole);
    }
}
