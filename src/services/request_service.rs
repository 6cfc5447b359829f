//! Request service: persistence-aware wrapper around the release workflow engine.
//!
//! Every write loads the request and workflow, runs the engine on them and
//! saves both in one transaction. A save that loses an optimistic-concurrency
//! race is reloaded and retried up to `WorkflowConfig::max_conflict_retries`
//! times; engine failures are never retried.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, WorkflowError};
use crate::domain::models::{
    CustomerNotification, PartNumberRequest, ReleaseWorkflow, Role, WorkflowConfig,
};
use crate::domain::ports::{DeleteOutcome, OpenResponsibility, RequestRepository, TrackedRequest};
use crate::services::workflow_engine::{ReleaseWorkflowEngine, Submission};

pub struct RequestService<R: RequestRepository> {
    repository: Arc<R>,
    engine: ReleaseWorkflowEngine,
    config: WorkflowConfig,
}

impl<R: RequestRepository> RequestService<R> {
    pub fn new(repository: Arc<R>, config: WorkflowConfig) -> Self {
        Self::with_engine(repository, ReleaseWorkflowEngine::new(), config)
    }

    pub fn with_engine(repository: Arc<R>, engine: ReleaseWorkflowEngine, config: WorkflowConfig) -> Self {
        Self {
            repository,
            engine,
            config,
        }
    }

    /// Create a request and start its workflow.
    ///
    /// Without an explicit `release_flow` the configured default flow is used.
    /// With `submit` the requester's step is finished right away.
    #[instrument(skip(self, request), fields(request_id = %request.id, part_number = %request.part_number))]
    pub async fn create_request(
        &self,
        request: PartNumberRequest,
        release_flow: Option<Vec<Role>>,
        submit: bool,
    ) -> DomainResult<TrackedRequest> {
        if request.part_number.trim().is_empty() {
            return Err(DomainError::ValidationFailed("part number must not be empty".to_string()));
        }

        let flow = release_flow.unwrap_or_else(|| self.config.default_release_flow.clone());
        let mut workflow = self.engine.start_workflow(&request, flow)?;
        if submit {
            workflow = self.engine.advance_step(&workflow, &request, true)?;
        }

        self.repository.insert(&request, &workflow).await?;
        info!(workflow_id = %workflow.id, "Request created");
        Ok(TrackedRequest { request, workflow })
    }

    /// Load a request with its workflow.
    pub async fn get(&self, id: Uuid) -> DomainResult<TrackedRequest> {
        self.repository.get(id).await?.ok_or(DomainError::RequestNotFound(id))
    }

    /// Load a workflow by its own id, including detached audit records.
    pub async fn get_workflow(&self, workflow_id: Uuid) -> DomainResult<ReleaseWorkflow> {
        self.repository
            .get_workflow(workflow_id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(workflow_id))
    }

    /// Save an edited request, optionally finishing the current step.
    ///
    /// `request.version` must be the version the caller loaded; a stale
    /// version fails with a concurrency conflict and is not retried, since the
    /// edit itself was based on stale data.
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    pub async fn update_request(
        &self,
        mut request: PartNumberRequest,
        step_finished: bool,
    ) -> DomainResult<TrackedRequest> {
        let current = self.get(request.id).await?;
        let workflow = self.engine.advance_step(&current.workflow, &request, step_finished)?;

        request.updated_at = Utc::now();
        request.version = self.repository.update(&request, &workflow).await?;
        Ok(TrackedRequest { request, workflow })
    }

    /// Finish the current step.
    #[instrument(skip(self))]
    pub async fn submit(&self, id: Uuid) -> DomainResult<TrackedRequest> {
        self.mutate(id, |engine, request, workflow| engine.advance_step(workflow, request, true))
            .await
    }

    /// Deny the request. An explicit comment replaces the request comments.
    #[instrument(skip(self, comment))]
    pub async fn deny(&self, id: Uuid, comment: Option<String>) -> DomainResult<TrackedRequest> {
        let comment = comment.filter(|c| !c.trim().is_empty());
        self.mutate(id, |engine, request, workflow| {
            let denied = engine.deny_request(workflow, request, comment.as_deref())?;
            if let Some(comment) = &comment {
                request.comments = Some(comment.clone());
            }
            Ok(denied)
        })
        .await
    }

    /// Record the customer's reaction and close the workflow.
    #[instrument(skip(self, text))]
    pub async fn contact_customer(
        &self,
        id: Uuid,
        decision: CustomerNotification,
        text: Option<String>,
    ) -> DomainResult<TrackedRequest> {
        self.mutate(id, |engine, request, workflow| {
            engine.apply_customer_contact(workflow, request, decision, text.as_deref())
        })
        .await
    }

    /// Give the current role to `employee`, on the request slot and the workflow.
    #[instrument(skip(self))]
    pub async fn reassign(&self, id: Uuid, employee: Uuid) -> DomainResult<TrackedRequest> {
        self.mutate(id, |engine, request, workflow| {
            let role = workflow.current_role.ok_or(WorkflowError::NoCurrentRole)?;
            if let Some(slot) = role.slot() {
                request.set_slot(slot, Some(employee));
            }
            engine.reassign_current(workflow, employee)
        })
        .await
    }

    /// Preview what submitting the request would do.
    pub async fn preview(&self, id: Uuid) -> DomainResult<Submission> {
        let tracked = self.get(id).await?;
        Ok(self.engine.preview_submission(&tracked.workflow, &tracked.request))
    }

    /// Delete a request.
    ///
    /// A decided workflow survives as a detached audit record; an undecided one
    /// is deleted together with the request. The repository makes that call in
    /// the deleting transaction, so a decision committed concurrently is kept.
    #[instrument(skip(self))]
    pub async fn delete_request(&self, id: Uuid) -> DomainResult<DeleteOutcome> {
        let outcome = self.repository.delete(id).await?;
        info!(?outcome, "Request deleted");
        Ok(outcome)
    }

    /// Remove every reference to an employee who left.
    ///
    /// Affected workflows then need reassignment before they can advance.
    #[instrument(skip(self))]
    pub async fn remove_employee(&self, employee: Uuid) -> DomainResult<u64> {
        let touched = self.repository.clear_employee_references(employee).await?;
        info!(touched, "Employee references cleared");
        Ok(touched)
    }

    /// Open responsibilities, for one employee or for everybody.
    pub async fn open_responsibilities(&self, employee: Option<Uuid>) -> DomainResult<Vec<OpenResponsibility>> {
        self.repository.list_open_responsibilities(employee).await
    }

    /// Load, transform and save, retrying when another writer got there first.
    async fn mutate<F>(&self, id: Uuid, mut op: F) -> DomainResult<TrackedRequest>
    where
        F: FnMut(
                &ReleaseWorkflowEngine,
                &mut PartNumberRequest,
                &ReleaseWorkflow,
            ) -> Result<ReleaseWorkflow, WorkflowError>
            + Send,
    {
        let mut attempt = 0;
        loop {
            let TrackedRequest { mut request, workflow } = self.get(id).await?;
            let next = op(&self.engine, &mut request, &workflow)?;
            request.updated_at = Utc::now();

            match self.repository.update(&request, &next).await {
                Ok(version) => {
                    request.version = version;
                    return Ok(TrackedRequest { request, workflow: next });
                }
                Err(err) if err.is_conflict() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    warn!(request_id = %id, attempt, "Concurrent modification, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
