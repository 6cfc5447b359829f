mod helpers;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use release_flow::adapters::sqlite::SqliteRequestRepository;
use release_flow::domain::errors::{DomainError, DomainResult, WorkflowError};
use release_flow::domain::models::{
    CustomerNotification, PartNumberRequest, ReleaseWorkflow, Role, WorkflowConfig, WorkflowStatus,
};
use release_flow::domain::ports::{OpenResponsibility, RequestRepository, TrackedRequest};
use release_flow::services::{DeleteOutcome, RequestService, Submission};

use helpers::database::{setup_service, setup_test_db, teardown_test_db};

struct Staff {
    creator: Uuid,
    pm: Uuid,
    ps: Uuid,
}

fn staffed_request(part_number: &str) -> (PartNumberRequest, Staff) {
    let staff = Staff {
        creator: Uuid::new_v4(),
        pm: Uuid::new_v4(),
        ps: Uuid::new_v4(),
    };
    let request = PartNumberRequest::new(part_number, staff.creator)
        .with_customer("C-100")
        .with_product_manager(staff.pm)
        .with_product_specialist(staff.ps);
    (request, staff)
}

fn roles(tracked: &TrackedRequest) -> Vec<Role> {
    tracked.workflow.completed_steps.iter().map(|s| s.role).collect()
}

#[tokio::test]
async fn test_happy_path_release_and_customer_acceptance() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;
    let (request, staff) = staffed_request("PN-A");

    let created = service
        .create_request(request, Some(vec![Role::ProductSpecialist, Role::ProductManager]), false)
        .await
        .expect("failed to create request");
    let id = created.request.id;
    assert_eq!(created.workflow.current_responsible, Some(staff.creator));

    let t = service.submit(id).await.unwrap();
    assert_eq!(t.workflow.current_role, Some(Role::ProductSpecialist));
    assert_eq!(t.workflow.current_responsible, Some(staff.ps));

    let t = service.submit(id).await.unwrap();
    assert_eq!(t.workflow.current_role, Some(Role::ProductManager));
    assert_eq!(t.workflow.current_responsible, Some(staff.pm));

    let t = service.submit(id).await.unwrap();
    assert_eq!(t.workflow.status, WorkflowStatus::Released);
    assert!(t.workflow.finished_at.is_some());
    assert_eq!(t.workflow.current_role, Some(Role::Requester));
    assert_eq!(t.workflow.current_responsible, Some(staff.creator));

    let t = service
        .contact_customer(id, CustomerNotification::Accepted, None)
        .await
        .unwrap();
    assert_eq!(t.workflow.customer_notification, CustomerNotification::Accepted);
    assert_eq!(t.workflow.current_role, None);
    assert_eq!(t.workflow.current_responsible, None);
    assert_eq!(
        roles(&t),
        vec![Role::Requester, Role::ProductSpecialist, Role::ProductManager, Role::Requester]
    );

    let reloaded = service.get(id).await.unwrap();
    assert_eq!(reloaded.workflow, t.workflow);
    assert_eq!(reloaded.request.version, t.request.version);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_denial_mid_flow_then_follow_up() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;
    let (request, staff) = staffed_request("PN-B");

    let created = service
        .create_request(request, Some(vec![Role::ProductSpecialist, Role::ProductManager]), true)
        .await
        .unwrap();
    let id = created.request.id;

    let t = service
        .deny(id, Some("price missing".to_string()))
        .await
        .unwrap();
    assert_eq!(t.workflow.status, WorkflowStatus::Denied);
    assert_eq!(t.workflow.current_role, Some(Role::Requester));
    assert_eq!(t.workflow.current_responsible, Some(staff.creator));
    assert_eq!(roles(&t), vec![Role::Requester, Role::ProductSpecialist]);
    assert_eq!(Vec::from(t.workflow.remaining_steps.clone()), vec![Role::ProductManager]);
    assert_eq!(t.request.comments.as_deref(), Some("price missing"));

    let err = service
        .contact_customer(id, CustomerNotification::Accepted, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_workflow_error(),
        Some(WorkflowError::InvalidCustomerContact(_))
    ));

    let t = service
        .contact_customer(id, CustomerNotification::Notified, Some("customer informed by phone".to_string()))
        .await
        .unwrap();
    assert_eq!(t.workflow.customer_notification, CustomerNotification::Notified);
    assert_eq!(
        t.workflow.rejection_reason_or_follow_up.as_deref(),
        Some("customer informed by phone")
    );
    assert!(t.workflow.is_closed());

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_missing_responsible_blocks_and_nothing_is_saved() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;
    let (mut request, _) = staffed_request("PN-C");
    request.product_manager = None;

    let created = service
        .create_request(request, Some(vec![Role::ProductSpecialist, Role::ProductManager]), true)
        .await
        .unwrap();
    let id = created.request.id;

    assert_eq!(
        service.preview(id).await.unwrap(),
        Submission::ResponsibilityMissing { role: Role::ProductManager }
    );

    let err = service.submit(id).await.unwrap_err();
    assert_eq!(
        err.as_workflow_error(),
        Some(&WorkflowError::EmployeeNotSet(Role::ProductManager))
    );

    let stored = service.get(id).await.unwrap();
    assert_eq!(stored.workflow, created.workflow);
    assert_eq!(stored.request.version, created.request.version);
    assert_eq!(stored.workflow.current_role, Some(Role::ProductSpecialist));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_employee_removal_blocks_until_reassigned() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;
    let (request, staff) = staffed_request("PN-D");

    let created = service
        .create_request(request, Some(vec![Role::ProductSpecialist, Role::ProductManager]), true)
        .await
        .unwrap();
    let id = created.request.id;
    service.submit(id).await.unwrap();

    // PS has completed a step; removing them breaks the history.
    let touched = service.remove_employee(staff.ps).await.unwrap();
    assert_eq!(touched, 2);

    let blocked = service.get(id).await.unwrap();
    assert_eq!(blocked.request.product_specialist, None);
    assert_eq!(blocked.workflow.completed_steps[1].employee, None);

    let err = service.submit(id).await.unwrap_err();
    assert_eq!(
        err.as_workflow_error(),
        Some(&WorkflowError::EmployeeNotSet(Role::ProductSpecialist))
    );

    // Filling the slot again lets the workflow continue.
    let mut edited = blocked.request.clone();
    edited.product_specialist = Some(Uuid::new_v4());
    let t = service.update_request(edited, true).await.unwrap();
    assert_eq!(t.workflow.status, WorkflowStatus::Released);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_reassign_current_responsible() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;
    let (request, staff) = staffed_request("PN-E");

    let created = service
        .create_request(request, Some(vec![Role::ProductManager]), true)
        .await
        .unwrap();
    let id = created.request.id;

    service.remove_employee(staff.pm).await.unwrap();
    let blocked = service.get(id).await.unwrap();
    assert!(blocked.workflow.needs_reassignment());

    let replacement = Uuid::new_v4();
    let t = service.reassign(id, replacement).await.unwrap();
    assert_eq!(t.workflow.current_responsible, Some(replacement));
    assert_eq!(t.request.product_manager, Some(replacement));

    let open = service.open_responsibilities(Some(replacement)).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].role, Role::ProductManager);
    assert!(open[0].last_step_completed_at.is_some());

    let t = service.submit(id).await.unwrap();
    assert_eq!(t.workflow.status, WorkflowStatus::Released);
    assert_eq!(t.workflow.completed_steps[1].employee, Some(replacement));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_default_flow_and_empty_flow() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;

    let (request, _) = staffed_request("PN-F1");
    let t = service.create_request(request, None, false).await.unwrap();
    assert_eq!(
        Vec::from(t.workflow.remaining_steps),
        vec![Role::ProductSpecialist, Role::ProductManager, Role::ProductSpecialist]
    );

    let (request, _) = staffed_request("PN-F2");
    let t = service.create_request(request, Some(Vec::new()), false).await.unwrap();
    assert_eq!(service.preview(t.request.id).await.unwrap(), Submission::NoReleaseFlow);
    let t = service.submit(t.request.id).await.unwrap();
    assert_eq!(t.workflow.status, WorkflowStatus::Released);

    let (request, _) = staffed_request("PN-F3");
    let err = service
        .create_request(request, Some(vec![Role::Requester]), false)
        .await
        .unwrap_err();
    assert_eq!(
        err.as_workflow_error(),
        Some(&WorkflowError::InvalidReleaseFlow(Role::Requester))
    );

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_delete_detaches_decided_and_drops_open_workflows() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;

    let (request, _) = staffed_request("PN-G1");
    let decided = service.create_request(request, Some(Vec::new()), true).await.unwrap();
    assert!(decided.workflow.is_terminal());

    let outcome = service.delete_request(decided.request.id).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Detached { workflow_id: decided.workflow.id });
    let audit = service.get_workflow(decided.workflow.id).await.unwrap();
    assert_eq!(audit.request_id, None);
    assert_eq!(audit.status, WorkflowStatus::Released);
    assert_eq!(audit.completed_steps, decided.workflow.completed_steps);

    let (request, _) = staffed_request("PN-G2");
    let open = service.create_request(request, None, false).await.unwrap();
    let outcome = service.delete_request(open.request.id).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted { workflow_id: open.workflow.id });
    assert!(matches!(
        service.get_workflow(open.workflow.id).await,
        Err(DomainError::WorkflowNotFound(_))
    ));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_delete_after_concurrent_release_keeps_audit_record() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;
    let (request, _) = staffed_request("PN-G3");
    let created = service.create_request(request, Some(Vec::new()), false).await.unwrap();
    let id = created.request.id;

    let seen = service.get(id).await.unwrap();
    assert!(!seen.workflow.is_terminal());
    service.submit(id).await.unwrap();

    let outcome = service.delete_request(id).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Detached { workflow_id: seen.workflow.id });
    let audit = service.get_workflow(seen.workflow.id).await.unwrap();
    assert_eq!(audit.status, WorkflowStatus::Released);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_employee_removal_invalidates_earlier_loads() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;
    let repo = SqliteRequestRepository::new(pool.clone());
    let (request, staff) = staffed_request("PN-G4");

    let created = service
        .create_request(request, Some(vec![Role::ProductManager]), true)
        .await
        .unwrap();
    let id = created.request.id;

    // Hand the PM slot over without finishing the step; the workflow still names the old PM.
    let mut edited = created.request.clone();
    edited.product_manager = Some(Uuid::new_v4());
    service.update_request(edited, false).await.unwrap();

    let stale = repo.get(id).await.unwrap().unwrap();
    assert_eq!(stale.workflow.current_responsible, Some(staff.pm));
    service.remove_employee(staff.pm).await.unwrap();

    let engine = release_flow::services::ReleaseWorkflowEngine::new();
    let advanced = engine.advance_step(&stale.workflow, &stale.request, true).unwrap();
    let err = repo.update(&stale.request, &advanced).await.unwrap_err();
    assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));

    let stored = service.get(id).await.unwrap();
    assert!(stored.workflow.needs_reassignment());
    assert!(stored.workflow.completed_steps.iter().all(|s| s.employee != Some(staff.pm)));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_open_responsibilities_exclude_decided_workflows() {
    let (service, pool) = setup_service(WorkflowConfig::default()).await;

    let (request, staff) = staffed_request("PN-H1");
    service
        .create_request(request, Some(vec![Role::ProductManager]), true)
        .await
        .unwrap();

    let (request, _) = staffed_request("PN-H2");
    service.create_request(request, Some(Vec::new()), true).await.unwrap();

    let all = service.open_responsibilities(None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].part_number, "PN-H1");
    assert_eq!(all[0].responsible, staff.pm);

    teardown_test_db(pool).await;
}

// ============================================================================
// Optimistic concurrency
// ============================================================================

/// Repository whose next `update` calls lose a simulated race.
struct ContendedRepository {
    inner: SqliteRequestRepository,
    conflicts_left: AtomicU32,
}

#[async_trait]
impl RequestRepository for ContendedRepository {
    async fn insert(&self, request: &PartNumberRequest, workflow: &ReleaseWorkflow) -> DomainResult<()> {
        self.inner.insert(request, workflow).await
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<TrackedRequest>> {
        self.inner.get(id).await
    }

    async fn update(&self, request: &PartNumberRequest, workflow: &ReleaseWorkflow) -> DomainResult<i64> {
        let left = self.conflicts_left.load(Ordering::SeqCst);
        if left > 0 {
            self.conflicts_left.store(left - 1, Ordering::SeqCst);
            return Err(DomainError::ConcurrencyConflict {
                entity: "part_number_request".to_string(),
                id: request.id.to_string(),
            });
        }
        self.inner.update(request, workflow).await
    }

    async fn delete(&self, id: Uuid) -> DomainResult<DeleteOutcome> {
        self.inner.delete(id).await
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> DomainResult<Option<ReleaseWorkflow>> {
        self.inner.get_workflow(workflow_id).await
    }

    async fn list_open_responsibilities(&self, employee: Option<Uuid>) -> DomainResult<Vec<OpenResponsibility>> {
        self.inner.list_open_responsibilities(employee).await
    }

    async fn clear_employee_references(&self, employee: Uuid) -> DomainResult<u64> {
        self.inner.clear_employee_references(employee).await
    }
}

async fn contended_service(conflicts: u32) -> (RequestService<ContendedRepository>, Arc<ContendedRepository>) {
    let pool = setup_test_db().await;
    let repo = Arc::new(ContendedRepository {
        inner: SqliteRequestRepository::new(pool),
        conflicts_left: AtomicU32::new(0),
    });
    repo.conflicts_left.store(conflicts, Ordering::SeqCst);
    let config = WorkflowConfig {
        max_conflict_retries: 2,
        ..WorkflowConfig::default()
    };
    (RequestService::new(repo.clone(), config), repo)
}

#[tokio::test]
async fn test_conflicts_within_retry_budget_are_absorbed() {
    let (service, repo) = contended_service(0).await;
    let (request, staff) = staffed_request("PN-I1");
    let created = service
        .create_request(request, Some(vec![Role::ProductManager]), false)
        .await
        .unwrap();

    repo.conflicts_left.store(2, Ordering::SeqCst);
    let t = service.submit(created.request.id).await.unwrap();
    assert_eq!(t.workflow.current_responsible, Some(staff.pm));
    assert_eq!(t.workflow.completed_steps.len(), 1);
}

#[tokio::test]
async fn test_conflicts_beyond_retry_budget_surface() {
    let (service, repo) = contended_service(0).await;
    let (request, _) = staffed_request("PN-I2");
    let created = service
        .create_request(request, Some(vec![Role::ProductManager]), false)
        .await
        .unwrap();

    repo.conflicts_left.store(3, Ordering::SeqCst);
    let err = service.submit(created.request.id).await.unwrap_err();
    assert!(err.is_conflict());

    let stored = service.get(created.request.id).await.unwrap();
    assert!(stored.workflow.completed_steps.is_empty());
}
