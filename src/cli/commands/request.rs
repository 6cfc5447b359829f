//! Part-number request CLI commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::display::{list_table, render_list};
use crate::cli::open_service;
use crate::cli::output::{output, short_id, truncate, CommandOutput};
use crate::domain::models::{Config, CustomerNotification, PartNumberRequest, ReleaseWorkflow, Role};
use crate::domain::ports::{OpenResponsibility, TrackedRequest};
use crate::services::{DeleteOutcome, Submission};

#[derive(Args, Debug)]
pub struct RequestArgs {
    #[command(subcommand)]
    pub command: RequestCommands,
}

#[derive(Subcommand, Debug)]
pub enum RequestCommands {
    /// Create a request and start its release workflow
    Create {
        /// Part number requested
        part_number: String,
        /// Employee creating the request
        #[arg(long)]
        creator: Uuid,
        /// Product manager for the request
        #[arg(long)]
        pm: Option<Uuid>,
        /// Product specialist for the request
        #[arg(long)]
        ps: Option<Uuid>,
        /// Customer code
        #[arg(long)]
        customer: Option<String>,
        /// Free-text comments
        #[arg(long)]
        comments: Option<String>,
        /// Release flow, comma separated (e.g. "ps,pm,ps"). Defaults to the configured flow.
        #[arg(long, value_delimiter = ',')]
        flow: Option<Vec<Role>>,
        /// Finish the requester's step right away
        #[arg(long)]
        submit: bool,
    },
    /// Show a request and its workflow
    Show {
        /// Request ID
        id: Uuid,
    },
    /// Edit request fields, optionally finishing the current step
    Update {
        /// Request ID
        id: Uuid,
        #[arg(long)]
        pm: Option<Uuid>,
        #[arg(long)]
        ps: Option<Uuid>,
        #[arg(long)]
        customer: Option<String>,
        #[arg(long)]
        comments: Option<String>,
        /// Finish the current step after saving
        #[arg(long)]
        finish_step: bool,
    },
    /// Finish the current step and hand the request on
    Submit {
        /// Request ID
        id: Uuid,
    },
    /// Deny the request and hand it back to the requester
    Deny {
        /// Request ID
        id: Uuid,
        /// Reason for the denial; required unless the request has comments
        #[arg(long)]
        comment: Option<String>,
    },
    /// Record the customer's reaction to the decision
    Contact {
        /// Request ID
        id: Uuid,
        /// accepted or rejected after a release, notified after a denial
        #[arg(long)]
        decision: CustomerNotification,
        /// Rejection reason or follow-up note
        #[arg(long)]
        text: Option<String>,
    },
    /// Make another employee responsible for the current step
    Reassign {
        /// Request ID
        id: Uuid,
        /// Employee taking over
        #[arg(long)]
        employee: Uuid,
    },
    /// Show what submitting the request would do
    Preview {
        /// Request ID
        id: Uuid,
    },
    /// Delete a request; decided workflows are kept for audit
    Delete {
        /// Request ID
        id: Uuid,
    },
    /// List open responsibilities
    Open {
        /// Only show responsibilities of this employee
        #[arg(long)]
        employee: Option<Uuid>,
    },
    /// Show a workflow by its own ID, including detached audit records
    Workflow {
        /// Workflow ID
        workflow_id: Uuid,
    },
}

// ============================================================================
// Output types
// ============================================================================

#[derive(Debug, serde::Serialize)]
pub struct StepOutput {
    pub role: Role,
    pub employee: Option<Uuid>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize)]
pub struct WorkflowOutput {
    pub id: Uuid,
    pub request_id: Option<Uuid>,
    pub status: String,
    pub customer_notification: String,
    pub current_role: Option<Role>,
    pub current_responsible: Option<Uuid>,
    pub needs_reassignment: bool,
    pub remaining_steps: Vec<Role>,
    pub completed_steps: Vec<StepOutput>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rejection_reason_or_follow_up: Option<String>,
}

impl From<&ReleaseWorkflow> for WorkflowOutput {
    fn from(wf: &ReleaseWorkflow) -> Self {
        Self {
            id: wf.id,
            request_id: wf.request_id,
            status: wf.status.as_str().to_string(),
            customer_notification: wf.customer_notification.as_str().to_string(),
            current_role: wf.current_role,
            current_responsible: wf.current_responsible,
            needs_reassignment: wf.needs_reassignment(),
            remaining_steps: wf.remaining_steps.iter().copied().collect(),
            completed_steps: wf
                .completed_steps
                .iter()
                .map(|s| StepOutput {
                    role: s.role,
                    employee: s.employee,
                    completed_at: s.completed_at,
                })
                .collect(),
            started_at: wf.started_at,
            finished_at: wf.finished_at,
            rejection_reason_or_follow_up: wf.rejection_reason_or_follow_up.clone(),
        }
    }
}

impl WorkflowOutput {
    fn human_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Workflow: {}", self.id),
            format!("Status: {} (customer: {})", self.status, self.customer_notification),
        ];

        match (self.current_role, self.current_responsible) {
            (Some(role), Some(employee)) => lines.push(format!("Current: {role} ({employee})")),
            (Some(role), None) => lines.push(format!("Current: {role} (UNASSIGNED, reassignment needed)")),
            (None, _) => lines.push("Current: none (closed)".to_string()),
        }

        if !self.remaining_steps.is_empty() {
            let remaining: Vec<&str> = self.remaining_steps.iter().map(|r| r.display_name()).collect();
            lines.push(format!("Remaining: {}", remaining.join(" -> ")));
        }
        if let Some(finished) = self.finished_at {
            lines.push(format!("Decided: {}", finished.format("%Y-%m-%d %H:%M")));
        }
        if let Some(note) = &self.rejection_reason_or_follow_up {
            lines.push(format!("Note: {note}"));
        }

        if !self.completed_steps.is_empty() {
            let mut table = list_table(&["#", "role", "employee", "completed"]);
            for (i, step) in self.completed_steps.iter().enumerate() {
                table.add_row(vec![
                    (i + 1).to_string(),
                    step.role.to_string(),
                    step.employee.map_or_else(|| "(removed)".to_string(), |e| short_id(&e)),
                    step.completed_at.format("%Y-%m-%d %H:%M").to_string(),
                ]);
            }
            lines.push(format!("\nHistory:\n{table}"));
        }
        lines
    }
}

impl CommandOutput for WorkflowOutput {
    fn to_human(&self) -> String {
        self.human_lines().join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RequestOutput {
    pub id: Uuid,
    pub part_number: String,
    pub customer_code: Option<String>,
    pub created_by: Option<Uuid>,
    pub product_manager: Option<Uuid>,
    pub product_specialist: Option<Uuid>,
    pub comments: Option<String>,
    pub version: i64,
}

impl From<&PartNumberRequest> for RequestOutput {
    fn from(request: &PartNumberRequest) -> Self {
        Self {
            id: request.id,
            part_number: request.part_number.clone(),
            customer_code: request.customer_code.clone(),
            created_by: request.created_by,
            product_manager: request.product_manager,
            product_specialist: request.product_specialist,
            comments: request.comments.clone(),
            version: request.version,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RequestDetailOutput {
    pub request: RequestOutput,
    pub workflow: WorkflowOutput,
}

impl From<&TrackedRequest> for RequestDetailOutput {
    fn from(tracked: &TrackedRequest) -> Self {
        Self {
            request: RequestOutput::from(&tracked.request),
            workflow: WorkflowOutput::from(&tracked.workflow),
        }
    }
}

fn employee_label(employee: Option<Uuid>) -> String {
    employee.map_or_else(|| "-".to_string(), |e| e.to_string())
}

impl CommandOutput for RequestDetailOutput {
    fn to_human(&self) -> String {
        let r = &self.request;
        let mut lines = vec![
            format!("Request: {} ({})", r.part_number, r.id),
            format!("Customer: {}", r.customer_code.as_deref().unwrap_or("-")),
            format!("Creator: {}", employee_label(r.created_by)),
            format!("Product Manager: {}", employee_label(r.product_manager)),
            format!("Product Specialist: {}", employee_label(r.product_specialist)),
        ];
        if let Some(comments) = &r.comments {
            lines.push(format!("Comments: {comments}"));
        }
        lines.push(String::new());
        lines.extend(self.workflow.human_lines());
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RequestActionOutput {
    pub success: bool,
    pub message: String,
    pub request: RequestDetailOutput,
}

impl RequestActionOutput {
    fn new(message: impl Into<String>, tracked: &TrackedRequest) -> Self {
        Self {
            success: true,
            message: message.into(),
            request: RequestDetailOutput::from(tracked),
        }
    }
}

impl CommandOutput for RequestActionOutput {
    fn to_human(&self) -> String {
        format!("{}\n\n{}", self.message, self.request.to_human())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct PreviewOutput {
    pub request_id: Uuid,
    pub submission: Submission,
}

impl CommandOutput for PreviewOutput {
    fn to_human(&self) -> String {
        match self.submission {
            Submission::NoReleaseFlow => {
                "No release flow is configured; submitting releases the request immediately.".to_string()
            }
            Submission::Finish => "Submitting makes the release decision and returns the request to its creator.".to_string(),
            Submission::NextEmployee { role, employee } => {
                format!("Submitting hands the request to {employee} as {role}.")
            }
            Submission::ResponsibilityMissing { role } => format!(
                "Next step of task cannot be assigned to any employee: nobody holds the {role} role."
            ),
            Submission::Decided => "The release decision has already been made.".to_string(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct DeleteOutput {
    pub request_id: Uuid,
    pub outcome: DeleteOutcome,
}

impl CommandOutput for DeleteOutput {
    fn to_human(&self) -> String {
        match self.outcome {
            DeleteOutcome::Detached { workflow_id } => format!(
                "Request {} deleted. Its decided workflow {} is kept for audit.",
                self.request_id, workflow_id
            ),
            DeleteOutcome::Deleted { workflow_id } => format!(
                "Request {} deleted together with its open workflow {}.",
                self.request_id, workflow_id
            ),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct OpenResponsibilitiesOutput {
    pub responsibilities: Vec<OpenResponsibility>,
    pub total: usize,
}

impl CommandOutput for OpenResponsibilitiesOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["request", "part number", "role", "responsible", "waiting since"]);
        for item in &self.responsibilities {
            let since = item.last_step_completed_at.unwrap_or(item.started_at);
            table.add_row(vec![
                short_id(&item.request_id),
                truncate(&item.part_number, 24),
                item.role.to_string(),
                short_id(&item.responsible),
                since.format("%Y-%m-%d %H:%M").to_string(),
            ]);
        }
        render_list("open responsibility", "open responsibilities", &table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

// ============================================================================
// Execution
// ============================================================================

pub async fn execute(args: RequestArgs, config: &Config, json_mode: bool) -> Result<()> {
    let service = open_service(config).await?;

    match args.command {
        RequestCommands::Create { part_number, creator, pm, ps, customer, comments, flow, submit } => {
            let mut request = PartNumberRequest::new(part_number, creator);
            request.product_manager = pm;
            request.product_specialist = ps;
            request.customer_code = customer;
            request.comments = comments;

            let tracked = service.create_request(request, flow, submit).await?;
            let out = RequestActionOutput::new(format!("Request created: {}", tracked.request.id), &tracked);
            output(&out, json_mode);
        }

        RequestCommands::Show { id } => {
            let tracked = service.get(id).await?;
            output(&RequestDetailOutput::from(&tracked), json_mode);
        }

        RequestCommands::Update { id, pm, ps, customer, comments, finish_step } => {
            let mut request = service.get(id).await?.request;
            if pm.is_some() {
                request.product_manager = pm;
            }
            if ps.is_some() {
                request.product_specialist = ps;
            }
            if customer.is_some() {
                request.customer_code = customer;
            }
            if comments.is_some() {
                request.comments = comments;
            }

            let tracked = service.update_request(request, finish_step).await?;
            let message = if finish_step { "Request saved and step finished" } else { "Request saved" };
            output(&RequestActionOutput::new(message, &tracked), json_mode);
        }

        RequestCommands::Submit { id } => {
            let tracked = service.submit(id).await?;
            output(&RequestActionOutput::new("Step finished", &tracked), json_mode);
        }

        RequestCommands::Deny { id, comment } => {
            let tracked = service.deny(id, comment).await?;
            output(&RequestActionOutput::new("Request denied", &tracked), json_mode);
        }

        RequestCommands::Contact { id, decision, text } => {
            let tracked = service.contact_customer(id, decision, text).await?;
            output(
                &RequestActionOutput::new(format!("Customer contact recorded: {decision}"), &tracked),
                json_mode,
            );
        }

        RequestCommands::Reassign { id, employee } => {
            let tracked = service.reassign(id, employee).await?;
            output(
                &RequestActionOutput::new(format!("Current step reassigned to {employee}"), &tracked),
                json_mode,
            );
        }

        RequestCommands::Preview { id } => {
            let submission = service.preview(id).await?;
            output(&PreviewOutput { request_id: id, submission }, json_mode);
        }

        RequestCommands::Delete { id } => {
            let outcome = service.delete_request(id).await?;
            output(&DeleteOutput { request_id: id, outcome }, json_mode);
        }

        RequestCommands::Open { employee } => {
            let responsibilities = service.open_responsibilities(employee).await?;
            let out = OpenResponsibilitiesOutput {
                total: responsibilities.len(),
                responsibilities,
            };
            output(&out, json_mode);
        }

        RequestCommands::Workflow { workflow_id } => {
            let workflow = service.get_workflow(workflow_id).await?;
            output(&WorkflowOutput::from(&workflow), json_mode);
        }
    }

    Ok(())
}
