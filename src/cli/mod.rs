//! Command-line interface.

pub mod commands;
pub mod display;
pub mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::adapters::sqlite::{initialize_database, SqliteRequestRepository};
use crate::domain::errors::{DomainError, WorkflowError};
use crate::domain::models::{Config, Role, RoleSlot};
use crate::services::RequestService;

#[derive(Parser, Debug)]
#[command(name = "release-flow")]
#[command(about = "Release workflow for part-number requests", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the project directory and database
    Init(commands::init::InitArgs),
    /// Create and drive part-number requests through their release flow
    Request(commands::request::RequestArgs),
    /// Manage employees referenced by requests
    Employee(commands::employee::EmployeeArgs),
}

/// Open the configured database and build the request service.
pub async fn open_service(config: &Config) -> Result<RequestService<SqliteRequestRepository>> {
    let pool = initialize_database(&config.database)
        .await
        .context("Failed to initialize database. Run 'release-flow init' first.")?;
    let repository = Arc::new(SqliteRequestRepository::new(pool));
    Ok(RequestService::new(repository, config.workflow.clone()))
}

/// What the user can do about a failed command, if anything obvious.
fn hint_for(err: &anyhow::Error) -> Option<String> {
    let domain = err.downcast_ref::<DomainError>()?;
    match domain {
        DomainError::Workflow(WorkflowError::EmployeeNotSet(role)) => Some(employee_not_set_hint(*role)),
        DomainError::Workflow(WorkflowError::DenialNeedsComments) => {
            Some("Pass --comment or add comments to the request before denying it".to_string())
        }
        DomainError::ConcurrencyConflict { .. } => {
            Some("The request was changed by someone else; reload it and try again".to_string())
        }
        _ => None,
    }
}

/// The slot of a role is filled with `request update`; `request reassign` only
/// covers the role that is current, which is the only way to reach the creator.
fn employee_not_set_hint(role: Role) -> String {
    let flag = match role.slot() {
        Some(RoleSlot::ProductManager) => Some("--pm"),
        Some(RoleSlot::ProductSpecialist) => Some("--ps"),
        Some(RoleSlot::Creator) | None => None,
    };
    match flag {
        Some(flag) => format!(
            "Assign an employee to the {role} role with 'release-flow request update <ID> {flag} <EMPLOYEE>' \
             (or 'release-flow request reassign' if it is the current step)"
        ),
        None => format!(
            "Assign an employee to the {role} role with 'release-flow request reassign' while it is the current step"
        ),
    }
}

/// Print an error in the selected output mode and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let hint = hint_for(&err);
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
            "hint": hint,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
        if let Some(hint) = hint {
            eprintln!("Hint: {hint}");
        }
    }
    std::process::exit(1);
}
