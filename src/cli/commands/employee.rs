//! Employee CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::open_service;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct EmployeeArgs {
    #[command(subcommand)]
    pub command: EmployeeCommands,
}

#[derive(Subcommand, Debug)]
pub enum EmployeeCommands {
    /// Remove an employee from every request, workflow and step record
    Remove {
        /// Employee ID
        id: Uuid,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct EmployeeRemovedOutput {
    pub employee: Uuid,
    pub references_cleared: u64,
}

impl CommandOutput for EmployeeRemovedOutput {
    fn to_human(&self) -> String {
        if self.references_cleared == 0 {
            return format!("Employee {} was not referenced anywhere.", self.employee);
        }
        format!(
            "Employee {} removed: {} reference(s) cleared.\nAffected requests need 'release-flow request reassign' before they can advance.",
            self.employee, self.references_cleared
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: EmployeeArgs, config: &Config, json_mode: bool) -> Result<()> {
    let service = open_service(config).await?;

    match args.command {
        EmployeeCommands::Remove { id } => {
            let references_cleared = service.remove_employee(id).await?;
            output(&EmployeeRemovedOutput { employee: id, references_cleared }, json_mode);
        }
    }

    Ok(())
}
