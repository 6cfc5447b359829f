pub mod config;
pub mod request;
pub mod role;
pub mod workflow;

pub use config::{Config, DatabaseConfig, LoggingConfig, WorkflowConfig};
pub use request::PartNumberRequest;
pub use role::{Role, RoleSlot};
pub use workflow::{CompletedStep, CustomerNotification, ReleaseWorkflow, WorkflowStatus};
