//! Service layer: the release workflow engine and the request service around it.

pub mod integrity_guard;
pub mod request_service;
pub mod resolver;
pub mod workflow_engine;

pub use integrity_guard::{integrity_check, IntegrityReport};
pub use crate::domain::ports::DeleteOutcome;
pub use request_service::RequestService;
pub use resolver::resolve;
pub use workflow_engine::{ReleaseWorkflowEngine, Submission};
