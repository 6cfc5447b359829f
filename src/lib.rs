//! Release Flow - release workflow engine for part-number requests
//!
//! Every part-number request travels through a configurable chain of roles
//! (product specialist, product manager, ...) before it is released or denied,
//! after which the requester records how the customer reacted.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): roles, requests, workflows, errors and ports
//! - **Service Layer** (`services`): the workflow engine and the request service
//! - **Adapters** (`adapters`): SQLite persistence
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```
//! use release_flow::domain::models::{PartNumberRequest, Role, WorkflowStatus};
//! use release_flow::services::ReleaseWorkflowEngine;
//! use uuid::Uuid;
//!
//! let engine = ReleaseWorkflowEngine::new();
//! let request = PartNumberRequest::new("PN-1", Uuid::new_v4()).with_product_manager(Uuid::new_v4());
//!
//! let wf = engine.start_workflow(&request, [Role::ProductManager])?;
//! let wf = engine.advance_step(&wf, &request, true)?; // requester submits
//! let wf = engine.advance_step(&wf, &request, true)?; // product manager approves
//! assert_eq!(wf.status, WorkflowStatus::Released);
//! # Ok::<(), release_flow::domain::WorkflowError>(())
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    CompletedStep, Config, CustomerNotification, PartNumberRequest, ReleaseWorkflow, Role,
    WorkflowStatus,
};
pub use domain::ports::{RequestRepository, TrackedRequest};
pub use domain::{DomainError, DomainResult, WorkflowError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ReleaseWorkflowEngine, RequestService, Submission};
