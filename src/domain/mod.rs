//! Domain layer for the release workflow.
//!
//! This module contains the role catalog, the request and workflow models,
//! domain errors and the port traits implemented by adapters.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult, WorkflowError};
