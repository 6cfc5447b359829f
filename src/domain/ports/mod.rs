//! Port trait definitions (Hexagonal Architecture)
//!
//! - RequestRepository: persistence of part-number requests and their release workflows
//!
//! These traits let the service layer stay independent of the storage engine.

pub mod request_repository;

pub use request_repository::{DeleteOutcome, OpenResponsibility, RequestRepository, TrackedRequest};
