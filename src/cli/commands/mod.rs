//! CLI command implementations.

pub mod employee;
pub mod init;
pub mod request;
