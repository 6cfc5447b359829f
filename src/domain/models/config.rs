//! Application configuration model.

use serde::{Deserialize, Serialize};

use super::role::Role;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".release-flow/release-flow.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// SQLite connection URL for the configured path.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// Directory for rolling log files. Stdout only when unset.
    pub log_dir: Option<String>,
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_dir: None,
            retention_days: 30,
        }
    }
}

/// Release workflow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Chain used when a request is created without an explicit flow.
    pub default_release_flow: Vec<Role>,
    /// How often a server-side operation reloads and retries after a concurrent edit.
    pub max_conflict_retries: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_release_flow: vec![
                Role::ProductSpecialist,
                Role::ProductManager,
                Role::ProductSpecialist,
            ],
            max_conflict_retries: 3,
        }
    }
}
