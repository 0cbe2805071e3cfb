use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the dispatcher treats arguments a tool does not declare
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownArgumentPolicy {
    /// Fail the invocation with a validation error
    #[default]
    Reject,
    /// Log a warning and pass the argument through to the handler
    Warn,
}

/// Server-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub debug: bool,
    pub log_level: String,
    /// Number of invocation records kept for statistics
    pub max_execution_history: usize,
    /// Default per-invocation deadline
    pub timeout_seconds: u64,
    pub unknown_arguments: UnknownArgumentPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Flexible Agents MCP Server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            debug: false,
            log_level: "info".to_string(),
            max_execution_history: 1000,
            timeout_seconds: 300,
            unknown_arguments: UnknownArgumentPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
