//! Diagnostic tools that need no upstream credentials.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use super::{Arguments, ParamSpec, ParamType, Tool, ToolRegistry, string_arg};
use crate::config::AppConfig;
use crate::error::{FlexAgentsError, ToolError};

/// Register the built-in tools
pub fn register(registry: &mut ToolRegistry, config: &AppConfig) -> Result<(), FlexAgentsError> {
    registry.register(EchoTool)?;
    registry.register(HealthCheckTool::new(config.services()))?;
    Ok(())
}

/// Returns its `message` argument unchanged
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo a message back to the caller. Useful for checking connectivity."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("message", ParamType::String).describe("The message to echo")]
    }

    fn returns(&self) -> Option<&str> {
        Some("Object with an 'echo' field containing the message")
    }

    fn examples(&self) -> Vec<Value> {
        vec![json!({ "message": "hello" })]
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let message = string_arg(&args, "message")?;
        Ok(json!({ "echo": message }))
    }
}

/// Reports server version and which upstream services have credentials
pub struct HealthCheckTool {
    services: BTreeMap<&'static str, bool>,
}

impl HealthCheckTool {
    pub fn new(services: BTreeMap<&'static str, bool>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for HealthCheckTool {
    fn name(&self) -> &str {
        "health_check"
    }

    fn description(&self) -> &str {
        "Report server health and version"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn returns(&self) -> Option<&str> {
        Some("Health status, server version, configured services and current UTC time")
    }

    async fn execute(&self, _args: Arguments) -> Result<Value, ToolError> {
        Ok(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "services": self.services,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}
