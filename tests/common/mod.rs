#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use flex_agents::{
    Arguments, FlexAgentsError, ParamSpec, ParamType, Tool, ToolError, ToolRegistry,
};

/// Build an argument map from a JSON object literal.
pub fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// A stand-in for an M365 provider tool that counts how often its handler runs.
pub struct CountingUserTool {
    pub name: &'static str,
    pub calls: Arc<AtomicUsize>,
}

impl CountingUserTool {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Tool for CountingUserTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Create a Microsoft 365 user"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("userPrincipalName", ParamType::String),
            ParamSpec::required("displayName", ParamType::String),
            ParamSpec::optional("accountEnabled", ParamType::Boolean).with_default(json!(true)),
        ]
    }

    fn returns(&self) -> Option<&str> {
        Some("The created user's id and principal name")
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let upn = flex_agents::tools::string_arg(&args, "userPrincipalName")?;
        if !upn.contains('@') {
            return Err(ToolError::upstream(
                "graph",
                "400 Bad Request: userPrincipalName must contain a domain",
            ));
        }
        Ok(json!({ "id": "00000000-0000-0000-0000-000000000001", "userPrincipalName": upn }))
    }
}

/// Provider module registering the user tool, as each provider file does.
pub fn register_m365_provider(
    registry: &mut ToolRegistry,
    tool: CountingUserTool,
) -> Result<(), FlexAgentsError> {
    registry.register(tool)
}
