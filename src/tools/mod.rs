pub mod builtin;
mod function;
mod registry;
pub mod retry;
mod schema;

pub use function::{FnTool, FnToolBuilder};
pub use registry::{ManifestEntry, ToolDescriptor, ToolRegistry};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use schema::{ParamSpec, ParamType, input_schema};

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::AppConfig;
use crate::error::{FlexAgentsError, ToolError};

/// Arguments passed to a tool handler, keyed by parameter name
pub type Arguments = Map<String, Value>;

/// A named capability that can be invoked through the dispatcher
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool
    fn name(&self) -> &str;

    /// A description of what this tool does
    fn description(&self) -> &str;

    /// Declared parameters, in the order they are advertised
    fn parameters(&self) -> Vec<ParamSpec>;

    /// Free-text description of the result shape
    fn returns(&self) -> Option<&str> {
        None
    }

    /// Example argument objects for the manifest
    fn examples(&self) -> Vec<Value> {
        Vec::new()
    }

    /// Deadline overriding the server default
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Execute the tool with validated arguments
    async fn execute(&self, args: Arguments) -> Result<Value, ToolError>;
}

/// Register every tool provider with the registry.
///
/// This is the single startup routine; each provider module exposes a
/// `register(&mut ToolRegistry, &AppConfig)` function and is called from here.
pub fn register_all_tools(
    registry: &mut ToolRegistry,
    config: &AppConfig,
) -> Result<(), FlexAgentsError> {
    for (service, configured) in config.services() {
        if !configured {
            warn!(service, "credentials not configured, upstream calls will fail");
        }
    }

    builtin::register(registry, config)?;
    registry.log_summary();
    Ok(())
}

/// Fetch a string argument that validation has already declared required
pub fn string_arg<'a>(args: &'a Arguments, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::validation(format!("missing '{}' parameter", name)))
}

/// Fetch an optional string argument
pub fn optional_string_arg<'a>(args: &'a Arguments, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}
