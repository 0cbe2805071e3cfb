use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::history::{ExecutionHistory, ExecutionStats, InvocationRecord};
use super::invocation::{
    INTERNAL_ERROR_MESSAGE, InvocationError, InvocationRequest, InvocationResult,
};
use crate::config::{ServerConfig, UnknownArgumentPolicy};
use crate::error::{ErrorKind, ToolError};
use crate::tools::{Arguments, ToolDescriptor, ToolRegistry};

/// Settings that shape every invocation
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Deadline applied when a tool does not declare its own
    pub default_timeout: Duration,
    pub unknown_arguments: UnknownArgumentPolicy,
    pub max_history: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for DispatchConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            default_timeout: server.timeout(),
            unknown_arguments: server.unknown_arguments,
            max_history: server.max_execution_history,
        }
    }
}

/// Resolves, validates, runs and normalizes tool invocations
pub struct Dispatcher {
    tools: Arc<ToolRegistry>,
    config: DispatchConfig,
    history: ExecutionHistory,
}

impl Dispatcher {
    /// Create a dispatcher with default settings
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self::with_config(tools, DispatchConfig::default())
    }

    pub fn with_config(tools: Arc<ToolRegistry>, config: DispatchConfig) -> Self {
        let history = ExecutionHistory::new(config.max_history);
        Self {
            tools,
            config,
            history,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    pub fn stats(&self) -> ExecutionStats {
        self.history.stats()
    }

    pub async fn invoke_request(&self, request: InvocationRequest) -> InvocationResult {
        self.invoke(&request.tool_name, request.arguments).await
    }

    /// Invoke a tool by name.
    ///
    /// Never fails: every outcome, including unknown tools, bad arguments,
    /// handler errors, panics and deadline expiry, is returned as an
    /// [`InvocationResult`]. Each call is timed and recorded.
    pub async fn invoke(&self, tool_name: &str, arguments: Arguments) -> InvocationResult {
        let invocation_id = Uuid::new_v4().to_string();
        let span = info_span!("invoke", tool = %tool_name, invocation_id = %invocation_id);

        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = self
            .run(tool_name, arguments)
            .instrument(span.clone())
            .await;

        let result = InvocationResult {
            tool_name: tool_name.to_string(),
            duration: start.elapsed(),
            outcome,
        };

        span.in_scope(|| emit_record(&result));
        self.history
            .record(InvocationRecord::from_result(invocation_id, started_at, &result));
        result
    }

    async fn run(&self, tool_name: &str, arguments: Arguments) -> Result<Value, InvocationError> {
        let descriptor = self.tools.get(tool_name).map_err(|_| {
            InvocationError::new(
                ErrorKind::NotFound,
                tool_name,
                format!("tool '{}' not found", tool_name),
            )
        })?;

        let arguments = self
            .validate(descriptor, arguments)
            .map_err(|message| InvocationError::new(ErrorKind::ValidationError, tool_name, message))?;

        let deadline = descriptor.timeout.unwrap_or(self.config.default_timeout);
        debug!(timeout_ms = deadline.as_millis() as u64, "executing tool");

        self.execute(descriptor, arguments, deadline)
            .await
            .map_err(|e| normalize(tool_name, e))
    }

    /// Check arguments against the declared parameters.
    ///
    /// Null values count as absent for optional parameters and are dropped.
    fn validate(&self, descriptor: &ToolDescriptor, mut arguments: Arguments) -> Result<Arguments, String> {
        let missing: Vec<&str> = descriptor
            .parameters
            .iter()
            .filter(|p| p.required && arguments.get(&p.name).is_none_or(Value::is_null))
            .map(|p| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required parameters: {}", missing.join(", ")));
        }

        let unknown: Vec<String> = arguments
            .keys()
            .filter(|k| descriptor.parameter(k).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            match self.config.unknown_arguments {
                UnknownArgumentPolicy::Reject => {
                    return Err(format!("unknown parameters: {}", unknown.join(", ")));
                }
                UnknownArgumentPolicy::Warn => {
                    warn!(unknown = ?unknown, "passing through undeclared parameters");
                }
            }
        }

        arguments.retain(|name, value| {
            !(value.is_null() && descriptor.parameter(name).is_some_and(|p| !p.required))
        });

        for param in &descriptor.parameters {
            if let Some(value) = arguments.get(&param.name) {
                param.check(value)?;
            }
        }

        Ok(arguments)
    }

    /// Run the handler in its own task under a deadline.
    ///
    /// On expiry the task is aborted; a panicking handler surfaces as an
    /// internal error instead of unwinding into the caller.
    async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        arguments: Arguments,
        deadline: Duration,
    ) -> Result<Value, ToolError> {
        let handler = descriptor.handler();
        let mut task = tokio::spawn(
            async move { handler.execute(arguments).await }.in_current_span(),
        );

        match timeout(deadline, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ToolError::Internal(anyhow::anyhow!(
                "handler task failed: {}",
                join_error
            ))),
            Err(_) => {
                task.abort();
                Err(ToolError::Timeout(deadline))
            }
        }
    }
}

fn normalize(tool_name: &str, err: ToolError) -> InvocationError {
    let kind = err.kind();
    let message = match &err {
        ToolError::Internal(detail) => {
            error!(error = ?detail, "tool failed with an unexpected error");
            INTERNAL_ERROR_MESSAGE.to_string()
        }
        ToolError::Timeout(deadline) => {
            format!("tool '{}' timed out after {}s", tool_name, deadline.as_secs_f64())
        }
        other => other.to_string(),
    };
    InvocationError::new(kind, tool_name, message)
}

fn emit_record(result: &InvocationResult) {
    let duration_ms = result.duration.as_millis() as u64;
    match result.error() {
        None => info!(
            tool = %result.tool_name,
            duration_ms,
            success = true,
            "tool invocation completed"
        ),
        Some(err) => info!(
            tool = %result.tool_name,
            duration_ms,
            success = false,
            error_kind = %err.kind,
            error = %err.message,
            "tool invocation failed"
        ),
    }
}
