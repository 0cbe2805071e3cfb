use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use crate::error::ErrorKind;
use crate::tools::Arguments;

/// Generic message returned to callers when a handler fails unexpectedly
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error while executing tool; see server logs";

/// A request to run one tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    #[serde(alias = "name")]
    pub tool_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub arguments: Arguments,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Arguments, D::Error> {
    Option::<Arguments>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl InvocationRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Structured failure of an invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {tool_name}: {message}")]
pub struct InvocationError {
    pub kind: ErrorKind,
    pub message: String,
    pub tool_name: String,
}

impl InvocationError {
    pub fn new(kind: ErrorKind, tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tool_name: tool_name.into(),
        }
    }
}

/// Outcome of a single invocation; always produced, never thrown
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub tool_name: String,
    pub duration: Duration,
    pub outcome: Result<Value, InvocationError>,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&InvocationError> {
        self.outcome.as_ref().err()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(|e| e.kind)
    }

    /// Render as the response body of an MCP `tools/call`
    pub fn to_response(&self) -> ToolCallResponse {
        match &self.outcome {
            Ok(payload) => ToolCallResponse {
                content: vec![Content::text(render_payload(payload))],
                structured_content: payload.is_object().then(|| payload.clone()),
                is_error: false,
                error: None,
            },
            Err(err) => ToolCallResponse {
                content: vec![Content::text(format!(
                    "Error executing tool {}: {}",
                    err.tool_name, err.message
                ))],
                structured_content: None,
                is_error: true,
                error: Some(err.clone()),
            },
        }
    }
}

/// One block of tool output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Response body of a tool call: `{content, isError}` plus the structured
/// error on failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResponse {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
}

fn render_payload(payload: &Value) -> String {
    match payload {
        Value::Null => "Tool executed successfully (no output)".to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

impl Serialize for InvocationResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match &self.outcome {
            Ok(payload) => json!({
                "tool_name": self.tool_name,
                "success": true,
                "duration_ms": self.duration.as_millis() as u64,
                "payload": payload,
            }),
            Err(err) => json!({
                "tool_name": self.tool_name,
                "success": false,
                "duration_ms": self.duration.as_millis() as u64,
                "error": err,
            }),
        };
        body.serialize(serializer)
    }
}
