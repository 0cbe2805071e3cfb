use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised by the registry, configuration and server plumbing.
#[derive(Debug, thiserror::Error)]
pub enum FlexAgentsError {
    #[error("duplicate tool: '{0}' is already registered")]
    DuplicateTool(String),

    #[error("tool not found: '{0}'")]
    ToolNotFound(String),

    #[error("invalid tool descriptor: {tool_name}: {message}")]
    InvalidDescriptor { tool_name: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Errors returned by tool handlers.
///
/// Handlers return the typed variants for expected failure modes. Anything
/// else can be propagated with `?` and lands in [`ToolError::Internal`], which
/// the dispatcher logs in full and reports to the caller with a generic message.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),

    #[error("{service}: {message}")]
    Upstream { service: String, message: String },

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Failure category reported to callers of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    ValidationError,
    UpstreamError,
    Timeout,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamError | Self::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
