pub mod config;
pub mod error;
pub mod mcp;
pub mod runtime;
pub mod tools;

pub use config::{AppConfig, ServerConfig, UnknownArgumentPolicy};
pub use error::{ErrorKind, FlexAgentsError, ToolError};
pub use mcp::McpServer;
pub use runtime::{
    DispatchConfig, Dispatcher, ExecutionStats, InvocationError, InvocationRequest,
    InvocationResult, ToolCallResponse,
};
pub use tools::{
    Arguments, FnTool, ManifestEntry, ParamSpec, ParamType, Tool, ToolDescriptor, ToolRegistry,
    register_all_tools,
};
