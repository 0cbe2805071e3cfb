mod dispatcher;
mod history;
mod invocation;

pub use dispatcher::{DispatchConfig, Dispatcher};
pub use history::{ExecutionHistory, ExecutionStats, InvocationRecord};
pub use invocation::{
    Content, INTERNAL_ERROR_MESSAGE, InvocationError, InvocationRequest, InvocationResult,
    ToolCallResponse,
};
