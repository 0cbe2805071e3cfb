use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use super::retry::{RetryPolicy, retry_with_backoff};
use super::{Arguments, ParamSpec, Tool};
use crate::error::ToolError;

type Handler = dyn Fn(Arguments) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync;

/// A tool backed by an async closure.
///
/// Used by provider modules that prefer an explicit registration call over
/// implementing [`Tool`] on a dedicated type:
///
/// ```
/// # use flex_agents::{FnTool, ParamSpec, ParamType, ToolRegistry};
/// # use serde_json::json;
/// let mut registry = ToolRegistry::new();
/// registry
///     .register(
///         FnTool::builder("Echo")
///             .description("Echo a message back")
///             .param(ParamSpec::required("message", ParamType::String))
///             .handler(|args| async move { Ok(json!({ "echo": args["message"] })) }),
///     )
///     .unwrap();
/// ```
pub struct FnTool {
    name: String,
    description: String,
    parameters: Vec<ParamSpec>,
    returns: Option<String>,
    examples: Vec<Value>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    handler: Arc<Handler>,
}

impl FnTool {
    pub fn builder(name: impl Into<String>) -> FnToolBuilder {
        FnToolBuilder {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            returns: None,
            examples: Vec::new(),
            timeout: None,
            retry: None,
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        self.parameters.clone()
    }

    fn returns(&self) -> Option<&str> {
        self.returns.as_deref()
    }

    fn examples(&self) -> Vec<Value> {
        self.examples.clone()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        match &self.retry {
            Some(policy) => {
                retry_with_backoff(policy, &self.name, || (self.handler)(args.clone())).await
            }
            None => (self.handler)(args).await,
        }
    }
}

/// Builder for [`FnTool`]; finished by supplying the handler
pub struct FnToolBuilder {
    name: String,
    description: String,
    parameters: Vec<ParamSpec>,
    returns: Option<String>,
    examples: Vec<Value>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
}

impl FnToolBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = ParamSpec>) -> Self {
        self.parameters.extend(params);
        self
    }

    pub fn returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = Some(returns.into());
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.examples.push(example);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Repeat the handler on retryable failures. The tool's timeout still
    /// bounds the whole sequence of attempts.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn handler<F, Fut>(self, handler: F) -> FnTool
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let description = if self.description.is_empty() {
            format!("Tool: {}", self.name)
        } else {
            self.description
        };

        FnTool {
            name: self.name,
            description,
            parameters: self.parameters,
            returns: self.returns,
            examples: self.examples,
            timeout: self.timeout,
            retry: self.retry,
            handler: Arc::new(move |args| handler(args).boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ParamType;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn closure_handler_receives_arguments() {
        let tool = FnTool::builder("teams_management")
            .description("Manage Teams")
            .param(ParamSpec::required("teamName", ParamType::String))
            .handler(|args| async move { Ok(json!({ "created": args["teamName"] })) });

        let mut args = Arguments::new();
        args.insert("teamName".into(), json!("Finance"));

        let result = tool.execute(args).await.unwrap();
        assert_eq!(result, json!({ "created": "Finance" }));
    }

    #[tokio::test]
    async fn retry_policy_repeats_throttled_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let tool = FnTool::builder("m365_group_management")
            .retry(RetryPolicy::default().with_initial_delay(Duration::from_millis(5)))
            .handler(move |_args| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(ToolError::upstream("graph", "429 Too Many Requests"))
                    } else {
                        Ok(json!({ "groups": [] }))
                    }
                }
            });

        let result = tool.execute(Arguments::new()).await.unwrap();
        assert_eq!(result, json!({ "groups": [] }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn without_retry_policy_first_failure_is_final() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let tool = FnTool::builder("m365_group_management").handler(move |_args| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ToolError::upstream("graph", "429 Too Many Requests")) }
        });

        assert!(tool.execute(Arguments::new()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn description_falls_back_to_name() {
        let tool = FnTool::builder("workflow_monitoring").handler(|_args| async { Ok(json!(null)) });
        assert_eq!(tool.description(), "Tool: workflow_monitoring");
    }

    #[test]
    fn builder_carries_metadata() {
        let tool = FnTool::builder("cost_analysis")
            .description("Analyze Azure spend")
            .params([
                ParamSpec::required("subscriptionId", ParamType::String),
                ParamSpec::optional("days", ParamType::Integer).with_default(json!(30)),
            ])
            .returns("Cost breakdown by resource group")
            .timeout(Duration::from_secs(45))
            .handler(|_args| async { Ok(json!({})) });

        assert_eq!(tool.parameters().len(), 2);
        assert_eq!(tool.returns(), Some("Cost breakdown by resource group"));
        assert_eq!(tool.timeout(), Some(Duration::from_secs(45)));
    }
}
