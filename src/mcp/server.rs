use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::protocol::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, InitializeParams, JSONRPC_VERSION,
    JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND, Method, PARSE_ERROR, PROTOCOL_VERSION,
    RequestId,
};
use crate::config::ServerConfig;
use crate::error::FlexAgentsError;
use crate::runtime::{DispatchConfig, Dispatcher, InvocationRequest};
use crate::tools::ToolRegistry;

/// MCP server speaking line-delimited JSON-RPC.
///
/// All tool logic lives behind [`Dispatcher::invoke`]; the server only frames
/// requests and responses.
pub struct McpServer {
    name: String,
    version: String,
    dispatcher: Dispatcher,
    started_at: DateTime<Utc>,
    started: Instant,
    initialized: AtomicBool,
    request_count: AtomicU64,
}

impl McpServer {
    pub fn new(config: &ServerConfig, tools: Arc<ToolRegistry>) -> Self {
        let dispatcher = Dispatcher::with_config(tools, DispatchConfig::from(config));
        Self::with_dispatcher(&config.name, &config.version, dispatcher)
    }

    pub fn with_dispatcher(
        name: impl Into<String>,
        version: impl Into<String>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dispatcher,
            started_at: Utc::now(),
            started: Instant::now(),
            initialized: AtomicBool::new(false),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Handle one raw message. Returns `None` for notifications.
    pub async fn handle_message(&self, raw: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "received invalid JSON");
                return Some(JsonRpcResponse::failure(
                    None,
                    PARSE_ERROR,
                    format!("invalid JSON: {}", e),
                ));
            }
        };

        let id = value
            .get("id")
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    id,
                    INVALID_REQUEST,
                    format!("invalid request: {}", e),
                ));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                id,
                INVALID_REQUEST,
                format!("unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        self.handle_request(request).await
    }

    /// Route a parsed request to its method handler
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        debug!(method = %request.method, id = ?request.id, "handling request");

        let notification = request.is_notification();
        let id = request.id.clone();

        let response = match Method::parse(&request.method) {
            None => JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("unknown method: {}", request.method),
            ),
            Some(Method::Initialize) => self.initialize(id, request.params),
            Some(Method::Initialized) | Some(Method::Ping) => {
                JsonRpcResponse::success(id, json!({}))
            }
            Some(Method::ListTools) => JsonRpcResponse::success(id, self.list_tools()),
            Some(Method::CallTool) => self.call_tool(id, request.params).await,
            Some(Method::Stats) => respond(id, &self.stats()),
        };

        (!notification).then_some(response)
    }

    fn initialize(&self, id: Option<RequestId>, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "missing initialize parameters");
        };
        let params: InitializeParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::failure(
                    id,
                    INVALID_PARAMS,
                    format!("invalid initialize parameters: {}", e),
                );
            }
        };

        self.initialized.store(true, Ordering::SeqCst);
        info!(
            client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            client_protocol = %params.protocol_version,
            "client initialized"
        );

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": { "name": self.name, "version": self.version },
            }),
        )
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .dispatcher
            .registry()
            .manifest()
            .into_iter()
            .map(|entry| {
                json!({
                    "name": entry.name,
                    "description": entry.description,
                    "inputSchema": entry.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, id: Option<RequestId>, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "missing tool call parameters");
        };
        let request: InvocationRequest = match serde_json::from_value(params) {
            Ok(request) => request,
            Err(e) => {
                return JsonRpcResponse::failure(
                    id,
                    INVALID_PARAMS,
                    format!("invalid tool call parameters: {}", e),
                );
            }
        };

        let result = self.dispatcher.invoke_request(request).await;
        respond(id, &result.to_response())
    }

    /// Server, request and execution statistics
    pub fn stats(&self) -> Value {
        let uptime = self.started.elapsed().as_secs_f64();
        let requests = self.request_count.load(Ordering::Relaxed);
        let per_minute = if uptime > 0.0 {
            requests as f64 / uptime * 60.0
        } else {
            0.0
        };

        json!({
            "server_info": {
                "name": self.name,
                "version": self.version,
                "start_time": self.started_at.to_rfc3339(),
                "uptime_seconds": uptime,
                "initialized": self.is_initialized(),
            },
            "request_stats": {
                "total_requests": requests,
                "requests_per_minute": per_minute,
            },
            "registered_tools": self.dispatcher.registry().len(),
            "tool_stats": self.dispatcher.stats(),
        })
    }

    /// Serve line-delimited JSON-RPC until the reader is exhausted.
    ///
    /// Requests are handled concurrently; each response is written as one
    /// line when its request completes, so responses may arrive out of order.
    /// Lines that are not valid UTF-8 get a parse error and reading continues.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<(), FlexAgentsError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.split(b'\n');
        let mut in_flight = JoinSet::new();
        let mut reading = true;

        loop {
            tokio::select! {
                segment = lines.next_segment(), if reading => match segment? {
                    Some(bytes) => match String::from_utf8(bytes) {
                        Ok(line) if line.trim().is_empty() => {}
                        Ok(line) => {
                            let server = Arc::clone(&self);
                            in_flight.spawn(async move { server.handle_message(&line).await });
                        }
                        Err(e) => {
                            warn!(error = %e, "received a line that is not valid UTF-8");
                            let response = JsonRpcResponse::failure(
                                None,
                                PARSE_ERROR,
                                format!("invalid UTF-8: {}", e.utf8_error()),
                            );
                            write_response(&mut writer, &response).await?;
                        }
                    },
                    None => {
                        debug!("input closed, draining in-flight requests");
                        reading = false;
                    }
                },
                Some(joined) = in_flight.join_next() => match joined {
                    Ok(Some(response)) => write_response(&mut writer, &response).await?,
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "request task failed"),
                },
                else => break,
            }
        }

        Ok(())
    }

    /// Serve over the process's stdin and stdout
    pub async fn run_stdio(self: Arc<Self>) -> Result<(), FlexAgentsError> {
        info!(
            name = %self.name,
            version = %self.version,
            tools = self.dispatcher.registry().len(),
            "starting MCP server on stdio"
        );
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await?;
        info!("MCP server shut down");
        Ok(())
    }
}

fn respond<T: Serialize>(id: Option<RequestId>, body: &T) -> JsonRpcResponse {
    match serde_json::to_value(body) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            JsonRpcResponse::failure(id, INTERNAL_ERROR, "failed to serialize response")
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<(), FlexAgentsError> {
    let mut line = serde_json::to_string(response).map_err(|e| FlexAgentsError::Protocol(e.to_string()))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tools::builtin;

    fn server() -> McpServer {
        let config = AppConfig::default();
        let mut registry = ToolRegistry::new();
        builtin::register(&mut registry, &config).unwrap();
        McpServer::new(&config.server, Arc::new(registry))
    }

    async fn call(server: &McpServer, message: Value) -> Value {
        let response = server
            .handle_message(&message.to_string())
            .await
            .expect("request should produce a response");
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_capabilities() {
        let server = server();
        let response = call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "test-client", "version": "1.0" }
                }
            }),
        )
        .await;

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(response["result"]["serverInfo"]["name"], "Flexible Agents MCP Server");
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn initialize_without_params_is_invalid() {
        let response = call(&server(), json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" })).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn tools_list_follows_registration_order() {
        let response = call(&server(), json!({ "jsonrpc": "2.0", "id": "a", "method": "tools/list" })).await;

        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools[0]["name"], "echo");
        assert_eq!(tools[1]["name"], "health_check");
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["message"]));
    }

    #[tokio::test]
    async fn tools_call_returns_content() {
        let response = call(
            &server(),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": { "name": "echo", "arguments": { "message": "hi" } }
            }),
        )
        .await;

        assert_eq!(response["result"]["isError"], false);
        assert_eq!(response["result"]["structuredContent"]["echo"], "hi");
    }

    #[tokio::test]
    async fn tools_call_failure_is_a_result_not_a_protocol_error() {
        let response = call(
            &server(),
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": { "name": "Missing" }
            }),
        )
        .await;

        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(response["result"]["error"]["kind"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn non_object_arguments_are_invalid_params() {
        let response = call(
            &server(),
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": { "name": "echo", "arguments": ["hi"] }
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_and_bad_json() {
        let server = server();
        let response = call(&server, json!({ "jsonrpc": "2.0", "id": 5, "method": "prompts/list" })).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);

        let response = server.handle_message("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);

        let response = call(&server, json!({ "jsonrpc": "1.0", "id": 6, "method": "ping" })).await;
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
        assert_eq!(response["id"], 6);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let server = server();
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn stats_count_requests_and_invocations() {
        let server = server();
        call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": { "name": "health_check", "arguments": {} }
            }),
        )
        .await;

        let response = call(&server, json!({ "jsonrpc": "2.0", "id": 2, "method": "server/stats" })).await;
        let stats = &response["result"];
        assert_eq!(stats["request_stats"]["total_requests"], 2);
        assert_eq!(stats["registered_tools"], 2);
        assert_eq!(stats["tool_stats"]["total_executions"], 1);
        assert_eq!(stats["tool_stats"]["tool_usage"]["health_check"], 1);
    }

    #[tokio::test]
    async fn serve_writes_one_line_per_response() {
        let server = Arc::new(server());
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
        ]
        .join("\n");

        let mut output = Vec::new();
        Arc::clone(&server)
            .serve(input.as_bytes(), &mut output)
            .await
            .unwrap();

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);

        let echo = responses.iter().find(|r| r["id"] == 2).unwrap();
        assert_eq!(echo["result"]["structuredContent"]["echo"], "hi");
        assert!(responses.iter().any(|r| r["id"] == 1));
    }
}
