//! MCP server implementation.
//!
//! Wraps a `ToolRegistry` and exposes its tools over the MCP protocol.
//! One `McpServer` serves one client connection; the registry behind it
//! can be shared by many.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use toolbridge_tool_runtime::schema::validate_arguments;
use toolbridge_tool_runtime::{ToolContext, ToolError, ToolRegistry};

use crate::error::McpError;
use crate::transport::McpTransport;
use crate::types::*;

/// MCP server that bridges a `ToolRegistry` to MCP clients.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    server_name: String,
    server_version: String,
    call_timeout: Duration,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            server_name: "toolbridge-host".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            call_timeout: Duration::from_secs(60),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Upper bound on a single tool execution on this host.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Run the server loop, reading from and writing to the transport.
    ///
    /// Requests are answered in arrival order until the transport closes.
    pub async fn run<T: McpTransport>(&self, transport: &mut T) -> Result<(), McpError> {
        tracing::info!(server = %self.server_name, tools = self.registry.len(), "MCP server starting");

        while let Some(line) = transport.receive().await? {
            if let Some(reply) = self.handle_message(&line).await {
                transport.send(&reply).await?;
            }
        }

        tracing::info!("Transport closed, shutting down");
        Ok(())
    }

    /// Handle one raw frame. Returns the serialized reply, or `None` for
    /// notifications.
    pub async fn handle_message(&self, line: &str) -> Option<String> {
        tracing::debug!(message = %line, "Received message");

        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse JSON");
                return Some(self.encode(error_response(RpcId::Number(0), McpError::JsonParse(e))));
            }
        };

        if raw.get("id").is_none() {
            match serde_json::from_value::<JsonRpcNotification>(raw) {
                Ok(notif) => self.handle_notification(&notif),
                Err(e) => tracing::debug!(error = %e, "Dropping malformed notification"),
            }
            return None;
        }

        let response = match serde_json::from_value::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle_request(&request).await,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse JSON-RPC request");
                error_response(RpcId::Number(0), McpError::JsonParse(e))
            }
        };
        Some(self.encode(response))
    }

    /// Handle a single JSON-RPC request and produce a response.
    pub async fn handle_request(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        let outcome = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(&request.params),
            methods::PING => Ok(serde_json::json!({})),
            methods::LIST_TOOLS | methods::CALL_TOOL if !self.is_initialized() => {
                Err(McpError::NotInitialized)
            }
            methods::LIST_TOOLS => self.handle_list_tools(&request.params),
            methods::CALL_TOOL => self.handle_call_tool(&request.params).await,
            method => {
                tracing::warn!(method = %method, "Unknown method");
                Err(McpError::MethodNotFound(method.to_string()))
            }
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => error_response(id, e),
        }
    }

    fn handle_notification(&self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            methods::INITIALIZED => tracing::info!("Client confirmed initialization"),
            methods::CANCELLED => tracing::debug!("Client cancelled a request"),
            method => tracing::debug!(method = %method, "Unknown notification, ignoring"),
        }
    }

    fn handle_initialize(&self, params: &Option<Value>) -> Result<Value, McpError> {
        let params: InitializeParams = params
            .clone()
            .ok_or_else(|| McpError::InvalidParams("missing params".to_string()))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| McpError::InvalidParams(e.to_string()))
            })?;
        tracing::info!(
            client = %params.client_info.name,
            protocol = %params.protocol_version,
            "Handling initialize"
        );
        self.initialized.store(true, Ordering::Release);

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ImplementationInfo {
                name: self.server_name.clone(),
                version: Some(self.server_version.clone()),
            },
        };
        Ok(serde_json::to_value(result)?)
    }

    fn handle_list_tools(&self, params: &Option<Value>) -> Result<Value, McpError> {
        let params: ListToolsParams = match params {
            Some(p) => serde_json::from_value(p.clone())
                .map_err(|e| McpError::InvalidParams(e.to_string()))?,
            None => ListToolsParams::default(),
        };
        if let Some(cursor) = params.cursor {
            return Err(McpError::InvalidParams(format!("unknown cursor '{}'", cursor)));
        }

        let tools: Vec<ToolInfo> = self.registry.list().into_iter().map(ToolInfo::from).collect();
        tracing::debug!(count = tools.len(), "Handling tools/list");
        Ok(serde_json::to_value(ListToolsResult {
            tools,
            next_cursor: None,
        })?)
    }

    async fn handle_call_tool(&self, params: &Option<Value>) -> Result<Value, McpError> {
        let params = params
            .clone()
            .ok_or_else(|| McpError::InvalidParams("missing params".to_string()))?;
        let call: CallToolParams =
            serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))?;

        tracing::debug!(tool = %call.name, "Handling tools/call");

        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| McpError::ToolNotFound(call.name.clone()))?;

        let result = match validate_arguments(&tool.definition().input_schema, call.arguments) {
            Err(e) => CallToolResult::failure(e.kind(), e.to_string()),
            Ok(arguments) => {
                let context = ToolContext {
                    timeout: self.call_timeout,
                };
                match tokio::time::timeout(self.call_timeout, tool.execute(arguments, &context)).await {
                    Ok(Ok(tool_result)) => CallToolResult::from(tool_result),
                    Ok(Err(e)) => {
                        tracing::warn!(tool = %call.name, error = %e, "Tool failed");
                        CallToolResult::failure(e.kind(), e.to_string())
                    }
                    Err(_) => {
                        let e = ToolError::Timeout(self.call_timeout);
                        CallToolResult::failure(e.kind(), e.to_string())
                    }
                }
            }
        };

        Ok(serde_json::to_value(result)?)
    }

    fn encode(&self, response: JsonRpcResponse) -> String {
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(
                r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"{}"}}}}"#,
                error_codes::INTERNAL_ERROR,
                e.to_string().replace('"', "'")
            )
        })
    }
}

fn error_response(id: RpcId, error: McpError) -> JsonRpcResponse {
    let rpc = error.to_rpc_error();
    JsonRpcResponse::error(id, rpc.code, rpc.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use toolbridge_tool_runtime::tool::EchoTool;
    use toolbridge_tool_runtime::ToolErrorKind;

    fn test_server() -> McpServer {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool).unwrap();
        McpServer::new(Arc::new(reg))
    }

    fn initialize_request(id: i64) -> JsonRpcRequest {
        JsonRpcRequest::new(
            RpcId::Number(id),
            methods::INITIALIZE,
            Some(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "test-client"}
            })),
        )
    }

    async fn initialized_server() -> McpServer {
        let server = test_server();
        let resp = server.handle_request(&initialize_request(1)).await;
        assert!(resp.error.is_none());
        server
    }

    #[tokio::test]
    async fn test_handle_initialize() {
        let server = test_server();
        let resp = server.handle_request(&initialize_request(1)).await;
        let result: InitializeResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.protocol_version, PROTOCOL_VERSION);
        assert_eq!(result.server_info.name, "toolbridge-host");
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_tools_require_initialize() {
        let server = test_server();
        let req = JsonRpcRequest::new(RpcId::Number(2), methods::LIST_TOOLS, None);
        let resp = server.handle_request(&req).await;
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_handle_list_tools() {
        let server = initialized_server().await;
        let req = JsonRpcRequest::new(RpcId::Number(2), methods::LIST_TOOLS, None);

        let resp = server.handle_request(&req).await;
        let result: ListToolsResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.tools.len(), 1);
        assert_eq!(result.tools[0].name, "echo");
        assert!(result.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_handle_call_tool() {
        let server = initialized_server().await;
        let req = JsonRpcRequest::new(
            RpcId::Number(3),
            methods::CALL_TOOL,
            Some(serde_json::json!({
                "name": "echo",
                "arguments": {"message": "hello mcp"}
            })),
        );

        let resp = server.handle_request(&req).await;
        let result: CallToolResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text_content(), "hello mcp");
    }

    #[tokio::test]
    async fn test_call_with_bad_arguments_reports_kind() {
        let server = initialized_server().await;
        let req = JsonRpcRequest::new(
            RpcId::Number(4),
            methods::CALL_TOOL,
            Some(serde_json::json!({"name": "echo", "arguments": {"message": 5}})),
        );

        let resp = server.handle_request(&req).await;
        let result: CallToolResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(result.is_error);
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Argument));
    }

    #[tokio::test]
    async fn test_handle_call_tool_not_found() {
        let server = initialized_server().await;
        let req = JsonRpcRequest::new(
            RpcId::Number(5),
            methods::CALL_TOOL,
            Some(serde_json::json!({"name": "nonexistent", "arguments": {}})),
        );

        let resp = server.handle_request(&req).await;
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_handle_unknown_method() {
        let server = test_server();
        let req = JsonRpcRequest::new(RpcId::Number(6), "unknown/method", None);

        let resp = server.handle_request(&req).await;
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let server = test_server();
        let reply = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());

        let reply = server.handle_message("{not json").await.unwrap();
        assert!(reply.contains("-32700"));
    }

    #[tokio::test]
    async fn test_server_run_with_channel_transport() {
        let (mut client_side, mut server_side) = ChannelTransport::pair();
        let server = test_server();

        let server_handle = tokio::spawn(async move { server.run(&mut server_side).await });

        client_side
            .send(&serde_json::to_string(&initialize_request(1)).unwrap())
            .await
            .unwrap();
        let resp: JsonRpcResponse =
            serde_json::from_str(&client_side.receive().await.unwrap().unwrap()).unwrap();
        assert!(resp.error.is_none());

        let call_req = JsonRpcRequest::new(
            RpcId::Number(2),
            methods::CALL_TOOL,
            Some(serde_json::json!({
                "name": "echo",
                "arguments": {"message": "via transport"}
            })),
        );
        client_side
            .send(&serde_json::to_string(&call_req).unwrap())
            .await
            .unwrap();

        let resp: JsonRpcResponse =
            serde_json::from_str(&client_side.receive().await.unwrap().unwrap()).unwrap();
        let result: CallToolResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.text_content(), "via transport");

        drop(client_side);
        server_handle.await.unwrap().unwrap();
    }
}
