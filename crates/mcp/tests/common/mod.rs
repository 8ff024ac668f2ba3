//! Scripted tool host over an in-memory channel pair.
//!
//! Tool behaviour is keyed by name:
//! - `echo`: replies with `arguments.message` at once
//! - `slow`: sleeps `arguments.ms` milliseconds, then replies `slow <ms>`
//! - `hang`: never replies
//! - `fail`: replies with an execution failure
//!
//! Calls are answered on their own tasks, so replies go out in completion
//! order rather than request order.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use toolbridge_mcp::{
    CallToolResult, ChannelTransport, Endpoint, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    McpSession, McpTransport, SessionOptions, ToolInfo, PROTOCOL_VERSION,
};
use toolbridge_tool_runtime::ToolErrorKind;

#[derive(Default)]
pub struct HostStats {
    pub list_requests: AtomicUsize,
    pub call_requests: AtomicUsize,
}

impl HostStats {
    pub fn lists(&self) -> usize {
        self.list_requests.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.call_requests.load(Ordering::SeqCst)
    }
}

pub struct MockHost {
    pub stats: Arc<HostStats>,
    handle: JoinHandle<()>,
}

impl MockHost {
    /// Drop the host end of the transport, as if the host process died.
    pub async fn kill(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

pub fn schema_with(field: &str, ty: &str) -> Value {
    json!({
        "type": "object",
        "properties": { field: { "type": ty } },
        "required": [field]
    })
}

pub fn tool(name: &str) -> ToolInfo {
    let schema = match name {
        "slow" => schema_with("ms", "integer"),
        _ => schema_with("message", "string"),
    };
    ToolInfo {
        name: name.to_string(),
        description: format!("{} tool", name),
        input_schema: schema,
    }
}

pub fn standard_tools() -> Vec<ToolInfo> {
    ["echo", "slow", "hang", "fail"].into_iter().map(tool).collect()
}

/// Spawn a host advertising `tools`, `page_size` per `tools/list` page.
pub fn spawn_host(transport: ChannelTransport, tools: Vec<ToolInfo>, page_size: usize) -> MockHost {
    let stats = Arc::new(HostStats::default());
    let handle = tokio::spawn(serve(transport, tools, page_size.max(1), Arc::clone(&stats)));
    MockHost { stats, handle }
}

/// Connected session plus the host behind it.
pub async fn connect(tools: Vec<ToolInfo>, page_size: usize) -> (Arc<McpSession>, MockHost) {
    let (client, server) = ChannelTransport::pair();
    let host = spawn_host(server, tools, page_size);
    let session = McpSession::connect(Endpoint::embedded("mock"), client, SessionOptions::default())
        .await
        .expect("handshake with mock host");
    (Arc::new(session), host)
}

async fn serve(mut transport: ChannelTransport, tools: Vec<ToolInfo>, page_size: usize, stats: Arc<HostStats>) {
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(64);

    loop {
        tokio::select! {
            incoming = transport.receive() => {
                let Ok(Some(frame)) = incoming else { return };
                let Ok(request) = serde_json::from_str::<JsonRpcRequest>(&frame) else {
                    // Notifications carry no id.
                    continue;
                };
                match request.method.as_str() {
                    "initialize" => {
                        let result = json!({
                            "protocolVersion": PROTOCOL_VERSION,
                            "capabilities": {"tools": {}},
                            "serverInfo": {"name": "mock-host", "version": "0.0.1"}
                        });
                        send(&reply_tx, JsonRpcResponse::success(request.id, result)).await;
                    }
                    "tools/list" => {
                        stats.list_requests.fetch_add(1, Ordering::SeqCst);
                        let start: usize = request
                            .params
                            .as_ref()
                            .and_then(|p| p.get("cursor"))
                            .and_then(Value::as_str)
                            .and_then(|c| c.parse().ok())
                            .unwrap_or(0);
                        let end = (start + page_size).min(tools.len());
                        let page = ListToolsResult {
                            tools: tools[start..end].to_vec(),
                            next_cursor: (end < tools.len()).then(|| end.to_string()),
                        };
                        let result = serde_json::to_value(page).unwrap();
                        send(&reply_tx, JsonRpcResponse::success(request.id, result)).await;
                    }
                    "tools/call" => {
                        stats.call_requests.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(answer_call(request, reply_tx.clone()));
                    }
                    other => {
                        let reply = JsonRpcResponse::error(request.id, -32601, format!("no method {}", other));
                        send(&reply_tx, reply).await;
                    }
                }
            }
            Some(reply) = reply_rx.recv() => {
                if transport.send(&reply).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn answer_call(request: JsonRpcRequest, reply_tx: mpsc::Sender<String>) {
    let params = request.params.unwrap_or_default();
    let name = params["name"].as_str().unwrap_or_default().to_string();
    let args = &params["arguments"];

    let result = match name.as_str() {
        "echo" => CallToolResult::text(args["message"].as_str().unwrap_or_default()),
        "slow" => {
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            CallToolResult::text(format!("slow {}", ms))
        }
        "hang" => std::future::pending::<CallToolResult>().await,
        "fail" => CallToolResult::failure(ToolErrorKind::Execution, "tool blew up"),
        other => {
            let reply = JsonRpcResponse::error(request.id, -32602, format!("unknown tool {}", other));
            send(&reply_tx, reply).await;
            return;
        }
    };
    let value = serde_json::to_value(result).unwrap();
    send(&reply_tx, JsonRpcResponse::success(request.id, value)).await;
}

async fn send(tx: &mpsc::Sender<String>, response: JsonRpcResponse) {
    let _ = tx.send(serde_json::to_string(&response).unwrap()).await;
}
