//! Client session with one tool host.
//!
//! A background task exclusively owns the transport and multiplexes
//! outbound frames with inbound replies (`tokio::select!`). Callers
//! register a oneshot under a fresh request id, hand the frame to the task
//! and wait for the correlated reply or their timeout, whichever comes
//! first. Replies whose id is no longer pending are logged and dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use toolbridge_tool_runtime::{SessionProbe, ToolResult};

use crate::error::McpError;
use crate::sse::SseClientTransport;
use crate::transport::McpTransport;
use crate::types::*;

/// How the session reaches its tool host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// HTTP+SSE, the host's default.
    Sse,
    /// A transport handed over in-process (stdio pipes, channel pairs).
    Embedded,
}

/// Session identity: address plus transport kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub kind: TransportKind,
    pub address: String,
}

impl Endpoint {
    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Sse,
            address: url.into(),
        }
    }

    pub fn embedded(label: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Embedded,
            address: label.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportKind::Sse => write!(f, "sse:{}", self.address),
            TransportKind::Embedded => write!(f, "embedded:{}", self.address),
        }
    }
}

/// Lifecycle: Disconnected → Connecting → Open → Closing → Closed | Errored.
///
/// `Closed` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub client_name: String,
    /// Bound on connecting plus the `initialize` exchange. Over SSE it
    /// also bounds delivery of each frame.
    pub handshake_timeout: Duration,
    /// Bound on each `tools/list` page.
    pub request_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_name: "toolbridge".to_string(),
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

type Reply = Result<Value, McpError>;

enum Outbound {
    Frame(String),
    Close,
}

/// State shared between callers and the transport task.
struct Shared {
    pending: Mutex<HashMap<i64, oneshot::Sender<Reply>>>,
    state: watch::Sender<SessionState>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<i64, oneshot::Sender<Reply>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `next` unless the session already reached a terminal state.
    fn transition(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            debug!(from = ?*current, to = ?next, "Session state change");
            *current = next;
            true
        })
    }

    /// Resolve every in-flight request with an error built by `error`.
    fn fail_pending(&self, error: impl Fn() -> McpError) {
        let drained: Vec<_> = self.pending().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Failing in-flight requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(error()));
        }
    }

    /// Route one inbound frame to its waiting caller.
    fn dispatch(&self, frame: &str) {
        let raw: Value = match serde_json::from_str(frame) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Discarding malformed frame from tool host");
                return;
            }
        };

        if raw.get("method").is_some() {
            debug!(method = ?raw.get("method"), "Ignoring host-initiated message");
            return;
        }

        let response: JsonRpcResponse = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Discarding frame that is not a JSON-RPC response");
                return;
            }
        };

        let tx = match &response.id {
            RpcId::Number(id) => self.pending().remove(id),
            RpcId::String(_) => None,
        };
        let Some(tx) = tx else {
            debug!(id = %response.id, "Discarding reply for unknown or expired request");
            return;
        };

        let reply = match (response.error, response.result) {
            (Some(err), _) => Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            }),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(McpError::Protocol(
                "response carries neither result nor error".to_string(),
            )),
        };
        let _ = tx.send(reply);
    }
}

/// Removes a pending entry when its caller stops waiting, so a reply that
/// arrives later finds nothing to deliver to.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: i64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending().remove(&self.id);
    }
}

/// A live connection to one tool host.
pub struct McpSession {
    endpoint: Endpoint,
    options: SessionOptions,
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Outbound>,
    next_id: AtomicI64,
    server_info: Mutex<Option<ImplementationInfo>>,
    discovery: tokio::sync::Mutex<Option<Vec<ToolInfo>>>,
    discoveries: AtomicU64,
}

impl McpSession {
    /// Connect to `endpoint` and complete the handshake.
    ///
    /// Unreachable hosts and handshake violations both fail with
    /// [`McpError::Connection`].
    pub async fn open(endpoint: Endpoint, options: SessionOptions) -> Result<Self, McpError> {
        match endpoint.kind {
            TransportKind::Sse => {
                let transport =
                    SseClientTransport::connect(&endpoint.address, options.handshake_timeout)
                        .await?
                        .with_post_timeout(options.handshake_timeout);
                Self::connect(endpoint, transport, options).await
            }
            TransportKind::Embedded => Err(McpError::Connection(format!(
                "{} has no address to dial; pass its transport to McpSession::connect",
                endpoint
            ))),
        }
    }

    /// Take ownership of an already connected transport and perform the
    /// `initialize` handshake over it.
    pub async fn connect<T>(
        endpoint: Endpoint,
        transport: T,
        options: SessionOptions,
    ) -> Result<Self, McpError>
    where
        T: McpTransport + 'static,
    {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            state,
        });
        let (outbound, outbound_rx) = mpsc::channel(256);

        shared.transition(SessionState::Connecting);
        tokio::spawn(event_loop(transport, outbound_rx, Arc::clone(&shared)));

        let session = Self {
            endpoint,
            options,
            shared,
            outbound,
            next_id: AtomicI64::new(1),
            server_info: Mutex::new(None),
            discovery: tokio::sync::Mutex::new(None),
            discoveries: AtomicU64::new(0),
        };

        match session.handshake().await {
            Ok(info) => {
                info!(
                    endpoint = %session.endpoint,
                    server = %info.name,
                    version = info.version.as_deref().unwrap_or("?"),
                    "Tool host session open"
                );
                *session
                    .server_info
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(info);
                session.shared.transition(SessionState::Open);
                Ok(session)
            }
            Err(e) => {
                warn!(endpoint = %session.endpoint, error = %e, "Handshake failed");
                session.shared.transition(SessionState::Errored);
                session.shared.fail_pending(|| McpError::SessionClosed);
                let _ = session.outbound.try_send(Outbound::Close);
                Err(match e {
                    McpError::Connection(msg) => McpError::Connection(msg),
                    other => McpError::Connection(format!("handshake failed: {}", other)),
                })
            }
        }
    }

    async fn handshake(&self) -> Result<ImplementationInfo, McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ImplementationInfo {
                name: self.options.client_name.clone(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };

        let result = self
            .request(
                methods::INITIALIZE,
                Some(serde_json::to_value(params)?),
                self.options.handshake_timeout,
            )
            .await?;
        let result: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("bad initialize result: {}", e)))?;

        if result.protocol_version != PROTOCOL_VERSION {
            debug!(
                ours = PROTOCOL_VERSION,
                theirs = %result.protocol_version,
                "Tool host negotiated a different protocol version"
            );
        }

        self.notify(methods::INITIALIZED, None).await?;
        Ok(result.server_info)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch state transitions (e.g. to notice the host going away).
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn server_info(&self) -> Option<ImplementationInfo> {
        self.server_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch the host's full tool manifest, following pagination.
    ///
    /// Concurrent callers share one discovery: whoever arrives while a
    /// listing is in flight waits for it and receives the same manifest.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        let seen = self.discoveries.load(Ordering::Acquire);
        let mut cache = self.discovery.lock().await;
        if self.discoveries.load(Ordering::Acquire) != seen {
            if let Some(tools) = cache.as_ref() {
                return Ok(tools.clone());
            }
        }

        let tools = self.fetch_manifest().await?;
        *cache = Some(tools.clone());
        self.discoveries.fetch_add(1, Ordering::AcqRel);
        Ok(tools)
    }

    async fn fetch_manifest(&self) -> Result<Vec<ToolInfo>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = ListToolsParams {
                cursor: cursor.clone(),
            };
            let result = self
                .request(
                    methods::LIST_TOOLS,
                    Some(serde_json::to_value(params)?),
                    self.options.request_timeout,
                )
                .await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(format!("bad tools/list result: {}", e)))?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if Some(&next) == cursor.as_ref() => {
                    return Err(McpError::Protocol(format!(
                        "tools/list repeated cursor '{}'",
                        next
                    )));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(count = tools.len(), "Tool manifest fetched");
        Ok(tools)
    }

    /// Invoke `name` and wait at most `timeout` for the host's answer.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<CallToolResult, McpError> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .request(methods::CALL_TOOL, Some(serde_json::to_value(params)?), timeout)
            .await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("bad tools/call result: {}", e)))
    }

    /// Like [`call_tool`](Self::call_tool), but every outcome, including
    /// timeouts and teardown, becomes a [`ToolResult`].
    pub async fn call(&self, name: &str, arguments: Value, timeout: Duration) -> ToolResult {
        match self.call_tool(name, arguments, timeout).await {
            Ok(result) => result.into_tool_result(String::new()),
            Err(e) => ToolResult::from_error(String::new(), &e.into_tool_error()),
        }
    }

    /// Close the session. Every in-flight request resolves to
    /// [`McpError::SessionClosed`]. Closing twice is a no-op.
    pub async fn close(&self) {
        if self.shared.state().is_terminal() || !self.shared.transition(SessionState::Closing) {
            return;
        }
        info!(endpoint = %self.endpoint, "Closing tool host session");
        self.shared.fail_pending(|| McpError::SessionClosed);
        let _ = self.outbound.send(Outbound::Close).await;
        self.shared.transition(SessionState::Closed);
    }

    fn check_can_send(&self, method: &str) -> Result<(), McpError> {
        match self.shared.state() {
            SessionState::Open => Ok(()),
            SessionState::Connecting if method == methods::INITIALIZE => Ok(()),
            SessionState::Connecting | SessionState::Disconnected => Err(McpError::NotInitialized),
            SessionState::Closing | SessionState::Closed => Err(McpError::SessionClosed),
            SessionState::Errored => Err(McpError::Connection("session has failed".to_string())),
        }
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            // State is checked under the pending lock so `close` cannot
            // drain the map between the check and the insert.
            let mut pending = self.shared.pending();
            self.check_can_send(method)?;
            pending.insert(id, tx);
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        let frame = serde_json::to_string(&JsonRpcRequest::new(RpcId::Number(id), method, params))?;
        debug!(id, method, "Sending request");
        self.outbound
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| McpError::SessionClosed)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(McpError::SessionClosed),
            Err(_) => {
                debug!(id, method, ?timeout, "Request timed out");
                Err(McpError::Timeout(timeout))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let frame = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.outbound
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| McpError::SessionClosed)
    }
}

impl SessionProbe for McpSession {
    fn is_open(&self) -> bool {
        self.shared.state() == SessionState::Open
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        if !self.shared.state().is_terminal() {
            self.shared.transition(SessionState::Closed);
            self.shared.fail_pending(|| McpError::SessionClosed);
        }
    }
}

/// Sole owner of the transport.
async fn event_loop<T: McpTransport>(
    mut transport: T,
    mut outbound: mpsc::Receiver<Outbound>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = transport.send(&frame).await {
                        warn!(error = %e, "Send to tool host failed");
                        fail_connection(&shared, e.to_string());
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = transport.close().await {
                        debug!(error = %e, "Transport close reported an error");
                    }
                    break;
                }
            },
            incoming = transport.receive() => match incoming {
                Ok(Some(frame)) => shared.dispatch(&frame),
                Ok(None) => {
                    if shared.state() != SessionState::Closing {
                        info!("Tool host closed the connection");
                    }
                    fail_connection(&shared, "connection closed by tool host".to_string());
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Receive from tool host failed");
                    fail_connection(&shared, e.to_string());
                    break;
                }
            },
        }
    }
    debug!("Session transport task finished");
}

fn fail_connection(shared: &Shared, reason: String) {
    if shared.state() == SessionState::Closing {
        shared.fail_pending(|| McpError::SessionClosed);
        return;
    }
    shared.transition(SessionState::Errored);
    shared.fail_pending(|| McpError::Connection(reason.clone()));
}
