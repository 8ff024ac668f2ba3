//! Tool host side of the HTTP+SSE transport.
//!
//! `GET /sse` opens a connection: the first event names the URL to POST
//! frames to (`/messages?session_id=…`), and every reply is pushed back as
//! a `message` event. POSTed requests are handled on their own tasks, so
//! a slow tool never holds up replies to other requests.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use toolbridge_tool_runtime::ToolRegistry;

use crate::server::McpServer;
use crate::sse::{ENDPOINT_EVENT, MESSAGE_EVENT};

struct Connection {
    server: Arc<McpServer>,
    outbound: mpsc::Sender<String>,
}

/// Shared state of the SSE host: the tool registry plus one MCP server
/// per open event stream.
pub struct SseHost {
    registry: Arc<ToolRegistry>,
    server_name: String,
    call_timeout: Duration,
    connections: Mutex<HashMap<String, Connection>>,
}

impl SseHost {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            server_name: "toolbridge-host".to_string(),
            call_timeout: Duration::from_secs(60),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Number of clients currently connected.
    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<String, Connection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/sse", get(open_stream))
            .route("/messages", post(post_message))
            .with_state(self)
    }

    /// Bind `addr` and serve until the process exits.
    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, tools = ?self.registry.names(), "Tool host listening");
        axum::serve(listener, self.router()).await
    }
}

/// Drops the connection entry once the client's event stream goes away.
struct ConnectionGuard {
    host: Arc<SseHost>,
    session_id: String,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.host.connections().remove(&self.session_id);
        debug!(session_id = %self.session_id, "SSE client disconnected");
    }
}

async fn open_stream(
    State(host): State<Arc<SseHost>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let (tx, rx) = mpsc::channel::<String>(64);

    let server = McpServer::new(Arc::clone(&host.registry))
        .with_name(host.server_name.clone())
        .with_call_timeout(host.call_timeout);
    host.connections().insert(
        session_id.clone(),
        Connection {
            server: Arc::new(server),
            outbound: tx,
        },
    );
    info!(session_id = %session_id, "SSE client connected");

    let endpoint = Event::default()
        .event(ENDPOINT_EVENT)
        .data(format!("/messages?session_id={}", session_id));
    let guard = ConnectionGuard {
        host: Arc::clone(&host),
        session_id,
    };

    let messages = ReceiverStream::new(rx).map(move |frame| {
        let _ = &guard;
        Ok(Event::default().event(MESSAGE_EVENT).data(frame))
    });

    Sse::new(stream::once(async move { Ok(endpoint) }).chain(messages))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn post_message(
    State(host): State<Arc<SseHost>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> impl IntoResponse {
    let connection = host
        .connections()
        .get(&query.session_id)
        .map(|c| (Arc::clone(&c.server), c.outbound.clone()));
    let Some((server, outbound)) = connection else {
        return (StatusCode::NOT_FOUND, "unknown session");
    };

    tokio::spawn(async move {
        if let Some(reply) = server.handle_message(&body).await {
            if outbound.send(reply).await.is_err() {
                debug!("Client went away before its reply was ready");
            }
        }
    });

    (StatusCode::ACCEPTED, "Accepted")
}
