//! HTTP+SSE loopback: a real `SseHost` on an ephemeral port, reached
//! through `McpSession::open`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;

use toolbridge_mcp::{
    build_registry, Endpoint, McpError, McpSession, McpTransport, SessionOptions, SessionState,
    SseClientTransport, SseHost,
};
use toolbridge_tool_runtime::tool::EchoTool;
use toolbridge_tool_runtime::{SessionProbe, ToolRegistry};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_host() -> (Arc<SseHost>, SocketAddr) {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();
    let host = Arc::new(SseHost::new(Arc::new(registry)).with_name("loopback-host"));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Arc::clone(&host).router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (host, addr)
}

#[tokio::test]
async fn session_over_sse_lists_and_calls() {
    let (host, addr) = start_host().await;

    let session = Arc::new(
        McpSession::open(Endpoint::sse(format!("http://{}/sse", addr)), SessionOptions::default())
            .await
            .unwrap(),
    );
    assert!(session.is_open());
    assert_eq!(session.server_info().unwrap().name, "loopback-host");
    assert_eq!(host.connection_count(), 1);

    let registry = build_registry(Arc::clone(&session), None).await.unwrap();
    assert_eq!(registry.names(), vec!["echo".to_string()]);

    let result = session
        .call_tool("echo", json!({"message": "over the wire"}), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result.text_content(), "over the wire");

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn concurrent_calls_share_one_stream() {
    let (_host, addr) = start_host().await;
    let session = Arc::new(
        McpSession::open(Endpoint::sse(format!("http://{}/sse", addr)), SessionOptions::default())
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            session
                .call_tool("echo", json!({"message": format!("msg-{}", i)}), TIMEOUT)
                .await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.text_content(), format!("msg-{}", i));
    }
    session.close().await;
}

#[tokio::test]
async fn unreachable_host_is_connection_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let options = SessionOptions {
        handshake_timeout: Duration::from_secs(2),
        ..SessionOptions::default()
    };
    let result = McpSession::open(Endpoint::sse(format!("http://{}/sse", addr)), options).await;
    assert!(matches!(result, Err(McpError::Connection(_))));
}

#[tokio::test]
async fn post_to_unknown_session_is_not_found() {
    let (_host, addr) = start_host().await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/messages?session_id=nope", addr))
        .body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

/// Announces its endpoint, then never answers a POST.
async fn start_stalled_host() -> SocketAddr {
    async fn events() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let endpoint = Event::default().event("endpoint").data("/messages?session_id=stuck");
        Sse::new(stream::once(async move { Ok(endpoint) }).chain(stream::pending()))
    }
    async fn swallow() -> StatusCode {
        std::future::pending::<StatusCode>().await
    }

    let router = Router::new()
        .route("/sse", get(events))
        .route("/messages", post(swallow));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn hung_post_fails_the_send() {
    let addr = start_stalled_host().await;
    let mut transport = SseClientTransport::connect(&format!("http://{}/sse", addr), TIMEOUT)
        .await
        .unwrap()
        .with_post_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let result = transport
        .send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
        .await;
    assert!(matches!(result, Err(McpError::Connection(_))));
    assert!(started.elapsed() < TIMEOUT);
}

#[tokio::test]
async fn hung_host_fails_the_handshake() {
    let addr = start_stalled_host().await;
    let options = SessionOptions {
        handshake_timeout: Duration::from_millis(500),
        ..SessionOptions::default()
    };
    let result = McpSession::open(Endpoint::sse(format!("http://{}/sse", addr)), options).await;
    assert!(matches!(result, Err(McpError::Connection(_))));
}
