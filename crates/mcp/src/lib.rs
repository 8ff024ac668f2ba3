//! MCP (Model Context Protocol) bridge between an agent and a tool host.
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **transport**: Pluggable frame transport (stdio, in-memory channels)
//! - **sse**: HTTP+SSE client transport and event-stream decoder
//! - **session**: one correlated, timeout-aware session with a tool host
//! - **proxy**: local `Tool` proxies for the host's advertised tools
//! - **server**: MCP server wrapping a `ToolRegistry`
//! - **sse_host**: axum router serving an `McpServer` per SSE client
//! - **error**: Unified error types
//!
//! # Usage
//!
//! ## Agent side
//! ```no_run
//! use std::sync::Arc;
//! use toolbridge_mcp::{build_registry, Endpoint, McpSession, SessionOptions};
//!
//! # async fn example() -> Result<(), toolbridge_mcp::McpError> {
//! let session = Arc::new(
//!     McpSession::open(Endpoint::sse("http://localhost:8000/sse"), SessionOptions::default()).await?,
//! );
//! let registry = build_registry(Arc::clone(&session), None).await?;
//! println!("{:?}", registry.names());
//! session.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Host side
//! ```no_run
//! use std::sync::Arc;
//! use toolbridge_mcp::SseHost;
//! use toolbridge_tool_runtime::ToolRegistry;
//!
//! # async fn example() {
//! let host = Arc::new(SseHost::new(Arc::new(ToolRegistry::new())));
//! host.serve("127.0.0.1:8000".parse().unwrap()).await.unwrap();
//! # }
//! ```

pub mod error;
pub mod proxy;
pub mod server;
pub mod session;
pub mod sse;
pub mod sse_host;
pub mod transport;
pub mod types;

pub use error::McpError;
pub use proxy::{build_registry, McpToolProxy};
pub use server::McpServer;
pub use session::{Endpoint, McpSession, SessionOptions, SessionState, TransportKind};
pub use sse::SseClientTransport;
pub use sse_host::SseHost;
pub use transport::{ChannelTransport, McpTransport, StdioTransport};
pub use types::*;
