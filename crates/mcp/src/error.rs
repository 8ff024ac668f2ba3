//! Error types for the MCP crate.

use std::time::Duration;

use toolbridge_tool_runtime::ToolError;

use crate::types::{error_codes, JsonRpcError};

/// Errors that can occur during MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The tool host could not be reached, or the handshake failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed or out-of-sequence message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session closed")]
    SessionClosed,

    /// The remote end answered with a JSON-RPC error object.
    #[error("Remote error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Transport I/O error.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Not initialized: call initialize first")]
    NotInitialized,
}

impl McpError {
    /// Convert to a JSON-RPC error object.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let code = match self {
            McpError::JsonParse(_) => error_codes::PARSE_ERROR,
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::ToolNotFound(_) => error_codes::INVALID_PARAMS,
            McpError::NotInitialized | McpError::Protocol(_) => error_codes::INVALID_REQUEST,
            McpError::Rpc { code, .. } => *code,
            _ => error_codes::INTERNAL_ERROR,
        };
        JsonRpcError {
            code,
            message: self.to_string(),
            data: None,
        }
    }

    /// Map a session-side failure onto the tool error taxonomy.
    pub fn into_tool_error(self) -> ToolError {
        match self {
            McpError::Connection(msg) => ToolError::Connection(msg),
            McpError::Transport(e) => ToolError::Connection(e.to_string()),
            McpError::Protocol(msg) => ToolError::Protocol(msg),
            McpError::JsonParse(e) => ToolError::Protocol(e.to_string()),
            McpError::Timeout(after) => ToolError::Timeout(after),
            McpError::SessionClosed => ToolError::SessionClosed,
            McpError::ToolNotFound(name) => ToolError::UnknownTool(name),
            McpError::InvalidParams(msg) => ToolError::InvalidInput(msg),
            other => ToolError::ExecutionFailed(other.to_string()),
        }
    }
}
