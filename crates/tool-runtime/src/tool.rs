use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Describes a tool's interface for LLM consumption.
/// Maps to OpenAI's function format and the MCP `tools/list` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name within one tool host (e.g., "search")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON Schema describing the expected input
    pub input_schema: Value,
}

/// Represents an LLM requesting execution of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this invocation (used to match results)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// JSON input arguments
    pub input: Value,
}

/// Result of executing a tool, sent back to the LLM.
///
/// Exactly one result terminates each [`ToolCall`]. Failures carry the
/// [`ToolErrorKind`] so the orchestrator can tell tool-level failures from
/// session-level ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Must match the ToolCall id
    pub tool_call_id: String,
    /// Result content (text payload, or the error message on failure)
    pub content: String,
    /// Whether this result represents an error
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
            error_kind: None,
        }
    }

    pub fn failure(
        tool_call_id: impl Into<String>,
        kind: ToolErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: message.into(),
            is_error: true,
            error_kind: Some(kind),
        }
    }

    /// Build the failure result for a [`ToolError`].
    pub fn from_error(tool_call_id: impl Into<String>, error: &ToolError) -> Self {
        Self::failure(tool_call_id, error.kind(), error.to_string())
    }
}

/// Context passed to tool execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Upper bound on how long a single invocation may take.
    pub timeout: Duration,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name, description, JSON Schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input.
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError>;
}

/// Error taxonomy shared by local tools, remote proxies and the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Local schema validation failure; never sent over the wire.
    Argument,
    /// The model asked for a tool that is not in the manifest.
    UnknownTool,
    Timeout,
    SessionClosed,
    /// The query handler could not reach its managed index.
    AdapterConnection,
    /// The transport to the tool host could not be used.
    Connection,
    /// Malformed or out-of-sequence message from the tool host.
    Protocol,
    /// The tool ran and reported a failure.
    Execution,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::Argument => "argument",
            ToolErrorKind::UnknownTool => "unknown_tool",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::SessionClosed => "session_closed",
            ToolErrorKind::AdapterConnection => "adapter_connection",
            ToolErrorKind::Connection => "connection",
            ToolErrorKind::Protocol => "protocol",
            ToolErrorKind::Execution => "execution",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "argument" => ToolErrorKind::Argument,
            "unknown_tool" => ToolErrorKind::UnknownTool,
            "timeout" => ToolErrorKind::Timeout,
            "session_closed" => ToolErrorKind::SessionClosed,
            "adapter_connection" => ToolErrorKind::AdapterConnection,
            "connection" => ToolErrorKind::Connection,
            "protocol" => ToolErrorKind::Protocol,
            "execution" => ToolErrorKind::Execution,
            _ => return None,
        })
    }

    /// Session-level kinds abort an orchestration run instead of being fed
    /// back to the model.
    pub fn is_session_level(&self) -> bool {
        matches!(self, ToolErrorKind::Connection | ToolErrorKind::Protocol)
    }

    /// The kind as a tool host may report it. Session-level kinds describe
    /// the caller's own session, so a tool that fails with one has failed
    /// to execute.
    pub fn reported_by_host(self) -> Self {
        match self {
            ToolErrorKind::Connection | ToolErrorKind::Protocol | ToolErrorKind::SessionClosed => {
                ToolErrorKind::Execution
            }
            kind => kind,
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Session closed")]
    SessionClosed,
    #[error("Index connection failed: {0}")]
    AdapterConnection(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::InvalidInput(_) => ToolErrorKind::Argument,
            ToolError::UnknownTool(_) => ToolErrorKind::UnknownTool,
            ToolError::ExecutionFailed(_) | ToolError::Other(_) => ToolErrorKind::Execution,
            ToolError::Timeout(_) => ToolErrorKind::Timeout,
            ToolError::SessionClosed => ToolErrorKind::SessionClosed,
            ToolError::AdapterConnection(_) => ToolErrorKind::AdapterConnection,
            ToolError::Connection(_) => ToolErrorKind::Connection,
            ToolError::Protocol(_) => ToolErrorKind::Protocol,
        }
    }
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// Simple echo tool for testing purposes.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echoes back the input message. For testing.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message to echo back"
                    }
                },
                "required": ["message"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let message = input
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'message' field".to_string()))?;

        Ok(ToolResult::success(String::new(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_failure_serialization() {
        let result = ToolResult::failure("call_001", ToolErrorKind::UnknownTool, "Unknown tool: nope");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error_kind"], "unknown_tool");
        assert_eq!(json["is_error"], true);

        let ok = serde_json::to_value(ToolResult::success("call_002", "bar")).unwrap();
        assert!(ok.get("error_kind").is_none());
    }

    #[test]
    fn test_error_kind_string_forms_agree() {
        for kind in [
            ToolErrorKind::Argument,
            ToolErrorKind::UnknownTool,
            ToolErrorKind::Timeout,
            ToolErrorKind::SessionClosed,
            ToolErrorKind::AdapterConnection,
            ToolErrorKind::Connection,
            ToolErrorKind::Protocol,
            ToolErrorKind::Execution,
        ] {
            let serde_form = serde_json::to_value(kind).unwrap();
            assert_eq!(serde_form, kind.as_str());
            assert_eq!(ToolErrorKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ToolErrorKind::parse("bogus"), None);
    }

    #[test]
    fn test_error_to_kind() {
        assert_eq!(ToolError::InvalidInput("x".into()).kind(), ToolErrorKind::Argument);
        assert_eq!(
            ToolError::Timeout(Duration::from_secs(1)).kind(),
            ToolErrorKind::Timeout
        );
        assert!(ToolError::Connection("down".into()).kind().is_session_level());
        assert!(!ToolError::SessionClosed.kind().is_session_level());
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let tool = EchoTool;
        let def = tool.definition();
        assert_eq!(def.name, "echo");

        let result = tool
            .execute(serde_json::json!({"message": "hello world"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result.content, "hello world");
        assert!(!result.is_error);
    }
}
