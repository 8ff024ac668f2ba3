use serde::{Deserialize, Serialize};

/// Events emitted while a model response is produced.
/// Provider-agnostic: each provider translates its wire format into these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// A chunk of text from the assistant
    TextDelta {
        text: String,
    },
    /// Start of a tool call (model wants to execute a tool)
    ToolCallStart {
        id: String,
        name: String,
    },
    /// Incremental JSON argument data for a tool call
    ToolCallDelta {
        id: String,
        arguments_delta: String,
    },
    /// Tool call arguments are complete
    ToolCallEnd {
        id: String,
    },
    /// The entire message is complete
    MessageEnd {
        stop_reason: StopReason,
    },
    /// An error reported by the provider mid-response
    Error {
        message: String,
    },
}

impl StreamEvent {
    /// The start/delta/end triple for one complete tool call.
    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::ToolCallStart {
                id: id.to_string(),
                name: name.to_string(),
            },
            StreamEvent::ToolCallDelta {
                id: id.to_string(),
                arguments_delta: arguments.to_string(),
            },
            StreamEvent::ToolCallEnd { id: id.to_string() },
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Normal end of response
    EndTurn,
    /// Model wants to use tools
    ToolUse,
    /// Hit max tokens limit
    MaxTokens,
}
