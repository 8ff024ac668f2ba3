use crate::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

/// A message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConversationMessage {
    /// User's text input
    User(String),
    /// Assistant's response (may contain text and/or tool calls)
    Assistant(AssistantContent),
    /// Result of a tool execution
    ToolResult(ToolResult),
}

/// Content from the assistant that can contain mixed text and tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantContent {
    /// Text blocks in the response
    pub text: Option<String>,
    /// Tool calls requested by the assistant
    pub tool_calls: Vec<ToolCall>,
}

/// Conversation state for one orchestration run.
///
/// Holds the system directive plus the ordered transcript. Only the
/// orchestrator appends to it; callers read it back for auditing.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
    system_prompt: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn add_user_message(&mut self, text: String) {
        self.messages.push(ConversationMessage::User(text));
    }

    pub fn add_assistant_response(&mut self, content: AssistantContent) {
        self.messages.push(ConversationMessage::Assistant(content));
    }

    pub fn add_tool_result(&mut self, result: ToolResult) {
        self.messages.push(ConversationMessage::ToolResult(result));
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Number of model responses recorded.
    pub fn model_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, ConversationMessage::Assistant(_)))
            .count()
    }

    /// Tool results recorded, in the order they were appended.
    pub fn tool_results(&self) -> Vec<&ToolResult> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                ConversationMessage::ToolResult(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Serialize the system prompt and transcript for diagnostics.
    pub fn transcript_json(&self) -> serde_json::Value {
        serde_json::json!({
            "system_prompt": self.system_prompt,
            "messages": self.messages,
        })
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
