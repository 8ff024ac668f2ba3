//! Translation between provider-agnostic conversation types and the OpenAI API format.

use serde_json::{json, Value};

use toolbridge_tool_runtime::conversation::ConversationMessage;
use toolbridge_tool_runtime::tool::ToolDefinition;

/// Translate a [`ToolDefinition`] into the OpenAI function-tool format.
pub(super) fn tool_definition_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

/// Translate a [`ConversationMessage`] into an OpenAI chat message.
pub(super) fn message_to_openai(msg: &ConversationMessage) -> Value {
    match msg {
        ConversationMessage::User(text) => json!({
            "role": "user",
            "content": text,
        }),
        ConversationMessage::Assistant(content) => {
            let mut message = json!({
                "role": "assistant",
                "content": content.text,
            });
            if !content.tool_calls.is_empty() {
                let calls: Vec<Value> = content
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        // Arguments the model sent that were not valid JSON are kept
                        // as the raw string; send them back exactly as received.
                        let arguments = match &tc.input {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        };
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {"name": tc.name, "arguments": arguments},
                        })
                    })
                    .collect();
                message["tool_calls"] = Value::Array(calls);
            }
            message
        }
        ConversationMessage::ToolResult(result) => {
            let content = if result.is_error {
                format!("Error: {}", result.content)
            } else {
                result.content.clone()
            };
            json!({
                "role": "tool",
                "tool_call_id": result.tool_call_id,
                "content": content,
            })
        }
    }
}

/// Full `messages` array: system directive first, then the transcript.
pub(super) fn build_messages(system_prompt: Option<&str>, messages: &[ConversationMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = system_prompt {
        out.push(json!({"role": "system", "content": prompt}));
    }
    out.extend(messages.iter().map(message_to_openai));
    out
}
