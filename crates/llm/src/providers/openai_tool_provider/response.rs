//! Decoding of a finished chat completion into stream events.

use serde_json::Value;

use toolbridge_tool_runtime::provider::LlmError;
use toolbridge_tool_runtime::stream::{StopReason, StreamEvent};

fn stop_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        // "stop" also covers a matched stop sequence.
        _ => StopReason::EndTurn,
    }
}

/// Replay `choices[0]` of a completion as text deltas and complete tool
/// calls, ending with `MessageEnd`.
pub(super) fn completion_to_events(body: &Value) -> Result<Vec<StreamEvent>, LlmError> {
    if let Some(message) = body["error"]["message"].as_str() {
        return Ok(vec![StreamEvent::Error {
            message: message.to_string(),
        }]);
    }

    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0]".into()))?;
    let message = choice
        .get("message")
        .filter(|m| m.is_object())
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message".into()))?;

    let mut events = Vec::new();

    if let Some(text) = message["content"].as_str() {
        if !text.is_empty() {
            events.push(StreamEvent::TextDelta {
                text: text.to_string(),
            });
        }
    }

    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let id = call["id"].as_str().unwrap_or_default();
            let name = call["function"]["name"].as_str().ok_or_else(|| {
                LlmError::InvalidResponse("tool call without function name".into())
            })?;
            let arguments = match &call["function"]["arguments"] {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            events.extend(StreamEvent::tool_call(id, name, &arguments));
        }
    }

    events.push(StreamEvent::MessageEnd {
        stop_reason: stop_reason(choice["finish_reason"].as_str()),
    });
    Ok(events)
}
