use crate::conversation::ConversationMessage;
use crate::stream::StreamEvent;
use crate::tool::ToolDefinition;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Trait for LLM providers that support tool use.
///
/// This trait lives in tool-runtime (not in crates/llm) because it's
/// defined by the consumer (the agentic loop), not the provider.
/// Implementations live in crates/llm. Retry and backoff are the
/// provider's own business.
#[async_trait]
pub trait ToolAwareLlmProvider: Send + Sync {
    /// Stream a response from the LLM with tool definitions available.
    async fn stream_with_tools(
        &self,
        messages: Vec<ConversationMessage>,
        system_prompt: Option<String>,
        tools: Vec<ToolDefinition>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>, LlmError>;

    /// Non-streaming convenience: collects the full response.
    async fn complete_with_tools(
        &self,
        messages: Vec<ConversationMessage>,
        system_prompt: Option<String>,
        tools: Vec<ToolDefinition>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Vec<StreamEvent>, LlmError> {
        use futures::StreamExt;
        let stream = self
            .stream_with_tools(messages, system_prompt, tools, temperature, max_tokens)
            .await?;
        let events: Vec<_> = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Provider name for logging/debugging (e.g., "openai", "mock")
    fn provider_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    AuthError,
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Mock LLM provider for testing the agentic loop without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::stream::StopReason;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What the mock saw on one call.
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub messages: Vec<ConversationMessage>,
        pub system_prompt: Option<String>,
        pub tools: Vec<ToolDefinition>,
    }

    /// A mock provider that returns pre-configured responses in FIFO order.
    ///
    /// Once the queue is empty it keeps returning the fallback response, or
    /// an empty message if none was set.
    pub struct MockLlmProvider {
        responses: Mutex<VecDeque<Vec<StreamEvent>>>,
        fallback: Mutex<Option<Vec<StreamEvent>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl MockLlmProvider {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Queue a response that will be returned after those already queued.
        pub fn queue_response(&self, events: Vec<StreamEvent>) {
            self.responses.lock().unwrap().push_back(events);
        }

        /// Queue a simple text response.
        pub fn queue_text(&self, text: &str) {
            self.queue_response(text_events(text));
        }

        /// Queue a response consisting of one tool call.
        pub fn queue_tool_call(&self, id: &str, name: &str, arguments: serde_json::Value) {
            self.queue_response(tool_call_events(id, name, arguments));
        }

        /// Response returned whenever the queue is empty.
        pub fn set_fallback(&self, events: Vec<StreamEvent>) {
            *self.fallback.lock().unwrap() = Some(events);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Default for MockLlmProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    pub fn text_events(text: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::TextDelta {
                text: text.to_string(),
            },
            StreamEvent::MessageEnd {
                stop_reason: StopReason::EndTurn,
            },
        ]
    }

    pub fn tool_call_events(id: &str, name: &str, arguments: serde_json::Value) -> Vec<StreamEvent> {
        let mut events = StreamEvent::tool_call(id, name, &arguments.to_string());
        events.push(StreamEvent::MessageEnd {
            stop_reason: StopReason::ToolUse,
        });
        events
    }

    #[async_trait]
    impl ToolAwareLlmProvider for MockLlmProvider {
        async fn stream_with_tools(
            &self,
            messages: Vec<ConversationMessage>,
            system_prompt: Option<String>,
            tools: Vec<ToolDefinition>,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>, LlmError>
        {
            self.calls.lock().unwrap().push(RecordedCall {
                messages,
                system_prompt,
                tools,
            });
            let events = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .or_else(|| self.fallback.lock().unwrap().clone())
                .unwrap_or_else(|| {
                    vec![StreamEvent::MessageEnd {
                        stop_reason: StopReason::EndTurn,
                    }]
                });
            Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }
}
