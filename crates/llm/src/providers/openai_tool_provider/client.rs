use std::pin::Pin;

use async_trait::async_trait;
use futures::{stream, Stream};
use serde_json::{json, Value};
use tracing::{debug, warn};

use toolbridge_tool_runtime::conversation::ConversationMessage;
use toolbridge_tool_runtime::provider::{LlmError, ToolAwareLlmProvider};
use toolbridge_tool_runtime::stream::StreamEvent;
use toolbridge_tool_runtime::tool::ToolDefinition;

use super::response::completion_to_events;
use super::translate::{build_messages, tool_definition_to_openai};

/// Seconds to wait when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

pub struct OpenAiToolProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiToolProvider {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(super) fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    pub(super) fn build_request_body(
        &self,
        messages: &[ConversationMessage],
        system_prompt: Option<&str>,
        tools: &[ToolDefinition],
        temperature: f32,
        max_tokens: u32,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": build_messages(system_prompt, messages),
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_definition_to_openai).collect());
        }
        body
    }
}

/// Map a non-success HTTP status to an [`LlmError`].
pub(super) fn status_error(status: u16, retry_after: Option<&str>, body: String) -> LlmError {
    match status {
        401 => LlmError::AuthError,
        429 => LlmError::RateLimited {
            retry_after_secs: retry_after
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        _ => LlmError::ApiError {
            status,
            message: body,
        },
    }
}

#[async_trait]
impl ToolAwareLlmProvider for OpenAiToolProvider {
    async fn stream_with_tools(
        &self,
        messages: Vec<ConversationMessage>,
        system_prompt: Option<String>,
        tools: Vec<ToolDefinition>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>, LlmError> {
        let body = self.build_request_body(
            &messages,
            system_prompt.as_deref(),
            &tools,
            temperature,
            max_tokens,
        );
        let url = self.completions_url();
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "OpenAI request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = response.text().await.unwrap_or_default();
            warn!(status, "OpenAI request failed");
            return Err(status_error(status, retry_after.as_deref(), body));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let events = completion_to_events(&json)?;

        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
