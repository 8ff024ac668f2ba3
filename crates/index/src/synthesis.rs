//! Answer synthesis: retrieved passages plus the query go to a completion
//! model, whose reply is the index's answer.

use std::sync::Arc;

use tracing::debug;

use toolbridge_tool_runtime::conversation::ConversationMessage;
use toolbridge_tool_runtime::{StreamEvent, ToolAwareLlmProvider};

use crate::error::IndexError;

/// Answer when retrieval finds nothing; the model is not consulted.
pub const EMPTY_RESPONSE: &str = "Empty Response";

const QA_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{context}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {query}\n\
Answer: ";

#[derive(Clone)]
pub struct AnswerSynthesizer {
    provider: Arc<dyn ToolAwareLlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl AnswerSynthesizer {
    pub fn new(provider: Arc<dyn ToolAwareLlmProvider>) -> Self {
        Self {
            provider,
            temperature: 0.1,
            max_tokens: 4096,
        }
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// Prompt for one query; passages keep retrieval order.
    pub fn prompt(query: &str, passages: &[String]) -> String {
        QA_TEMPLATE
            .replace("{context}", &passages.join("\n\n"))
            .replace("{query}", query)
    }

    /// Ask the model to answer `query` from `passages` and return its text
    /// as-is.
    pub async fn synthesize(&self, query: &str, passages: &[String]) -> Result<String, IndexError> {
        if passages.is_empty() {
            return Ok(EMPTY_RESPONSE.to_string());
        }

        debug!(
            provider = self.provider.provider_name(),
            passages = passages.len(),
            "Synthesizing answer"
        );
        let events = self
            .provider
            .complete_with_tools(
                vec![ConversationMessage::User(Self::prompt(query, passages))],
                None,
                Vec::new(),
                self.temperature,
                self.max_tokens,
            )
            .await
            .map_err(|e| IndexError::Query(format!("answer synthesis failed: {}", e)))?;

        let mut answer = String::new();
        for event in events {
            match event {
                StreamEvent::TextDelta { text } => answer.push_str(&text),
                StreamEvent::Error { message } => {
                    return Err(IndexError::Query(format!(
                        "answer synthesis failed: {}",
                        message
                    )))
                }
                _ => {}
            }
        }
        Ok(answer)
    }
}
