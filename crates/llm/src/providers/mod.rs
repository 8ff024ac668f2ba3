pub mod openai_tool_provider;

use std::sync::Arc;

use toolbridge_core::config::LlmConfig;
use toolbridge_tool_runtime::{LlmError, ToolAwareLlmProvider};

/// Create the tool-capable provider selected by config.
pub fn create_tool_provider(
    llm_config: &LlmConfig,
) -> Result<Arc<dyn ToolAwareLlmProvider>, LlmError> {
    match llm_config.provider.as_str() {
        "openai" => {
            let api_key = llm_config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            Ok(Arc::new(openai_tool_provider::OpenAiToolProvider::new(
                api_key.clone(),
                llm_config.openai_model.clone(),
                llm_config.openai_base_url.clone(),
            )))
        }
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM provider: '{}'",
            other
        ))),
    }
}
