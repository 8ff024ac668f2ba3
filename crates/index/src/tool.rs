use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use toolbridge_core::config::IndexConfig;
use toolbridge_core::ConfigError;
use toolbridge_tool_runtime::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

use crate::adapter::{render_query, IndexConnector, QueryAdapterConfig};
use crate::llama_cloud::LlamaCloudConnector;
use crate::synthesis::AnswerSynthesizer;

/// `search(query: string) -> string` over a managed index.
///
/// Every call reconnects through the connector; nothing is cached between
/// calls. The answer is returned untouched.
pub struct IndexQueryTool {
    name: String,
    template: String,
    adapter: QueryAdapterConfig,
    connector: Arc<dyn IndexConnector>,
}

impl IndexQueryTool {
    pub fn new(adapter: QueryAdapterConfig, connector: Arc<dyn IndexConnector>) -> Self {
        Self {
            name: "search".to_string(),
            template: toolbridge_core::config::DEFAULT_QUERY_TEMPLATE.to_string(),
            adapter,
            connector,
        }
    }

    /// Tool backed by LlamaCloud, named and templated from `config`.
    /// `synthesizer` writes answers from the retrieved passages.
    pub fn from_config(config: &IndexConfig, synthesizer: AnswerSynthesizer) -> Result<Self, ConfigError> {
        let adapter = QueryAdapterConfig::from_config(config)?;
        Ok(Self::new(adapter, Arc::new(LlamaCloudConnector::new(synthesizer)))
            .with_name(config.tool_name.clone())
            .with_template(config.query_template.clone()))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}

#[async_trait]
impl Tool for IndexQueryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: format!(
                "Answers questions from the '{}' documentation index. Ask a complete natural-language question.",
                self.adapter.index_name
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The question to answer"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing 'query' field".to_string()))?;

        let index = self.connector.connect(&self.adapter).await.map_err(|e| {
            warn!(index = %self.adapter.index_name, error = %e, "Managed index unavailable");
            ToolError::from(e)
        })?;

        let prompt = render_query(&self.template, query);
        debug!(index = %self.adapter.index_name, query = %prompt, "Querying managed index");
        let answer = index.query(&prompt).await?;

        Ok(ToolResult::success(String::new(), answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ManagedIndex;
    use crate::error::IndexError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use toolbridge_tool_runtime::ToolErrorKind;

    /// Connector whose index echoes what it was asked, counting connects.
    #[derive(Default)]
    struct RecordingConnector {
        connects: AtomicUsize,
        queries: Arc<Mutex<Vec<String>>>,
        refuse: bool,
    }

    struct RecordingIndex {
        queries: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ManagedIndex for RecordingIndex {
        async fn query(&self, text: &str) -> Result<String, IndexError> {
            self.queries.lock().unwrap().push(text.to_string());
            Ok(format!("answer to: {}", text))
        }
    }

    #[async_trait]
    impl IndexConnector for RecordingConnector {
        async fn connect(&self, _config: &QueryAdapterConfig) -> Result<Box<dyn ManagedIndex>, IndexError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(IndexError::AdapterConnection("credential rejected".into()));
            }
            Ok(Box::new(RecordingIndex {
                queries: Arc::clone(&self.queries),
            }))
        }
    }

    fn adapter() -> QueryAdapterConfig {
        QueryAdapterConfig {
            index_name: "docs".into(),
            project_name: "Default".into(),
            organization_id: None,
            api_key: "k".into(),
            base_url: "https://example.invalid".into(),
        }
    }

    #[tokio::test]
    async fn test_query_applies_template_and_reconnects_every_call() {
        let connector = Arc::new(RecordingConnector::default());
        let tool = IndexQueryTool::new(adapter(), connector.clone());

        for _ in 0..3 {
            let result = tool
                .execute(json!({"query": "foo"}), &ToolContext::default())
                .await
                .unwrap();
            assert_eq!(
                result.content,
                "answer to: foo Be verbose and include code examples."
            );
        }
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        assert_eq!(connector.queries.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_custom_name_and_template() {
        let connector = Arc::new(RecordingConnector::default());
        let tool = IndexQueryTool::new(adapter(), connector.clone())
            .with_name("llama_index_documentation")
            .with_template("Q: {query}");

        assert_eq!(tool.definition().name, "llama_index_documentation");
        let result = tool
            .execute(json!({"query": "bar"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result.content, "answer to: Q: bar");
    }

    #[tokio::test]
    async fn test_unreachable_index_is_adapter_error() {
        let connector = Arc::new(RecordingConnector {
            refuse: true,
            ..Default::default()
        });
        let tool = IndexQueryTool::new(adapter(), connector);
        let err = tool
            .execute(json!({"query": "foo"}), &ToolContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::AdapterConnection);
    }

    #[tokio::test]
    async fn test_missing_query() {
        let tool = IndexQueryTool::new(adapter(), Arc::new(RecordingConnector::default()));
        let err = tool.execute(json!({}), &ToolContext::default()).await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::Argument);
    }

    #[test]
    fn test_from_config_requires_credential() {
        let config = IndexConfig {
            api_key: None,
            base_url: "https://api.cloud.llamaindex.ai".into(),
            name: "docs".into(),
            project_name: "Default".into(),
            organization_id: None,
            tool_name: "search".into(),
            query_template: "{query}".into(),
        };
        let synthesizer = AnswerSynthesizer::new(Arc::new(
            toolbridge_tool_runtime::provider::mock::MockLlmProvider::new(),
        ));
        assert!(matches!(
            IndexQueryTool::from_config(&config, synthesizer),
            Err(ConfigError::MissingCredential(_))
        ));
    }
}
