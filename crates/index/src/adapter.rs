use std::fmt;

use async_trait::async_trait;

use toolbridge_core::config::IndexConfig;
use toolbridge_core::ConfigError;

use crate::error::IndexError;

/// Which managed index to query, and with what credential.
#[derive(Clone)]
pub struct QueryAdapterConfig {
    pub index_name: String,
    pub project_name: String,
    pub organization_id: Option<String>,
    pub api_key: String,
    pub base_url: String,
}

impl QueryAdapterConfig {
    pub fn from_config(config: &IndexConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingCredential("LLAMA_CLOUD_API_KEY".to_string()))?;
        if config.name.is_empty() {
            return Err(ConfigError::MissingSetting("INDEX_NAME".to_string()));
        }
        Ok(Self {
            index_name: config.name.clone(),
            project_name: config.project_name.clone(),
            organization_id: config.organization_id.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl fmt::Debug for QueryAdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryAdapterConfig")
            .field("index_name", &self.index_name)
            .field("project_name", &self.project_name)
            .field("organization_id", &self.organization_id)
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// A connected index handle.
#[async_trait]
pub trait ManagedIndex: Send + Sync {
    /// Submit `text` and return the index's answer verbatim.
    async fn query(&self, text: &str) -> Result<String, IndexError>;
}

/// Opens index handles. Called once per tool invocation.
#[async_trait]
pub trait IndexConnector: Send + Sync {
    async fn connect(&self, config: &QueryAdapterConfig) -> Result<Box<dyn ManagedIndex>, IndexError>;
}

/// Substitute `query` for every `{query}` in `template`. A template without
/// the placeholder is appended after the query.
pub fn render_query(template: &str, query: &str) -> String {
    if template.contains("{query}") {
        template.replace("{query}", query)
    } else if template.trim().is_empty() {
        query.to_string()
    } else {
        format!("{} {}", query, template)
    }
}
