//! LlamaCloud-hosted index over its REST API.
//!
//! Connecting resolves the project by name (optionally scoped to an
//! organization), then the pipeline backing the named index. A query
//! retrieves passages from the pipeline and hands them, in the order the
//! pipeline returned them, to the [`AnswerSynthesizer`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::adapter::{IndexConnector, ManagedIndex, QueryAdapterConfig};
use crate::error::IndexError;
use crate::synthesis::AnswerSynthesizer;

pub struct LlamaCloudConnector {
    client: reqwest::Client,
    synthesizer: AnswerSynthesizer,
}

impl LlamaCloudConnector {
    pub fn new(synthesizer: AnswerSynthesizer) -> Self {
        Self {
            client: reqwest::Client::new(),
            synthesizer,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_nodes: Vec<RetrievedNode>,
}

#[derive(Debug, Deserialize)]
struct RetrievedNode {
    node: NodeBody,
}

#[derive(Debug, Deserialize)]
struct NodeBody {
    #[serde(default)]
    text: String,
}

/// Map a non-success status on the connect path.
fn connect_status_error(status: u16, body: &str, what: &str) -> IndexError {
    match status {
        401 | 403 => IndexError::AdapterConnection("index credential rejected".to_string()),
        _ => IndexError::AdapterConnection(format!("{} lookup returned {}: {}", what, status, body)),
    }
}

impl LlamaCloudConnector {
    async fn lookup(
        &self,
        config: &QueryAdapterConfig,
        path: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<Vec<NamedEntity>, IndexError> {
        let url = format!("{}{}", config.base_url, path);
        debug!(url = %url, "Index lookup");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&config.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| IndexError::AdapterConnection(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(connect_status_error(status, &body, what));
        }

        response
            .json()
            .await
            .map_err(|e| IndexError::AdapterConnection(format!("bad {} listing: {}", what, e)))
    }
}

#[async_trait]
impl IndexConnector for LlamaCloudConnector {
    async fn connect(&self, config: &QueryAdapterConfig) -> Result<Box<dyn ManagedIndex>, IndexError> {
        info!(index = %config.index_name, project = %config.project_name, "Connecting to managed index");

        let mut project_query = vec![("project_name", config.project_name.as_str())];
        if let Some(org) = &config.organization_id {
            project_query.push(("organization_id", org.as_str()));
        }
        let projects = self
            .lookup(config, "/api/v1/projects", &project_query, "project")
            .await?;
        let project = projects
            .into_iter()
            .find(|p| p.name == config.project_name)
            .ok_or_else(|| {
                IndexError::AdapterConnection(format!("project '{}' not found", config.project_name))
            })?;

        let pipelines = self
            .lookup(
                config,
                "/api/v1/pipelines",
                &[
                    ("project_id", project.id.as_str()),
                    ("pipeline_name", config.index_name.as_str()),
                ],
                "index",
            )
            .await?;
        let pipeline = pipelines
            .into_iter()
            .find(|p| p.name == config.index_name)
            .ok_or_else(|| {
                IndexError::AdapterConnection(format!("index '{}' not found", config.index_name))
            })?;

        debug!(pipeline_id = %pipeline.id, "Managed index resolved");
        Ok(Box::new(LlamaCloudIndex {
            client: self.client.clone(),
            retrieve_url: format!("{}/api/v1/pipelines/{}/retrieve", config.base_url, pipeline.id),
            api_key: config.api_key.clone(),
            synthesizer: self.synthesizer.clone(),
        }))
    }
}

struct LlamaCloudIndex {
    client: reqwest::Client,
    retrieve_url: String,
    api_key: String,
    synthesizer: AnswerSynthesizer,
}

#[async_trait]
impl ManagedIndex for LlamaCloudIndex {
    async fn query(&self, text: &str) -> Result<String, IndexError> {
        let response = self
            .client
            .post(&self.retrieve_url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "query": text }))
            .send()
            .await
            .map_err(|e| IndexError::AdapterConnection(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                401 | 403 => IndexError::AdapterConnection("index credential rejected".to_string()),
                _ => IndexError::Query(format!("retrieve returned {}: {}", status, body)),
            });
        }

        let body: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Query(format!("bad retrieve response: {}", e)))?;
        let passages = node_texts(body);
        debug!(passages = passages.len(), "Retrieved passages");
        self.synthesizer.synthesize(text, &passages).await
    }
}

fn node_texts(body: RetrieveResponse) -> Vec<String> {
    body.retrieval_nodes.into_iter().map(|n| n.node.text).collect()
}
