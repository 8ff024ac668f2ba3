//! Local stand-ins for the tools a host advertises.
//!
//! Each proxy validates arguments against the advertised schema before
//! anything touches the network, then forwards through the shared
//! [`McpSession`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use toolbridge_tool_runtime::registry::RegistryError;
use toolbridge_tool_runtime::schema::validate_arguments;
use toolbridge_tool_runtime::{Tool, ToolContext, ToolDefinition, ToolError, ToolRegistry, ToolResult};

use crate::error::McpError;
use crate::session::McpSession;
use crate::types::ToolInfo;

/// A remote tool adapter that implements the `Tool` trait.
pub struct McpToolProxy {
    session: Arc<McpSession>,
    info: ToolInfo,
}

impl McpToolProxy {
    pub fn new(session: Arc<McpSession>, info: ToolInfo) -> Self {
        Self { session, info }
    }
}

#[async_trait]
impl Tool for McpToolProxy {
    fn definition(&self) -> ToolDefinition {
        self.info.clone().into()
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let arguments = validate_arguments(&self.info.input_schema, input)?;
        debug!(tool = %self.info.name, "Forwarding call to tool host");

        let result = self
            .session
            .call_tool(&self.info.name, arguments, context.timeout)
            .await
            .map_err(McpError::into_tool_error)?;
        Ok(result.into_tool_result(String::new()))
    }
}

/// Discover the session's tools and wrap each one in a proxy.
///
/// With an allow-list, tools outside it are left out silently. A host that
/// advertises the same name twice is violating the protocol.
pub async fn build_registry(
    session: Arc<McpSession>,
    allow_list: Option<&[String]>,
) -> Result<ToolRegistry, McpError> {
    let manifest = session.list_tools().await?;
    let advertised = manifest.len();

    let mut registry = match allow_list {
        Some(names) => ToolRegistry::new().with_allow_list(names.iter().cloned()),
        None => ToolRegistry::new(),
    };

    for info in manifest {
        registry
            .register(McpToolProxy::new(Arc::clone(&session), info))
            .map_err(|e| match e {
                RegistryError::DuplicateName(name) => {
                    McpError::Protocol(format!("tool '{}' advertised twice", name))
                }
            })?;
    }

    info!(
        advertised,
        exposed = registry.len(),
        tools = ?registry.names(),
        "Tool registry built"
    );
    Ok(registry)
}
