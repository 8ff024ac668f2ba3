use crate::tool::{Tool, ToolDefinition};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Capability table: tool name to callable tool.
/// Thread-safe via Arc wrapping of individual tools.
///
/// An optional allow-list restricts which tools are exposed; tools outside
/// it are silently dropped at registration, so the agent never sees them.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    allow_list: Option<HashSet<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            allow_list: None,
        }
    }

    /// Only expose tools whose names appear in `names`.
    pub fn with_allow_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allow_list
            .as_ref()
            .map_or(true, |allowed| allowed.contains(name))
    }

    /// Register a tool. Returns error if name already registered.
    ///
    /// Returns `Ok(false)` when the allow-list filtered the tool out.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<bool, RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<bool, RegistryError> {
        let def = tool.definition();
        if !self.is_allowed(&def.name) {
            tracing::debug!(name = %def.name, "Tool not in allow-list, omitting");
            return Ok(false);
        }
        if self.tools.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        self.tools.insert(def.name, tool);
        Ok(true)
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool definitions (for sending to LLM), sorted by name.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateName(String),
}
