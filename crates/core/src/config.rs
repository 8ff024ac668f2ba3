use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Resolves keys against a lookup function, honoring the active profile.
///
/// With profile `PROD`, every key is first looked up as `PROD_{KEY}` and
/// falls back to `{KEY}`. Empty values count as unset. Values that fail to
/// parse fall back to the default and are remembered in `rejected`.
struct ProfiledEnv<'a> {
    profile: &'a str,
    lookup: &'a dyn Fn(&str) -> Option<String>,
    rejected: RefCell<Vec<RejectedValue>>,
}

impl ProfiledEnv<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|s| !s.is_empty())
    }

    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            if let Some(v) = self.raw(&format!("{}_{}", self.profile, key)) {
                return Some(v);
            }
        }
        self.raw(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.opt(key) else {
            return default;
        };
        match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                self.rejected.borrow_mut().push(RejectedValue {
                    key: key.to_string(),
                    value: raw,
                });
                default
            }
        }
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.opt(key).map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }
}

/// A setting whose value could not be parsed. Preflight refuses to start
/// while any are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedValue {
    pub key: String,
    pub value: String,
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub tool_host: ToolHostConfig,
    pub host: HostServerConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub index: IndexConfig,
    #[serde(skip)]
    pub rejected: Vec<RejectedValue>,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TOOLBRIDGE_PROFILE`.
    pub fn from_env() -> Self {
        let lookup = |key: &str| env::var(key).ok();
        let profile = lookup("TOOLBRIDGE_PROFILE").unwrap_or_default();
        Self::from_lookup(&profile, &lookup)
    }

    /// Build config from an explicit key/value map. Used by tests and
    /// embedders that do not want process environment involved.
    pub fn from_map(profile: &str, vars: &HashMap<String, String>) -> Self {
        let lookup = |key: &str| vars.get(key).cloned();
        Self::from_lookup(profile, &lookup)
    }

    fn from_lookup(profile: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let p = profile.to_uppercase();
        let env = ProfiledEnv {
            profile: &p,
            lookup,
            rejected: RefCell::new(Vec::new()),
        };
        let tool_host = ToolHostConfig::from_env(&env);
        let host = HostServerConfig::from_env(&env);
        let llm = LlmConfig::from_env(&env);
        let agent = AgentConfig::from_env(&env);
        let index = IndexConfig::from_env(&env);
        Self {
            profile: p.clone(),
            tool_host,
            host,
            llm,
            agent,
            index,
            rejected: env.rejected.into_inner(),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  tool_host:  url={}, allow_list={}",
            self.tool_host.url,
            self.tool_host
                .allowed_tools
                .as_ref()
                .map(|t| t.join(","))
                .unwrap_or_else(|| "(all)".to_string())
        );
        tracing::info!("  host:       bind={}:{}", self.host.host, self.host.port);
        tracing::info!(
            "  llm:        provider={}, model={}, configured={}",
            self.llm.provider,
            self.llm.openai_model,
            self.llm.is_configured()
        );
        tracing::info!("  agent:      max_turns={}", self.agent.max_turns);
        tracing::info!(
            "  index:      name={}, project={}, configured={}",
            self.index.name,
            self.index.project_name,
            self.index.is_configured()
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "tool_host": {
                "url": self.tool_host.url,
                "allowed_tools": self.tool_host.allowed_tools,
                "call_timeout_secs": self.tool_host.call_timeout_secs,
            },
            "host": { "host": self.host.host, "port": self.host.port },
            "llm": {
                "provider": self.llm.provider,
                "model": self.llm.openai_model,
                "configured": self.llm.is_configured(),
            },
            "agent": { "max_turns": self.agent.max_turns },
            "index": {
                "name": self.index.name,
                "project_name": self.index.project_name,
                "tool_name": self.index.tool_name,
                "configured": self.index.is_configured(),
            },
        })
    }
}

// ── Tool host (client side) ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolHostConfig {
    /// SSE endpoint of the remote tool host.
    pub url: String,
    /// When set, only these tool names are exposed to the agent.
    pub allowed_tools: Option<Vec<String>>,
    pub call_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
}

impl ToolHostConfig {
    fn from_env(env: &ProfiledEnv<'_>) -> Self {
        Self {
            url: env.or("TOOL_HOST_URL", "http://localhost:8000/sse"),
            allowed_tools: env.list("TOOL_ALLOW_LIST"),
            call_timeout_secs: env.parsed("TOOL_CALL_TIMEOUT_SECS", 60),
            handshake_timeout_secs: env.parsed("TOOL_HANDSHAKE_TIMEOUT_SECS", 10),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

// ── Tool host server ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostServerConfig {
    pub host: String,
    pub port: u16,
    pub server_name: String,
}

impl HostServerConfig {
    fn from_env(env: &ProfiledEnv<'_>) -> Self {
        Self {
            host: env.or("HOST", "127.0.0.1"),
            port: env.parsed("PORT", 8000),
            server_name: env.or("HOST_SERVER_NAME", "toolbridge-index-host"),
        }
    }
}

// ── LLM ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Only "openai" (and OpenAI-compatible endpoints) is supported.
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
}

impl LlmConfig {
    fn from_env(env: &ProfiledEnv<'_>) -> Self {
        Self {
            provider: env.or("LLM_PROVIDER", "openai"),
            openai_api_key: env.opt("OPENAI_API_KEY"),
            openai_model: env.or("OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: env.or("OPENAI_BASE_URL", "https://api.openai.com"),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            _ => false,
        }
    }
}

// ── Agent loop ────────────────────────────────────────────────

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an agent that knows how to build agents in LlamaIndex.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub system_prompt: String,
    pub max_turns: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl AgentConfig {
    fn from_env(env: &ProfiledEnv<'_>) -> Self {
        Self {
            system_prompt: env.or("AGENT_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
            max_turns: env.parsed("AGENT_MAX_TURNS", 10),
            temperature: env.parsed("AGENT_TEMPERATURE", 0.0),
            max_tokens: env.parsed("AGENT_MAX_TOKENS", 4096),
        }
    }
}

// ── Managed index (query tool) ────────────────────────────────

pub const DEFAULT_QUERY_TEMPLATE: &str = "{query} Be verbose and include code examples.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub name: String,
    pub project_name: String,
    pub organization_id: Option<String>,
    /// Name under which the query tool is advertised.
    pub tool_name: String,
    /// Template applied to every incoming query; `{query}` is replaced.
    pub query_template: String,
}

impl IndexConfig {
    fn from_env(env: &ProfiledEnv<'_>) -> Self {
        Self {
            api_key: env.opt("LLAMA_CLOUD_API_KEY"),
            base_url: env.or("LLAMA_CLOUD_BASE_URL", "https://api.cloud.llamaindex.ai"),
            name: env.or("INDEX_NAME", ""),
            project_name: env.or("INDEX_PROJECT_NAME", "Default"),
            organization_id: env.opt("INDEX_ORGANIZATION_ID"),
            tool_name: env.or("INDEX_TOOL_NAME", "search"),
            query_template: env.or("INDEX_QUERY_TEMPLATE", DEFAULT_QUERY_TEMPLATE),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && !self.name.is_empty()
    }
}
