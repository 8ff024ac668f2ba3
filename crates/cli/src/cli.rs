use clap::Parser;

use toolbridge_core::Config;

pub const DEFAULT_PROMPT: &str = "How do I instantiate an agent in LlamaIndex?";

/// Ask a question; the agent answers it with the tools of a remote MCP host.
///
/// Settings come from the environment (and `.env`); flags override them.
#[derive(Parser, Debug)]
#[command(name = "toolbridge", about = "Agent client for MCP tool hosts")]
pub struct CliArgs {
    /// The request to answer
    #[arg(default_value = DEFAULT_PROMPT)]
    pub prompt: String,

    /// SSE endpoint of the tool host (overrides TOOL_HOST_URL)
    #[arg(long)]
    pub url: Option<String>,

    /// Expose only this remote tool; repeat for several (overrides TOOL_ALLOW_LIST)
    #[arg(long = "allow-tool", value_name = "NAME")]
    pub allow_tools: Vec<String>,

    /// Turn budget for the think/act loop (overrides AGENT_MAX_TURNS)
    #[arg(long)]
    pub max_turns: Option<usize>,

    /// Model name (overrides OPENAI_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Print the conversation as JSON after the answer
    #[arg(long)]
    pub transcript: bool,

    /// Validate configuration, connect to the host and list its tools, then exit
    #[arg(long)]
    pub check: bool,
}

impl CliArgs {
    /// Fold command-line overrides into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.tool_host.url = url.clone();
        }
        if !self.allow_tools.is_empty() {
            config.tool_host.allowed_tools = Some(self.allow_tools.clone());
        }
        if let Some(max_turns) = self.max_turns {
            config.agent.max_turns = max_turns;
        }
        if let Some(model) = &self.model {
            config.llm.openai_model = model.clone();
        }
    }
}
