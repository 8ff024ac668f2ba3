//! Tool host: serves the managed-index query tool over MCP.
//!
//! HTTP+SSE by default (`GET /sse`, `POST /messages`); `--stdio` speaks
//! newline-delimited JSON-RPC on stdin/stdout instead.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use toolbridge_core::config::load_dotenv;
use toolbridge_core::preflight::{self, Role};
use toolbridge_core::Config;
use toolbridge_index::{AnswerSynthesizer, IndexQueryTool};
use toolbridge_llm::create_tool_provider;
use toolbridge_mcp::{McpServer, SseHost, StdioTransport};
use toolbridge_tool_runtime::ToolRegistry;

#[derive(Parser, Debug)]
#[command(name = "toolbridge-host", about = "MCP tool host for a managed document index")]
struct HostArgs {
    /// Serve one client on stdin/stdout instead of HTTP+SSE
    #[arg(long)]
    stdio: bool,

    /// Bind address (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    // stdout carries protocol frames in stdio mode; logs always go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = HostArgs::parse();
    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.host.host = host;
    }
    if let Some(port) = args.port {
        config.host.port = port;
    }

    let report = preflight::run(&config, Role::Host).context("configuration check failed")?;
    report.log();
    config.log_summary();

    let model = create_tool_provider(&config.llm).context("failed to create answer model")?;
    let synthesizer = AnswerSynthesizer::new(model).with_max_tokens(config.agent.max_tokens);
    let tool = IndexQueryTool::from_config(&config.index, synthesizer)
        .context("invalid index configuration")?;
    let mut registry = ToolRegistry::new();
    registry
        .register(tool)
        .context("failed to register query tool")?;
    let registry = Arc::new(registry);

    if args.stdio {
        info!("Serving MCP on stdio");
        let server = McpServer::new(registry)
            .with_name(config.host.server_name.clone())
            .with_call_timeout(config.tool_host.call_timeout());
        let mut transport = StdioTransport::new();
        server.run(&mut transport).await.context("stdio server failed")?;
        return Ok(());
    }

    let addr = tokio::net::lookup_host((config.host.host.as_str(), config.host.port))
        .await
        .with_context(|| format!("cannot resolve {}:{}", config.host.host, config.host.port))?
        .next()
        .with_context(|| format!("no address for {}:{}", config.host.host, config.host.port))?;

    let host = Arc::new(
        SseHost::new(registry)
            .with_name(config.host.server_name.clone())
            .with_call_timeout(config.tool_host.call_timeout()),
    );
    host.serve(addr)
        .await
        .with_context(|| format!("SSE host on {} failed", addr))
}
