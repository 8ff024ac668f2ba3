mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use toolbridge_core::config::load_dotenv;
use toolbridge_core::preflight::{self, Role};
use toolbridge_core::Config;
use toolbridge_llm::create_tool_provider;
use toolbridge_mcp::{build_registry, Endpoint, McpSession, SessionOptions};
use toolbridge_tool_runtime::AgenticLoop;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let mut config = Config::from_env();
    args.apply(&mut config);

    let report = preflight::run(&config, Role::Agent).context("configuration check failed")?;
    report.log();
    config.log_summary();

    let options = SessionOptions {
        handshake_timeout: config.tool_host.handshake_timeout(),
        request_timeout: config.tool_host.call_timeout(),
        ..SessionOptions::default()
    };
    let session = Arc::new(
        McpSession::open(Endpoint::sse(config.tool_host.url.clone()), options)
            .await
            .with_context(|| format!("failed to connect to tool host at {}", config.tool_host.url))?,
    );

    let outcome = run(&args, &config, Arc::clone(&session)).await;
    session.close().await;
    outcome
}

async fn run(args: &CliArgs, config: &Config, session: Arc<McpSession>) -> Result<()> {
    let registry = build_registry(Arc::clone(&session), config.tool_host.allowed_tools.as_deref())
        .await
        .context("tool discovery failed")?;

    if args.check {
        println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        println!("Tool host at {} exposes {} tool(s):", config.tool_host.url, registry.len());
        for tool in registry.list() {
            println!("  {:<24} {}", tool.name, tool.description);
        }
        return Ok(());
    }

    let provider = create_tool_provider(&config.llm).context("failed to create model provider")?;
    let agent = AgenticLoop::new(provider, Arc::new(registry))
        .with_system_prompt(config.agent.system_prompt.clone())
        .with_max_turns(config.agent.max_turns)
        .with_call_timeout(config.tool_host.call_timeout())
        .with_temperature(config.agent.temperature)
        .with_max_tokens(config.agent.max_tokens)
        .with_session_probe(session);

    info!(prompt = %args.prompt, "Running agent");
    let (outcome, conversation) = agent.answer(args.prompt.clone()).await;

    if args.transcript {
        println!("{}", serde_json::to_string_pretty(&conversation.transcript_json())?);
    }

    match outcome {
        Ok(answer) => {
            info!(
                turns = conversation.model_turns(),
                tool_results = conversation.tool_results().len(),
                "Agent finished"
            );
            println!("{}", answer);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, turns = conversation.model_turns(), "Agent failed");
            Err(e).context("agent run failed")
        }
    }
}
