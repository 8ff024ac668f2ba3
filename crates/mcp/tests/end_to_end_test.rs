//! Full path: scripted model → agentic loop → remote proxy → session →
//! MCP server → index query tool → stub index, all in one process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;

use toolbridge_index::{IndexConnector, IndexError, IndexQueryTool, ManagedIndex, QueryAdapterConfig};
use toolbridge_mcp::{build_registry, ChannelTransport, Endpoint, McpServer, McpSession, SessionOptions, SessionState};
use toolbridge_tool_runtime::conversation::ConversationMessage;
use toolbridge_tool_runtime::provider::mock::{tool_call_events, MockLlmProvider};
use toolbridge_tool_runtime::{
    AgenticLoop, OrchestrationError, Tool, ToolContext, ToolDefinition, ToolError, ToolErrorKind,
    ToolRegistry, ToolResult,
};

/// Index that answers every query with a fixed string.
struct FixedIndex {
    answer: String,
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ManagedIndex for FixedIndex {
    async fn query(&self, text: &str) -> Result<String, IndexError> {
        self.seen.lock().unwrap().push(text.to_string());
        Ok(self.answer.clone())
    }
}

struct StubConnector {
    answer: Option<String>,
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl IndexConnector for StubConnector {
    async fn connect(&self, _config: &QueryAdapterConfig) -> Result<Box<dyn ManagedIndex>, IndexError> {
        match &self.answer {
            Some(answer) => Ok(Box::new(FixedIndex {
                answer: answer.clone(),
                seen: Arc::clone(&self.seen),
            })),
            None => Err(IndexError::AdapterConnection("index credential rejected".into())),
        }
    }
}

fn adapter() -> QueryAdapterConfig {
    QueryAdapterConfig {
        index_name: "docs".into(),
        project_name: "Default".into(),
        organization_id: None,
        api_key: "test-key".into(),
        base_url: "https://example.invalid".into(),
    }
}

struct Harness {
    session: Arc<McpSession>,
    registry: Arc<ToolRegistry>,
    provider: Arc<MockLlmProvider>,
    queries: Arc<Mutex<Vec<String>>>,
    host: JoinHandle<()>,
}

impl Harness {
    /// Host exposing one `search` tool whose index answers `answer`, or is
    /// unreachable when `answer` is `None`.
    async fn start(answer: Option<&str>) -> Self {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let connector = StubConnector {
            answer: answer.map(String::from),
            seen: Arc::clone(&queries),
        };
        let mut host_registry = ToolRegistry::new();
        host_registry
            .register(IndexQueryTool::new(adapter(), Arc::new(connector)))
            .unwrap();
        Self::serve(host_registry, queries).await
    }

    async fn serve(host_registry: ToolRegistry, queries: Arc<Mutex<Vec<String>>>) -> Self {
        let server = McpServer::new(Arc::new(host_registry));

        let (client, mut server_end) = ChannelTransport::pair();
        let host = tokio::spawn(async move {
            let _ = server.run(&mut server_end).await;
        });

        let session = Arc::new(
            McpSession::connect(Endpoint::embedded("e2e"), client, SessionOptions::default())
                .await
                .unwrap(),
        );
        let registry = Arc::new(build_registry(Arc::clone(&session), None).await.unwrap());

        Self {
            session,
            registry,
            provider: Arc::new(MockLlmProvider::new()),
            queries,
            host,
        }
    }

    fn agent(&self) -> AgenticLoop {
        AgenticLoop::new(self.provider.clone(), Arc::clone(&self.registry))
            .with_session_probe(self.session.clone())
            .with_call_timeout(Duration::from_secs(5))
    }
}

/// Host tool whose own upstream drops the connection.
struct ResetUpstream;

#[async_trait]
impl Tool for ResetUpstream {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch".into(),
            description: "Fetch a page from upstream".into(),
            input_schema: json!({"type": "object"}),
        }
    }

    async fn execute(&self, _input: serde_json::Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        Err(ToolError::Connection("upstream API reset".into()))
    }
}

#[tokio::test]
async fn single_tool_call_then_answer() {
    let h = Harness::start(Some("bar")).await;
    assert_eq!(h.registry.names(), vec!["search".to_string()]);

    h.provider.queue_tool_call("call_1", "search", json!({"query": "foo"}));
    h.provider.queue_text("The answer is bar");

    let (outcome, conversation) = h.agent().answer("foo?").await;
    assert_eq!(outcome.unwrap(), "The answer is bar");
    assert_eq!(conversation.model_turns(), 2);

    let results = conversation.tool_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_call_id, "call_1");
    assert_eq!(results[0].content, "bar");
    assert!(!results[0].is_error);

    assert_eq!(
        *h.queries.lock().unwrap(),
        vec!["foo Be verbose and include code examples.".to_string()]
    );

    // The model saw the remote tool in its manifest.
    let calls = h.provider.calls();
    assert_eq!(calls[0].tools.len(), 1);
    assert_eq!(calls[0].tools[0].name, "search");
}

#[tokio::test]
async fn unknown_tool_is_fed_back_and_run_recovers() {
    let h = Harness::start(Some("bar")).await;

    h.provider.queue_tool_call("call_1", "lookup", json!({"query": "foo"}));
    h.provider.queue_tool_call("call_2", "search", json!({"query": "foo"}));
    h.provider.queue_text("Found it: bar");

    let (outcome, conversation) = h.agent().answer("foo?").await;
    assert_eq!(outcome.unwrap(), "Found it: bar");

    let results = conversation.tool_results();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_error);
    assert_eq!(results[0].error_kind, Some(ToolErrorKind::UnknownTool));
    assert_eq!(results[1].content, "bar");

    // The failure was in the transcript the model received on turn 2.
    let second_turn = &h.provider.calls()[1].messages;
    assert!(second_turn.iter().any(|m| matches!(
        m,
        ConversationMessage::ToolResult(r) if r.error_kind == Some(ToolErrorKind::UnknownTool)
    )));
}

#[tokio::test]
async fn budget_ends_run_after_exactly_two_turns() {
    let h = Harness::start(Some("bar")).await;
    h.provider
        .set_fallback(tool_call_events("again", "search", json!({"query": "more"})));

    let (outcome, conversation) = h.agent().with_max_turns(2).answer("never done").await;
    assert!(matches!(
        outcome,
        Err(OrchestrationError::BudgetExhausted { turns: 2 })
    ));
    assert_eq!(h.provider.call_count(), 2);
    assert_eq!(conversation.model_turns(), 2);
}

#[tokio::test]
async fn unreachable_index_is_a_tool_failure_not_a_crash() {
    let h = Harness::start(None).await;

    h.provider.queue_tool_call("call_1", "search", json!({"query": "foo"}));
    h.provider.queue_text("The index is down.");

    let (outcome, conversation) = h.agent().answer("foo?").await;
    assert_eq!(outcome.unwrap(), "The index is down.");

    let results = conversation.tool_results();
    assert!(results[0].is_error);
    assert_eq!(results[0].error_kind, Some(ToolErrorKind::AdapterConnection));
    assert_eq!(h.session.state(), SessionState::Open);
}

#[tokio::test]
async fn host_loss_aborts_the_run() {
    let h = Harness::start(Some("bar")).await;

    let mut state = h.session.subscribe();
    h.host.abort();
    state
        .wait_for(|s| *s == SessionState::Errored)
        .await
        .unwrap();

    h.provider.queue_tool_call("call_1", "search", json!({"query": "foo"}));
    h.provider.queue_text("unreachable");

    let (outcome, _) = h.agent().answer("foo?").await;
    assert!(matches!(
        outcome,
        Err(OrchestrationError::Session { kind: ToolErrorKind::Connection, .. })
    ));
    assert_eq!(h.provider.call_count(), 1);
}

#[tokio::test]
async fn closed_session_aborts_the_run() {
    let h = Harness::start(Some("bar")).await;
    h.session.close().await;

    h.provider.queue_tool_call("call_1", "search", json!({"query": "foo"}));

    let (outcome, _) = h.agent().answer("foo?").await;
    assert!(matches!(
        outcome,
        Err(OrchestrationError::Session { kind: ToolErrorKind::SessionClosed, .. })
    ));
}

#[tokio::test]
async fn host_tool_connection_failure_is_fed_back() {
    let mut host_registry = ToolRegistry::new();
    host_registry.register(ResetUpstream).unwrap();
    let h = Harness::serve(host_registry, Arc::new(Mutex::new(Vec::new()))).await;

    h.provider.queue_tool_call("call_1", "fetch", json!({}));
    h.provider.queue_text("recovered");

    let (outcome, conversation) = h.agent().answer("fetch it").await;
    assert_eq!(outcome.unwrap(), "recovered");
    assert_eq!(h.session.state(), SessionState::Open);

    let results = conversation.tool_results();
    assert!(results[0].is_error);
    assert_eq!(results[0].error_kind, Some(ToolErrorKind::Execution));
    assert!(results[0].content.contains("upstream API reset"));
}

#[tokio::test]
async fn long_tool_answer_keeps_the_whole_transcript() {
    let long_answer = "x".repeat(500_000);
    let h = Harness::start(Some(&long_answer)).await;

    h.provider.queue_tool_call("call_1", "search", json!({"query": "foo"}));
    h.provider.queue_text("The answer is bar");

    let (outcome, conversation) = h.agent().answer("foo?").await;
    assert_eq!(outcome.unwrap(), "The answer is bar");
    assert_eq!(conversation.messages().len(), 4);
    assert_eq!(conversation.model_turns(), 2);
    assert!(matches!(&conversation.messages()[0], ConversationMessage::User(q) if q == "foo?"));
    assert_eq!(conversation.tool_results()[0].content.len(), 500_000);

    // The second model turn saw the call that the result answers.
    let second_turn = &h.provider.calls()[1].messages;
    assert!(second_turn.iter().any(|m| matches!(
        m,
        ConversationMessage::Assistant(a) if a.tool_calls.iter().any(|c| c.id == "call_1")
    )));
}
