use crate::conversation::{AssistantContent, Conversation};
use crate::provider::{LlmError, ToolAwareLlmProvider};
use crate::registry::ToolRegistry;
use crate::stream::StreamEvent;
use crate::tool::{ToolCall, ToolContext, ToolDefinition, ToolError, ToolErrorKind, ToolResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Liveness view of whatever connection backs the registry's tools.
///
/// When a tool result reports `SessionClosed` and the probe says the
/// session is gone, the run cannot recover and is aborted.
pub trait SessionProbe: Send + Sync {
    fn is_open(&self) -> bool;
}

/// What the model decided on one turn.
#[derive(Debug, Clone)]
pub enum ModelAction {
    FinalAnswer(String),
    ToolCalls(Vec<ToolCall>),
}

/// States of one run: Thinking → Acting → Thinking → … → Done | Failed.
#[derive(Debug)]
pub enum LoopPhase {
    Thinking,
    Acting(Vec<ToolCall>),
    Done(String),
    Failed(OrchestrationError),
}

/// The agentic loop that orchestrates LLM ↔ Tool execution.
///
/// Flow: User → LLM → ToolCalls → Execute → Results → LLM → ... → Final Text
pub struct AgenticLoop {
    provider: Arc<dyn ToolAwareLlmProvider>,
    registry: Arc<ToolRegistry>,
    session_probe: Option<Arc<dyn SessionProbe>>,
    system_prompt: Option<String>,
    max_turns: usize,
    call_timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl AgenticLoop {
    pub fn new(provider: Arc<dyn ToolAwareLlmProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            session_probe: None,
            system_prompt: None,
            max_turns: 10,
            call_timeout: Duration::from_secs(60),
            temperature: 0.0,
            max_tokens: 4096,
        }
    }

    /// Upper bound on model turns per run. Reaching it fails the run.
    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    /// Timeout applied to every tool invocation.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_session_probe(mut self, probe: Arc<dyn SessionProbe>) -> Self {
        self.session_probe = Some(probe);
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// A fresh conversation carrying this loop's system directive.
    pub fn new_conversation(&self) -> Conversation {
        let conversation = Conversation::new();
        match &self.system_prompt {
            Some(prompt) => conversation.with_system_prompt(prompt.clone()),
            None => conversation,
        }
    }

    /// Run one user request to completion in a fresh conversation.
    ///
    /// The conversation is returned alongside the outcome so a failed run's
    /// partial transcript stays available for diagnostics.
    pub async fn answer(
        &self,
        user_request: impl Into<String>,
    ) -> (Result<String, OrchestrationError>, Conversation) {
        let mut conversation = self.new_conversation();
        let outcome = self.run(&mut conversation, user_request.into()).await;
        (outcome, conversation)
    }

    /// Drive the think/act loop for `user_request` until the model gives a
    /// final answer, the turn budget runs out, or the session is lost.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        user_request: String,
    ) -> Result<String, OrchestrationError> {
        conversation.add_user_message(user_request);
        let tools = self.registry.list();
        let mut turns = 0usize;
        let mut phase = LoopPhase::Thinking;

        loop {
            phase = match phase {
                LoopPhase::Thinking => {
                    if turns >= self.max_turns {
                        warn!(turns, "Turn budget exhausted");
                        LoopPhase::Failed(OrchestrationError::BudgetExhausted { turns })
                    } else {
                        turns += 1;
                        debug!(turn = turns, "Thinking");
                        self.think(conversation, &tools).await
                    }
                }
                LoopPhase::Acting(calls) => {
                    debug!(turn = turns, count = calls.len(), "Acting");
                    self.act(conversation, calls).await
                }
                LoopPhase::Done(answer) => {
                    info!(turns, "Agentic loop complete");
                    return Ok(answer);
                }
                LoopPhase::Failed(err) => return Err(err),
            };
        }
    }

    async fn think(&self, conversation: &mut Conversation, tools: &[ToolDefinition]) -> LoopPhase {
        let events = match self
            .provider
            .complete_with_tools(
                conversation.messages().to_vec(),
                conversation.system_prompt().map(String::from),
                tools.to_vec(),
                self.temperature,
                self.max_tokens,
            )
            .await
        {
            Ok(events) => events,
            Err(e) => return LoopPhase::Failed(OrchestrationError::Model(e)),
        };

        let (content, action) = match decode_turn(events) {
            Ok(decoded) => decoded,
            Err(e) => return LoopPhase::Failed(e),
        };
        conversation.add_assistant_response(content);

        match action {
            ModelAction::FinalAnswer(text) => LoopPhase::Done(text),
            ModelAction::ToolCalls(calls) => LoopPhase::Acting(calls),
        }
    }

    async fn act(&self, conversation: &mut Conversation, calls: Vec<ToolCall>) -> LoopPhase {
        info!(count = calls.len(), "Executing tool calls");
        let results = self.execute_tool_calls(&calls).await;

        let mut abort = None;
        for result in &results {
            if abort.is_none() {
                abort = self.session_failure(result);
            }
        }
        for result in results {
            conversation.add_tool_result(result);
        }

        match abort {
            Some(err) => LoopPhase::Failed(err),
            None => LoopPhase::Thinking,
        }
    }

    /// Session-level failures end the run; everything else goes back to the model.
    fn session_failure(&self, result: &ToolResult) -> Option<OrchestrationError> {
        let kind = result.error_kind?;
        let fatal = kind.is_session_level()
            || (kind == ToolErrorKind::SessionClosed
                && self
                    .session_probe
                    .as_ref()
                    .is_some_and(|probe| !probe.is_open()));
        fatal.then(|| OrchestrationError::Session {
            kind,
            message: result.content.clone(),
        })
    }

    /// Execute every call from one model turn concurrently and wait for all
    /// of them. Results come back in call order.
    async fn execute_tool_calls(&self, tool_calls: &[ToolCall]) -> Vec<ToolResult> {
        let context = ToolContext {
            timeout: self.call_timeout,
        };

        let futures = tool_calls.iter().map(|call| {
            let registry = self.registry.clone();
            let context = context.clone();
            let call = call.clone();

            async move {
                let Some(tool) = registry.get(&call.name) else {
                    warn!(tool = %call.name, "Model requested unknown tool");
                    return ToolResult::from_error(call.id, &ToolError::UnknownTool(call.name));
                };

                let outcome =
                    tokio::time::timeout(context.timeout, tool.execute(call.input, &context)).await;
                match outcome {
                    Ok(Ok(mut result)) => {
                        result.tool_call_id = call.id;
                        result
                    }
                    Ok(Err(e)) => {
                        debug!(tool = %call.name, error = %e, "Tool call failed");
                        ToolResult::from_error(call.id, &e)
                    }
                    Err(_) => ToolResult::from_error(call.id, &ToolError::Timeout(context.timeout)),
                }
            }
        });

        futures::future::join_all(futures).await
    }
}

/// Fold one turn's stream events into the assistant message and the action
/// it asks for.
///
/// Tool calls win over text. Unparseable argument JSON is kept as a raw
/// string so the tool's argument validation rejects it and the model gets
/// a chance to retry. A response with neither text nor tool calls, or with
/// tool-call events that do not pair up, is a protocol error.
pub fn decode_turn(
    events: Vec<StreamEvent>,
) -> Result<(AssistantContent, ModelAction), OrchestrationError> {
    struct PartialCall {
        id: String,
        name: String,
        arguments: String,
        complete: bool,
    }

    let mut text = String::new();
    let mut partial: Vec<PartialCall> = Vec::new();

    for event in events {
        match event {
            StreamEvent::TextDelta { text: delta } => text.push_str(&delta),
            StreamEvent::ToolCallStart { id, name } => {
                // Empty ids are assigned later; only an open one can clash.
                if partial
                    .iter()
                    .any(|c| c.id == id && (!id.is_empty() || !c.complete))
                {
                    return Err(OrchestrationError::Protocol(format!(
                        "duplicate tool call id '{}'",
                        id
                    )));
                }
                partial.push(PartialCall {
                    id,
                    name,
                    arguments: String::new(),
                    complete: false,
                });
            }
            StreamEvent::ToolCallDelta {
                id,
                arguments_delta,
            } => {
                let call = partial
                    .iter_mut()
                    .find(|c| c.id == id && !c.complete)
                    .ok_or_else(|| {
                        OrchestrationError::Protocol(format!(
                            "arguments for unknown tool call '{}'",
                            id
                        ))
                    })?;
                call.arguments.push_str(&arguments_delta);
            }
            StreamEvent::ToolCallEnd { id } => {
                let call = partial
                    .iter_mut()
                    .find(|c| c.id == id && !c.complete)
                    .ok_or_else(|| {
                        OrchestrationError::Protocol(format!("end of unknown tool call '{}'", id))
                    })?;
                call.complete = true;
            }
            StreamEvent::MessageEnd { .. } => {}
            StreamEvent::Error { message } => {
                return Err(OrchestrationError::Model(LlmError::InvalidResponse(message)));
            }
        }
    }

    if let Some(open) = partial.iter().find(|c| !c.complete) {
        return Err(OrchestrationError::Protocol(format!(
            "tool call '{}' never completed",
            open.id
        )));
    }

    let tool_calls: Vec<ToolCall> = partial
        .into_iter()
        .map(|c| {
            let input = if c.arguments.trim().is_empty() {
                serde_json::Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(&c.arguments)
                    .unwrap_or_else(|_| serde_json::Value::String(c.arguments.clone()))
            };
            let id = if c.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                c.id
            };
            ToolCall {
                id,
                name: c.name,
                input,
            }
        })
        .collect();

    let text = (!text.is_empty()).then_some(text);
    let content = AssistantContent {
        text: text.clone(),
        tool_calls: tool_calls.clone(),
    };

    let action = if !tool_calls.is_empty() {
        ModelAction::ToolCalls(tool_calls)
    } else if let Some(text) = text {
        ModelAction::FinalAnswer(text)
    } else {
        return Err(OrchestrationError::Protocol(
            "model returned neither text nor tool calls".to_string(),
        ));
    };

    Ok((content, action))
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Turn budget exhausted after {turns} turns")]
    BudgetExhausted { turns: usize },
    #[error("LLM error: {0}")]
    Model(#[from] LlmError),
    #[error("Unrecognized model output: {0}")]
    Protocol(String),
    #[error("Tool session failed ({kind}): {message}")]
    Session { kind: ToolErrorKind, message: String },
}
