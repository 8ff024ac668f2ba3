//! OpenAI chat-completions implementation of [`ToolAwareLlmProvider`].
//!
//! Requests are non-streaming; the finished completion is replayed as
//! provider-agnostic [`StreamEvent`]s so the agentic loop sees the same
//! shape it would from a streaming provider.
//!
//! [`ToolAwareLlmProvider`]: toolbridge_tool_runtime::ToolAwareLlmProvider
//! [`StreamEvent`]: toolbridge_tool_runtime::StreamEvent

mod client;
mod response;
mod translate;

pub use self::client::OpenAiToolProvider;
