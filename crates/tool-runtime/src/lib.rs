pub mod tool;
pub mod schema;
pub mod registry;
pub mod runtime;
pub mod provider;
pub mod conversation;
pub mod stream;

pub use tool::{Tool, ToolCall, ToolContext, ToolDefinition, ToolError, ToolErrorKind, ToolResult};
pub use registry::ToolRegistry;
pub use runtime::{AgenticLoop, LoopPhase, ModelAction, OrchestrationError, SessionProbe};
pub use provider::{LlmError, ToolAwareLlmProvider};
pub use conversation::Conversation;
pub use stream::StreamEvent;
