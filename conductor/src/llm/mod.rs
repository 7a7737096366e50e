//! LLM client abstraction and the generation engine.
//!
//! `LlmClient` is the one-turn completion interface: messages in, assistant
//! content (and optional tool calls) out. Implementations: `MockLlm` (tests)
//! and `ChatOpenAI` (OpenAI-compatible JSON wire). `GenerationEngine` layers
//! slot selection, retries, the fallback cascade and the one-shot
//! function-call round on top.

mod engine;
mod mock;
mod openai;
pub mod router;

pub use engine::{FunctionHandler, GenerateOptions, GenerationEngine};
pub use mock::MockLlm;
pub use openai::ChatOpenAI;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::message::Message;

/// One tool call requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Declaration of a callable function for the tool-calling path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// Response from one completion: assistant text plus any tool calls.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// LLM client: given messages, returns assistant text and optional tool calls.
///
/// **Interaction**: held by `GenerationEngine` in its named registry; the
/// router/planner/refiner never talk to a client directly.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Canonical model name this client serves.
    fn name(&self) -> &str;

    /// One completion turn.
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, AgentError>;

    /// Whether this client accepts function declarations.
    fn supports_tools(&self) -> bool {
        false
    }

    /// Completion turn with function declarations attached. Default ignores
    /// the declarations.
    async fn invoke_with_tools(
        &self,
        messages: &[Message],
        _tools: &[FunctionSpec],
    ) -> Result<LlmResponse, AgentError> {
        self.invoke(messages).await
    }
}
