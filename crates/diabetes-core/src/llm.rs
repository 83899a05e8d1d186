use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::messaging::AgentMessage;
use crate::tools::ToolSchema;

/// Request passed to a language model: the system prompt, the full message
/// sequence, and the tools the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub messages: Vec<AgentMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<AgentMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub message: AgentMessage,
}

/// One language-model decision step. Implementations return a single
/// assistant message, optionally carrying tool invocations.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse>;
}
