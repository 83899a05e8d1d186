//! Fluent construction of a [`DiabetesAgent`].

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use diabetes_core::{LanguageModel, ToolBox, ToolRegistry};
use diabetes_model::LoadedModel;
use diabetes_toolkit::create_diabetes_tools;

use crate::config::AgentConfig;
use crate::orchestrator::DiabetesAgent;
use crate::prompts::diabetes_system_prompt;

/// Assemble an agent in one chain:
///
/// ```ignore
/// let agent = DiabetesAgentBuilder::new()
///     .with_model(Arc::new(OpenAiChatModel::new(OpenAiConfig::default())?))
///     .with_risk_model(&loaded)
///     .with_max_round_trips(5)
///     .build()?;
/// ```
pub struct DiabetesAgentBuilder {
    model: Option<Arc<dyn LanguageModel>>,
    registry: ToolRegistry,
    instructions: String,
    custom_system_prompt: Option<String>,
    max_round_trips: usize,
    model_timeout: Duration,
    tool_timeout: Duration,
}

impl Default for DiabetesAgentBuilder {
    fn default() -> Self {
        let defaults = AgentConfig::default();
        Self {
            model: None,
            registry: ToolRegistry::new(),
            instructions: String::new(),
            custom_system_prompt: None,
            max_round_trips: defaults.max_round_trips.get(),
            model_timeout: defaults.model_timeout,
            tool_timeout: defaults.tool_timeout,
        }
    }
}

impl DiabetesAgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Register the five diabetes tools over `model`.
    pub fn with_risk_model(mut self, model: &LoadedModel) -> Self {
        self.registry.register_all(create_diabetes_tools(model));
        self
    }

    pub fn with_tool(mut self, tool: ToolBox) -> Self {
        self.registry.register(tool);
        self
    }

    /// Register externally provided tools, e.g. adapters for a remote server.
    pub fn with_tools<I>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = ToolBox>,
    {
        self.registry.register_all(tools);
        self
    }

    /// Extra instructions placed before the default system prompt.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Replace the system prompt entirely; `with_instructions` is then ignored.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.custom_system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_round_trips(mut self, max_round_trips: usize) -> Self {
        self.max_round_trips = max_round_trips;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn build(self) -> anyhow::Result<DiabetesAgent> {
        let Self {
            model,
            registry,
            instructions,
            custom_system_prompt,
            max_round_trips,
            model_timeout,
            tool_timeout,
        } = self;

        let model = model.ok_or_else(|| anyhow::anyhow!("a language model is required"))?;
        let max_round_trips = NonZeroUsize::new(max_round_trips)
            .ok_or_else(|| anyhow::anyhow!("max_round_trips must be greater than 0"))?;
        if registry.is_empty() {
            tracing::warn!("building an agent without tools");
        }

        let system_prompt =
            custom_system_prompt.unwrap_or_else(|| diabetes_system_prompt(&instructions));
        let config = AgentConfig::default()
            .with_system_prompt(system_prompt)
            .with_max_round_trips(max_round_trips)
            .with_model_timeout(model_timeout)
            .with_tool_timeout(tool_timeout);

        Ok(DiabetesAgent::new(model, Arc::new(registry), config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use diabetes_core::{AgentMessage, LlmRequest, LlmResponse};

    struct Silent;

    #[async_trait]
    impl LanguageModel for Silent {
        async fn generate(&self, _request: LlmRequest) -> anyhow::Result<LlmResponse> {
            Ok(LlmResponse {
                message: AgentMessage::assistant(""),
            })
        }
    }

    #[test]
    fn model_is_required() {
        let err = DiabetesAgentBuilder::new().build().err().unwrap();
        assert!(err.to_string().contains("language model"));
    }

    #[test]
    fn zero_round_trips_is_rejected() {
        let err = DiabetesAgentBuilder::new()
            .with_model(Arc::new(Silent))
            .with_max_round_trips(0)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("max_round_trips"));
    }

    #[test]
    fn settings_reach_the_config() {
        let agent = DiabetesAgentBuilder::new()
            .with_model(Arc::new(Silent))
            .with_instructions("Be brief.")
            .with_max_round_trips(4)
            .with_tool_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(agent.config().max_round_trips.get(), 4);
        assert_eq!(agent.config().tool_timeout, Duration::from_secs(5));
        assert!(agent.config().system_prompt.starts_with("Be brief."));
        assert!(agent.registry().is_empty());
    }

    #[test]
    fn external_tools_are_registered() {
        struct Named(&'static str);

        #[async_trait]
        impl diabetes_core::Tool for Named {
            fn schema(&self) -> diabetes_core::ToolSchema {
                diabetes_core::ToolSchema::no_params(self.0, "test tool")
            }

            async fn execute(
                &self,
                _args: serde_json::Value,
            ) -> Result<serde_json::Value, diabetes_core::ToolError> {
                Ok(serde_json::Value::Null)
            }
        }

        let agent = DiabetesAgentBuilder::new()
            .with_model(Arc::new(Silent))
            .with_tools([
                Arc::new(Named("predict_risk")) as ToolBox,
                Arc::new(Named("get_guidelines")),
            ])
            .build()
            .unwrap();
        assert_eq!(agent.registry().names(), ["get_guidelines", "predict_risk"]);
    }

    #[test]
    fn custom_prompt_wins() {
        let agent = DiabetesAgentBuilder::new()
            .with_model(Arc::new(Silent))
            .with_instructions("ignored")
            .with_system_prompt("Only this.")
            .build()
            .unwrap();
        assert_eq!(agent.config().system_prompt, "Only this.");
    }
}
