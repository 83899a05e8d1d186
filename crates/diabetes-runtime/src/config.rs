//! Orchestrator configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::prompts::diabetes_system_prompt;

pub const DEFAULT_MAX_ROUND_TRIPS: usize = 10;
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Limits and prompt for one [`DiabetesAgent`](crate::DiabetesAgent).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// Maximum number of tool rounds (model requests tools, tools run) per turn.
    pub max_round_trips: NonZeroUsize,
    /// Applied to each language-model call.
    pub model_timeout: Duration,
    /// Applied to each tool dispatch.
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: diabetes_system_prompt(""),
            max_round_trips: NonZeroUsize::MIN.saturating_add(DEFAULT_MAX_ROUND_TRIPS - 1),
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl AgentConfig {
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_max_round_trips(mut self, max_round_trips: NonZeroUsize) -> Self {
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
}
