//! Tokio-powered runtime for the diabetes risk agent: the bounded
//! tool-calling loop, its configuration, and language-model providers.

pub mod builder;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod providers;

pub use builder::DiabetesAgentBuilder;
pub use config::AgentConfig;
pub use orchestrator::{DiabetesAgent, OrchestratorState, TurnError, TurnOutcome};
pub use providers::{OpenAiChatModel, OpenAiConfig};
