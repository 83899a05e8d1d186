//! Core traits and shared data models for the diabetes risk agent.
//! This crate keeps the domain primitives lightweight so the model, toolkit,
//! runtime, and protocol crates can compose them without pulling in heavy deps.

pub mod features;
pub mod llm;
pub mod messaging;
pub mod session;
pub mod state;
pub mod tools;

pub use features::{FeatureError, FeatureName, FeatureVector, FEATURE_NAMES};
pub use llm::{LanguageModel, LlmRequest, LlmResponse};
pub use messaging::{AgentMessage, MessageContent, MessageMetadata, MessageRole, ToolInvocation};
pub use session::{InMemorySessionStore, SessionGuard, SessionId, SessionInfo, SessionStore};
pub use state::AgentState;
pub use tools::{
    Tool, ToolBox, ToolError, ToolErrorKind, ToolOutput, ToolParameterSchema, ToolRegistry,
    ToolResult, ToolSchema,
};
