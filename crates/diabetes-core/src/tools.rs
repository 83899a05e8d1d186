//! Tool contracts and the dispatch boundary.
//!
//! This module provides:
//! - JSON Schema types describing tool arguments and return values
//! - The [`Tool`] trait implemented by every domain capability
//! - [`ToolRegistry`], which resolves invocations by name and converts every
//!   per-call failure into a structured [`ToolResult`]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::features::FeatureError;
use crate::messaging::{AgentMessage, MessageContent, MessageMetadata, MessageRole, ToolInvocation};

/// JSON Schema definition for tool parameters and results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolParameterSchema {
    /// JSON Schema type (object, string, number, boolean, array, null)
    #[serde(rename = "type")]
    pub schema_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Properties for object types. Ordered so schemas serialize identically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, ToolParameterSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ToolParameterSchema>>,

    /// Additional schema keywords (minimum, exclusiveMinimum, ...)
    #[serde(flatten)]
    pub additional: HashMap<String, Value>,
}

impl ToolParameterSchema {
    fn typed(schema_type: &str, description: impl Into<String>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description: Some(description.into()),
            properties: None,
            required: None,
            items: None,
            additional: HashMap::new(),
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::typed("number", description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::typed("integer", description)
    }

    /// Create an object parameter with properties
    pub fn object<I>(description: impl Into<String>, properties: I, required: Vec<String>) -> Self
    where
        I: IntoIterator<Item = (String, ToolParameterSchema)>,
    {
        Self {
            properties: Some(properties.into_iter().collect()),
            required: Some(required),
            ..Self::typed("object", description)
        }
    }

    pub fn array(description: impl Into<String>, items: ToolParameterSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed("array", description)
        }
    }

    /// Attach an extra JSON Schema keyword such as `minimum`.
    pub fn with_keyword(mut self, key: impl Into<String>, value: Value) -> Self {
        self.additional.insert(key.into(), value);
        self
    }
}

/// Complete schema definition for a tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    /// Unique, stable name for this tool (used by the model for invocation)
    pub name: String,

    pub description: String,

    /// Input parameter schema (always an object)
    pub parameters: ToolParameterSchema,

    /// Shape of a successful result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ToolParameterSchema>,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            returns: None,
        }
    }

    /// Create a tool schema with no parameters
    pub fn no_params(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            name,
            description,
            ToolParameterSchema {
                description: None,
                ..ToolParameterSchema::object("", Vec::new(), Vec::new())
            },
        )
    }

    pub fn with_returns(mut self, returns: ToolParameterSchema) -> Self {
        self.returns = Some(returns);
        self
    }
}

/// Per-call failures. All of them are recovered at the dispatch boundary.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid feature: {0}")]
    InvalidFeature(#[from] FeatureError),

    #[error("unknown tool \"{0}\"")]
    UnknownTool(String),

    #[error("tool \"{tool}\" timed out after {elapsed:?}")]
    Timeout { tool: String, elapsed: Duration },

    #[error("tool execution failed: {0}")]
    Execution(String),

    /// Failure reported by a tool running behind a remote server.
    #[error("{message}")]
    Remote { kind: ToolErrorKind, message: String },
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::InvalidFeature(_) => ToolErrorKind::InvalidFeature,
            ToolError::UnknownTool(_) => ToolErrorKind::UnknownTool,
            ToolError::Timeout { .. } => ToolErrorKind::Timeout,
            ToolError::Execution(_) => ToolErrorKind::Execution,
            ToolError::Remote { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidFeature,
    UnknownTool,
    Timeout,
    Execution,
}

/// Outcome of one dispatched invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Success(Value),
    Error { kind: ToolErrorKind, message: String },
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error { .. })
    }

    /// JSON payload shown to the model and to the remote caller.
    pub fn to_json(&self) -> Value {
        match self {
            ToolOutput::Success(value) => value.clone(),
            ToolOutput::Error { kind, message } => json!({
                "error": { "kind": kind, "message": message }
            }),
        }
    }
}

impl From<ToolError> for ToolOutput {
    fn from(err: ToolError) -> Self {
        ToolOutput::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of a tool invocation, correlated with the call that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_name: String,
    pub tool_call_id: Option<String>,
    pub output: ToolOutput,
}

impl ToolResult {
    pub fn success(invocation: &ToolInvocation, value: Value) -> Self {
        Self::from_output(invocation, ToolOutput::Success(value))
    }

    pub fn failure(invocation: &ToolInvocation, err: ToolError) -> Self {
        Self::from_output(invocation, err.into())
    }

    fn from_output(invocation: &ToolInvocation, output: ToolOutput) -> Self {
        Self {
            tool_name: invocation.tool_name.clone(),
            tool_call_id: invocation.tool_call_id.clone(),
            output,
        }
    }

    /// Tool-role message appended to the conversation.
    pub fn into_message(self) -> AgentMessage {
        AgentMessage {
            role: MessageRole::Tool,
            content: MessageContent::Json(self.output.to_json()),
            tool_calls: Vec::new(),
            metadata: Some(MessageMetadata {
                tool_call_id: self.tool_call_id,
                tool_name: Some(self.tool_name),
            }),
        }
    }
}

/// Core trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the schema definition for this tool
    fn schema(&self) -> ToolSchema;

    /// Executes the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Type alias for boxed tool instances
pub type ToolBox = Arc<dyn Tool>;

/// Tool registry: the catalog of callable capabilities and the dispatch boundary.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolBox>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: ToolBox) -> &mut Self {
        let name = tool.schema().name;
        self.tools.insert(name, tool);
        self
    }

    pub fn register_all<I>(&mut self, tools: I) -> &mut Self
    where
        I: IntoIterator<Item = ToolBox>,
    {
        for tool in tools {
            self.register(tool);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolBox> {
        self.tools.get(name)
    }

    /// Schemas in name order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run a single invocation. Never fails: unknown tools and tool errors
    /// come back as an error [`ToolResult`].
    pub async fn dispatch(&self, invocation: ToolInvocation) -> ToolResult {
        let Some(tool) = self.tools.get(&invocation.tool_name) else {
            tracing::warn!(tool = %invocation.tool_name, "unknown tool requested");
            let err = ToolError::UnknownTool(invocation.tool_name.clone());
            return ToolResult::failure(&invocation, err);
        };

        tracing::debug!(tool = %invocation.tool_name, args = %invocation.args, "dispatching tool");
        match tool.execute(invocation.args.clone()).await {
            Ok(value) => ToolResult::success(&invocation, value),
            Err(err) => {
                tracing::warn!(tool = %invocation.tool_name, error = %err, "tool call failed");
                ToolResult::failure(&invocation, err)
            }
        }
    }
}
