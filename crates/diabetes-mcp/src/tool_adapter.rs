//! MCP Tool Adapter
//!
//! Wraps tools discovered on a remote MCP server so they register in a
//! [`ToolRegistry`](diabetes_core::ToolRegistry) next to local tools. The agent
//! cannot tell a remote `predict_risk` from the in-process one.

use std::sync::Arc;

use async_trait::async_trait;
use diabetes_core::{Tool, ToolBox, ToolError, ToolErrorKind, ToolParameterSchema, ToolSchema};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::McpClient;
use crate::protocol::McpTool;

pub struct McpToolAdapter {
    client: Arc<McpClient>,
    tool: McpTool,
}

impl McpToolAdapter {
    pub fn new(client: Arc<McpClient>, tool: McpTool) -> Self {
        Self { client, tool }
    }

    pub fn into_toolbox(self) -> ToolBox {
        Arc::new(self)
    }

    /// Input schemas that do not fit [`ToolParameterSchema`] become an
    /// argument-free object schema.
    fn parameters(&self) -> ToolParameterSchema {
        serde_json::from_value(self.tool.input_schema.clone()).unwrap_or_else(|err| {
            debug!(tool = %self.tool.name, error = %err, "Unsupported input schema");
            ToolSchema::no_params("", "").parameters
        })
    }
}

#[derive(Deserialize)]
struct RemoteFailure {
    error: RemoteFailureBody,
}

#[derive(Deserialize)]
struct RemoteFailureBody {
    kind: ToolErrorKind,
    message: String,
}

/// Turn an `isError` payload back into the error the server reported.
fn remote_error(text: String) -> ToolError {
    match serde_json::from_str::<RemoteFailure>(&text) {
        Ok(RemoteFailure { error }) => ToolError::Remote {
            kind: error.kind,
            message: error.message,
        },
        Err(_) => ToolError::Remote {
            kind: ToolErrorKind::Execution,
            message: text,
        },
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            self.tool.name.clone(),
            self.tool.description.clone(),
            self.parameters(),
        )
    }

    #[instrument(skip(self, args), fields(tool_name = %self.tool.name))]
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let result = self
            .client
            .call_tool(&self.tool.name, args)
            .await
            .map_err(|err| ToolError::Execution(err.to_string()))?;

        let text = result.text();
        if result.is_error {
            return Err(remote_error(text));
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Adapters for every tool the client discovered during connect
pub fn create_mcp_tools(client: Arc<McpClient>) -> Vec<ToolBox> {
    client
        .tools()
        .iter()
        .cloned()
        .map(|tool| McpToolAdapter::new(client.clone(), tool).into_toolbox())
        .collect()
}
