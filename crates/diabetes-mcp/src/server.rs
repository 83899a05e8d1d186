//! Request dispatcher for the MCP server.
//!
//! [`McpServer`] is transport-agnostic: it turns one raw JSON-RPC message into
//! at most one raw response. Transports only move lines or HTTP bodies.

use std::sync::Arc;
use std::time::Duration;

use diabetes_core::{ToolError, ToolInvocation, ToolRegistry, ToolResult};
use diabetes_model::{LoadedModel, ModelInfo};
use diabetes_toolkit::{diabetes_tool_registry, read_reference, reference_documents};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::protocol::{
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpContent, McpResource,
    McpTool, McpToolResult, RequestId, ResourceContents, ResourceReadParams, ResourceReadResult,
    ResourcesCapability, ResourcesListResult, ServerCapabilities, ServerInfo, ToolCallParams,
    ToolsCapability, ToolsListResult, JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
};

pub const SERVER_NAME: &str = "Predict Diabetes Server";
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

const FALLBACK_RESPONSE: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// Serves the diabetes tools and reference documents over MCP.
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    model_info: Arc<ModelInfo>,
    tool_timeout: Duration,
}

impl McpServer {
    /// Expose the five diabetes tools over `model`.
    pub fn new(model: &LoadedModel) -> Self {
        Self::with_registry(diabetes_tool_registry(model), model.info())
    }

    pub fn with_registry(registry: ToolRegistry, model_info: ModelInfo) -> Self {
        Self {
            registry: Arc::new(registry),
            model_info: Arc::new(model_info),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Handle one raw message. `None` means nothing should be sent back
    /// (the message was a notification).
    pub async fn handle_message(&self, raw: &str) -> Option<String> {
        let response = match parse_request(raw) {
            Ok(request) => self.handle_request(request).await?,
            Err(response) => response,
        };
        Some(serde_json::to_string(&response).unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to encode response");
            FALLBACK_RESPONSE.to_string()
        }))
    }

    #[tracing::instrument(skip(self, request), fields(method = %request.method))]
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id.clone() else {
            tracing::debug!("notification received");
            return None;
        };

        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => match params::<ToolCallParams>(request.params) {
                Ok(params) => Ok(self.call_tool(params).await),
                Err(err) => Err(err),
            },
            "resources/list" => Ok(self.list_resources()),
            "resources/read" => {
                params::<ResourceReadParams>(request.params).and_then(|p| self.read_resource(p))
            }
            other => {
                tracing::debug!(method = other, "unknown method");
                Err(JsonRpcError::method_not_found(other))
            }
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn initialize(&self) -> Value {
        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources: Some(ResourcesCapability::default()),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Diabetes risk screening from age, BMI, and diabetes pedigree function. \
                 Predictions are for screening only."
                    .to_string(),
            ),
        };
        to_value(result)
    }

    fn list_tools(&self) -> Value {
        let tools = self
            .registry
            .schemas()
            .into_iter()
            .map(|schema| McpTool {
                name: schema.name,
                description: schema.description,
                input_schema: to_value(schema.parameters),
            })
            .collect();
        to_value(ToolsListResult { tools })
    }

    async fn call_tool(&self, params: ToolCallParams) -> Value {
        let arguments = if params.arguments.is_null() {
            json!({})
        } else {
            params.arguments
        };
        let invocation = ToolInvocation::new(params.name, arguments);
        let result = match tokio::time::timeout(
            self.tool_timeout,
            self.registry.dispatch(invocation.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let err = ToolError::Timeout {
                    tool: invocation.tool_name.clone(),
                    elapsed: self.tool_timeout,
                };
                ToolResult::failure(&invocation, err)
            }
        };

        tracing::debug!(tool = %result.tool_name, is_error = result.output.is_error(), "tool call");
        to_value(McpToolResult {
            is_error: result.output.is_error(),
            content: vec![McpContent::text(result.output.to_json().to_string())],
        })
    }

    fn list_resources(&self) -> Value {
        let resources = reference_documents()
            .into_iter()
            .map(|doc| McpResource {
                uri: doc.uri.to_string(),
                name: doc.name.to_string(),
                description: doc.description.to_string(),
                mime_type: doc.mime_type.to_string(),
            })
            .collect();
        to_value(ResourcesListResult { resources })
    }

    fn read_resource(&self, params: ResourceReadParams) -> Result<Value, JsonRpcError> {
        let document = read_reference(&params.uri, &self.model_info)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("unknown resource {}", params.uri)))?;
        let text = serde_json::to_string_pretty(&document).map_err(JsonRpcError::internal)?;
        Ok(to_value(ResourceReadResult {
            contents: vec![ResourceContents {
                uri: params.uri,
                mime_type: "application/json".to_string(),
                text,
            }],
        }))
    }
}

fn parse_request(raw: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| JsonRpcResponse::failure(None, JsonRpcError::parse_error(err)))?;
    let id: Option<RequestId> = value
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok());
    let request: JsonRpcRequest = serde_json::from_value(value)
        .map_err(|err| JsonRpcResponse::failure(id.clone(), JsonRpcError::invalid_request(err)))?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(JsonRpcResponse::failure(
            id,
            JsonRpcError::invalid_request(format!("unsupported jsonrpc version {}", request.jsonrpc)),
        ));
    }
    Ok(request)
}

fn params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(JsonRpcError::invalid_params)
}

/// Protocol result types are plain data; encoding them cannot fail.
fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
