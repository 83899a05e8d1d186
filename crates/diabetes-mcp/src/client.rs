//! MCP Client Implementation
//!
//! Connects to a diabetes MCP server (or any MCP server with tools and
//! resources), performs the initialization handshake and forwards tool calls
//! and resource reads.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn};

use crate::protocol::{
    InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, McpError, McpResource,
    McpResult, McpTool, McpToolResult, RequestId, ResourceContents, ResourceReadParams,
    ResourceReadResult, ResourcesListResult, ToolCallParams, ToolsListResult,
};
use crate::transport::Transport;

/// Default timeout for MCP requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct McpClientConfig {
    /// Timeout for individual requests
    pub request_timeout: Duration,

    /// Client name sent during initialization
    pub client_name: Option<String>,

    /// Client version sent during initialization
    pub client_version: Option<String>,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
            client_name: None,
            client_version: None,
        }
    }
}

/// MCP Client
///
/// Holds the server's initialization result and the tool list discovered
/// right after the handshake.
pub struct McpClient {
    transport: Box<dyn Transport>,
    request_id: AtomicI64,
    config: McpClientConfig,
    server_info: InitializeResult,
    tools: Vec<McpTool>,
}

impl McpClient {
    #[instrument(skip(transport), name = "mcp_connect")]
    pub async fn connect<T: Transport + 'static>(transport: T) -> McpResult<Self> {
        Self::connect_with_config(transport, McpClientConfig::default()).await
    }

    /// Run `initialize`, send `notifications/initialized`, then list tools
    /// when the server advertises them.
    #[instrument(skip(transport, config), name = "mcp_connect")]
    pub async fn connect_with_config<T: Transport + 'static>(
        transport: T,
        config: McpClientConfig,
    ) -> McpResult<Self> {
        let transport: Box<dyn Transport> = Box::new(transport);
        let request_id = AtomicI64::new(1);

        let mut params = InitializeParams::default();
        if let Some(ref name) = config.client_name {
            params.client_info.name = name.clone();
        }
        if let Some(ref version) = config.client_version {
            params.client_info.version = version.clone();
        }

        let server_info: InitializeResult = send_request(
            transport.as_ref(),
            &request_id,
            config.request_timeout,
            "initialize",
            Some(params),
        )
        .await?;
        info!(
            server_name = %server_info.server_info.name,
            server_version = %server_info.server_info.version,
            protocol_version = %server_info.protocol_version,
            "MCP server initialized"
        );

        let notification = serde_json::to_string(&JsonRpcRequest::notification(
            "notifications/initialized",
        ))?;
        if let Some(reply) = transport.send(&notification).await? {
            trace!(reply = %reply, "Ignoring reply to notification");
        }

        let mut client = Self {
            transport,
            request_id,
            config,
            server_info,
            tools: Vec::new(),
        };
        if client.server_info.capabilities.tools.is_some() {
            client.tools = client.list_tools().await?;
            info!(tool_count = client.tools.len(), "Discovered MCP tools");
        }
        Ok(client)
    }

    pub fn server_info(&self) -> &InitializeResult {
        &self.server_info
    }

    /// Tools discovered during connect
    pub fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    pub fn get_tool(&self, name: &str) -> Option<&McpTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Fetch the current tool list from the server
    pub async fn list_tools(&self) -> McpResult<Vec<McpTool>> {
        let result: ToolsListResult = self.send_request("tools/list", None::<()>).await?;
        for tool in &result.tools {
            trace!(tool_name = %tool.name, "Found MCP tool");
        }
        Ok(result.tools)
    }

    #[instrument(skip(self, arguments), fields(tool_name = %name))]
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<McpToolResult> {
        if self.get_tool(name).is_none() {
            warn!(tool_name = %name, "Calling unknown tool");
        }

        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        let result: McpToolResult = self.send_request("tools/call", Some(params)).await?;

        if result.is_error {
            warn!(tool_name = %name, "Tool returned error result");
        } else {
            debug!(tool_name = %name, "Tool call successful");
        }
        Ok(result)
    }

    pub async fn list_resources(&self) -> McpResult<Vec<McpResource>> {
        let result: ResourcesListResult = self.send_request("resources/list", None::<()>).await?;
        Ok(result.resources)
    }

    /// Read one resource. A reply without contents is a protocol error.
    #[instrument(skip(self))]
    pub async fn read_resource(&self, uri: &str) -> McpResult<ResourceContents> {
        let params = ResourceReadParams {
            uri: uri.to_string(),
        };
        let result: ResourceReadResult = self.send_request("resources/read", Some(params)).await?;
        result
            .contents
            .into_iter()
            .next()
            .ok_or_else(|| McpError::protocol(format!("no contents for resource {uri}")))
    }

    async fn send_request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> McpResult<R> {
        send_request(
            self.transport.as_ref(),
            &self.request_id,
            self.config.request_timeout,
            method,
            params,
        )
        .await
    }
}

async fn send_request<P: Serialize, R: DeserializeOwned>(
    transport: &dyn Transport,
    request_id: &AtomicI64,
    request_timeout: Duration,
    method: &str,
    params: Option<P>,
) -> McpResult<R> {
    let id = RequestId::Number(request_id.fetch_add(1, Ordering::SeqCst));

    let mut request = JsonRpcRequest::new(id.clone(), method);
    if let Some(p) = params {
        request = request.with_params(serde_json::to_value(p)?);
    }
    let request_json = serde_json::to_string(&request)?;
    trace!(method = %method, id = %id, "Sending JSON-RPC request");

    let reply = timeout(request_timeout, transport.send(&request_json))
        .await
        .map_err(|_| McpError::Timeout(request_timeout))??
        .ok_or_else(|| McpError::protocol(format!("no response to {method}")))?;

    let response: JsonRpcResponse = serde_json::from_str(&reply)?;
    if response.id.as_ref() != Some(&id) {
        return Err(McpError::ResponseIdMismatch {
            expected: id.to_string(),
            actual: response
                .id
                .map(|actual| actual.to_string())
                .unwrap_or_else(|| "null".to_string()),
        });
    }

    let result = response.into_result()?;
    serde_json::from_value(result).map_err(McpError::from)
}
