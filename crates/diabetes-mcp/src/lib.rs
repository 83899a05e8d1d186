//! # diabetes-mcp
//!
//! Model Context Protocol (MCP) server and client for the diabetes risk tools.
//!
//! The server publishes the five diabetes tools and two reference documents
//! (risk-factor guidelines and model information) as MCP resources. The
//! client connects to such a server and adapts its tools back into a local
//! tool registry.
//!
//! ## Features
//!
//! - **JSON-RPC 2.0**: requests, notifications and standard error codes
//! - **Stdio Transport**: newline-delimited JSON on stdin/stdout (default)
//! - **HTTP Transport**: `POST /mcp` server and a matching client transport
//!   behind the `http` feature
//! - **Tool Adapter**: remote tools usable wherever a local tool is
//!
//! ## Example
//!
//! ```rust,ignore
//! use diabetes_mcp::{serve_stdio, McpServer};
//! use diabetes_model::LoadedModel;
//!
//! let model = LoadedModel::load("models/diabetes_forest.json")?;
//! serve_stdio(McpServer::new(&model)).await?;
//! ```

pub mod client;
pub mod protocol;
pub mod server;
pub mod tool_adapter;
pub mod transport;

#[cfg(test)]
pub(crate) mod fixtures;

pub use client::{McpClient, McpClientConfig};
pub use protocol::{McpError, McpResult, MCP_PROTOCOL_VERSION};
pub use server::{McpServer, DEFAULT_TOOL_TIMEOUT, SERVER_NAME};
pub use tool_adapter::{create_mcp_tools, McpToolAdapter};
pub use transport::Transport;

#[cfg(feature = "stdio")]
pub use transport::stdio::{serve_lines, serve_stdio};

#[cfg(feature = "http")]
pub use transport::http::{router, serve_http, MCP_PATH};

#[cfg(feature = "http")]
pub use transport::http_client::{HttpTransport, HttpTransportBuilder};
