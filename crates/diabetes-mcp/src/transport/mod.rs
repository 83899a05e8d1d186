//! MCP Transport Layer
//!
//! Server transports only move raw messages; [`McpServer`] does all protocol
//! handling. On the client side, [`Transport`] carries one request to a server
//! and hands back its reply.

#[cfg(feature = "stdio")]
pub mod stdio;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub mod http_client;

use async_trait::async_trait;

use crate::protocol::McpResult;
use crate::server::McpServer;

/// Client-side transport for MCP communication
///
/// Every exchange is one message out and at most one message back. Requests
/// always get a reply; notifications return `None`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &str) -> McpResult<Option<String>>;
}

/// Talk to a server in the same process.
#[async_trait]
impl Transport for McpServer {
    async fn send(&self, message: &str) -> McpResult<Option<String>> {
        Ok(self.handle_message(message).await)
    }
}
