//! MCP Error Types

use super::messages::JsonRpcError;
use std::time::Duration;
use thiserror::Error;

/// Transport, serialization and client-side protocol failures.
///
/// On the server, problems with a single request never surface here; they are
/// answered with a JSON-RPC error object instead. The client maps a received
/// error object to [`McpError::Server`].
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(#[from] JsonRpcError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Response ID mismatch: expected {expected}, got {actual}")]
    ResponseIdMismatch { expected: String, actual: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl McpError {
    pub fn transport(msg: impl Into<String>) -> Self {
        McpError::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        McpError::Protocol(msg.into())
    }
}

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
