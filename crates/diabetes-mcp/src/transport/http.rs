//! HTTP Transport for MCP
//!
//! Accepts one JSON-RPC message per `POST /mcp` and answers in the response
//! body. Notifications are acknowledged with `202 Accepted` and no body.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::protocol::McpResult;
use crate::server::McpServer;

pub const MCP_PATH: &str = "/mcp";

/// Build the router without binding a socket.
pub fn router(server: McpServer) -> Router {
    Router::new()
        .route(MCP_PATH, post(handle_post))
        .with_state(Arc::new(server))
        .layer(TraceLayer::new_for_http())
}

/// Serve `server` over HTTP on `addr` until the process is stopped.
#[tracing::instrument(skip(server))]
pub async fn serve_http(server: McpServer, addr: SocketAddr) -> McpResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("MCP server listening on http://{}{}", addr, MCP_PATH);
    axum::serve(listener, router(server)).await?;
    Ok(())
}

async fn handle_post(State(server): State<Arc<McpServer>>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(reply) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            reply,
        )
            .into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::fixture_server;
    use serde_json::Value;

    fn state() -> State<Arc<McpServer>> {
        State(Arc::new(fixture_server()))
    }

    #[tokio::test]
    async fn requests_get_json_bodies() {
        let response = handle_post(
            state(),
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn notifications_are_accepted_without_body() {
        let response = handle_post(
            state(),
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
