//! Stdio Transport for MCP
//!
//! Reads newline-delimited JSON-RPC messages from stdin and writes one
//! response line per request to stdout. Logs must go to stderr.

use crate::protocol::McpResult;
use crate::server::McpServer;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, trace};

/// Serve `server` until the reader reaches end of input.
///
/// Blank lines are skipped. Requests are answered in the order they arrive.
pub async fn serve_lines<R, W>(server: &McpServer, reader: R, mut writer: W) -> McpResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        trace!(message = %line, "Received message");

        if let Some(response) = server.handle_message(line).await {
            trace!(message = %response, "Sending response");
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
    debug!("Input closed");
    Ok(())
}

/// Serve over the process's stdin and stdout.
#[tracing::instrument(skip_all)]
pub async fn serve_stdio(server: McpServer) -> McpResult<()> {
    info!("MCP server listening on stdio");
    serve_lines(
        &server,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::fixture_server;
    use serde_json::Value;

    #[tokio::test]
    async fn answers_each_request_line() {
        let server = fixture_server();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"predict_risk","arguments":{"age":50,"bmi":35,"diabetes_pedigree_function":0.4}}}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve_lines(&server, BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["id"], 2);
        let text = lines[1]["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["prediction"], 1);
        assert_eq!(payload["risk_band"], "high");
    }
}
