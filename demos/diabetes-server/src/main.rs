use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use diabetes_mcp::{serve_http, serve_stdio, McpServer};
use diabetes_model::LoadedModel;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "diabetes-server")]
#[command(about = "MCP server exposing the diabetes risk tools")]
struct Cli {
    /// Serve POST /mcp over HTTP instead of stdio
    #[arg(long)]
    http: bool,

    /// Address to bind in HTTP mode
    #[arg(long, env = "DIABETES_MCP_ADDR", default_value = "127.0.0.1:8000")]
    addr: SocketAddr,

    /// Forest artifact to load
    #[arg(long, env = "DIABETES_MODEL_PATH", default_value = "models/diabetes_forest.json")]
    model: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // stdout carries protocol traffic in stdio mode
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let model = LoadedModel::load(&cli.model)
        .with_context(|| format!("failed to load model from {}", cli.model.display()))?;
    let info = model.info();
    tracing::info!(
        path = %cli.model.display(),
        trees = info.tree_count,
        nodes = info.node_count,
        "model loaded"
    );

    let server = McpServer::new(&model);
    if cli.http {
        serve_http(server, cli.addr).await?;
    } else {
        serve_stdio(server).await?;
    }
    Ok(())
}
