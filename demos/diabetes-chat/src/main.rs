use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use diabetes_core::{InMemorySessionStore, LanguageModel, SessionStore, ToolBox};
use diabetes_mcp::{create_mcp_tools, HttpTransport, McpClient};
use diabetes_model::LoadedModel;
use diabetes_runtime::{DiabetesAgentBuilder, OpenAiChatModel, OpenAiConfig, TurnOutcome};
use diabetes_toolkit::{create_diabetes_tools, GUIDELINES_URI};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "diabetes-chat")]
#[command(about = "Chat with the diabetes risk assistant")]
struct Cli {
    /// Use the tools of a running MCP server instead of a local model
    #[arg(long, env = "DIABETES_MCP_URL")]
    mcp_url: Option<String>,

    /// Forest artifact for local tools
    #[arg(long, env = "DIABETES_MODEL_PATH", default_value = "models/diabetes_forest.json")]
    model: PathBuf,

    /// Chat model name
    #[arg(long, env = "LLM_MODEL")]
    llm_model: Option<String>,

    /// OpenAI-compatible chat completions endpoint
    #[arg(long, env = "LLM_API_URL")]
    llm_api_url: Option<String>,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Tool rounds allowed per turn
    #[arg(long, env = "DIABETES_MAX_ROUND_TRIPS")]
    max_round_trips: Option<usize>,
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("Agent> {}", outcome.answer);
    for (call, result) in outcome.tool_calls() {
        println!("  >> Tool call: {} {}", call.tool_name, call.args);
        if let Some(result) = result {
            println!("  << {}", result.content_text());
        }
    }
}

/// Connect to a remote server and adapt its tools.
async fn remote_tools(url: &str) -> anyhow::Result<Vec<ToolBox>> {
    let transport = HttpTransport::new(url).build()?;
    let client = McpClient::connect(transport)
        .await
        .with_context(|| format!("failed to connect to MCP server at {}", url))?;

    let guidelines = client
        .read_resource(GUIDELINES_URI)
        .await
        .context("failed to read risk-factor guidelines")?;
    tracing::info!(
        uri = %guidelines.uri,
        bytes = guidelines.text.len(),
        "fetched risk-factor guidelines"
    );

    let tools = create_mcp_tools(Arc::new(client));
    tracing::info!(url = %url, tools = tools.len(), "using remote tools");
    Ok(tools)
}

fn local_tools(path: &Path) -> anyhow::Result<Vec<ToolBox>> {
    let risk_model = LoadedModel::load(path)
        .with_context(|| format!("failed to load model from {}", path.display()))?;
    Ok(create_diabetes_tools(&risk_model))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();

    let tools = match cli.mcp_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => remote_tools(url).await?,
        None => local_tools(&cli.model)?,
    };

    let mut llm_config = OpenAiConfig::default()
        .with_api_key(cli.llm_api_key)
        .with_api_url(cli.llm_api_url);
    if let Some(model) = cli.llm_model {
        llm_config.model = model;
    }
    let model_name = llm_config.model.clone();
    let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(llm_config)?);

    let mut builder = DiabetesAgentBuilder::new().with_model(llm).with_tools(tools);
    if let Some(limit) = cli.max_round_trips {
        builder = builder.with_max_round_trips(limit);
    }
    let agent = builder.build()?;

    let store = InMemorySessionStore::new();
    let mut session = store.create_session().await?;

    println!("Diabetes risk assistant (model: {})", model_name);
    println!("Ask about diabetes risk. Commands: /reset, /quit");

    let stdin = io::stdin();
    let mut input = String::new();
    loop {
        print!("You> ");
        io::stdout().flush().ok();
        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let line = input.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "/quit" | "/exit" => break,
            "/reset" => {
                store.delete_session(&session.id).await?;
                session = store.create_session().await?;
                println!("Started a new conversation.");
                continue;
            }
            _ if line.starts_with('/') => {
                println!("Unknown command. Use /reset or /quit.");
                continue;
            }
            _ => {}
        }

        match agent.run_session_turn(&store, &session.id, line).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(err) => println!("Error: {} (conversation kept; try again)", err),
        }
    }
    Ok(())
}
