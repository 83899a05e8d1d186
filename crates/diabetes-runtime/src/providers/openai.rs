use async_trait::async_trait;
use diabetes_core::{
    AgentMessage, LanguageModel, LlmRequest, LlmResponse, MessageRole, ToolInvocation, ToolSchema,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Local Ollama's OpenAI-compatible endpoint.
pub const DEFAULT_API_URL: &str = "http://localhost:11434/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "qwen3:32b";

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Not needed for a local Ollama server.
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_url: None,
        }
    }
}

impl OpenAiConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        self.api_url = api_url;
        self
    }

    fn url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }
}

/// Chat-completions client with function calling.
pub struct OpenAiChatModel {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .user_agent("diabetes-risk-agent/0.1")
                .build()?,
            config,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [OpenAiMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool<'a>>,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct OpenAiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunction<'a>,
}

#[derive(Serialize)]
struct OpenAiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a diabetes_core::ToolParameterSchema,
}

#[derive(Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAiFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    /// A JSON-encoded string per the API, though some servers send an object.
    arguments: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

fn to_openai_messages(request: &LlmRequest) -> Vec<OpenAiMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(OpenAiMessage {
        role: "system",
        content: request.system_prompt.clone(),
        tool_calls: Vec::new(),
        tool_call_id: None,
    });

    for msg in &request.messages {
        let role = match msg.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        let tool_calls = msg
            .tool_calls
            .iter()
            .map(|call| OpenAiToolCall {
                id: call.tool_call_id.clone(),
                kind: function_kind(),
                function: OpenAiFunctionCall {
                    name: call.tool_name.clone(),
                    arguments: Value::String(call.args.to_string()),
                },
            })
            .collect();
        let tool_call_id = msg.metadata.as_ref().and_then(|m| m.tool_call_id.clone());

        messages.push(OpenAiMessage {
            role,
            content: msg.content_text(),
            tool_calls,
            tool_call_id,
        });
    }
    messages
}

fn to_openai_tools(tools: &[ToolSchema]) -> Vec<OpenAiTool<'_>> {
    tools
        .iter()
        .map(|tool| OpenAiTool {
            kind: "function",
            function: OpenAiFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        })
        .collect()
}

fn parse_arguments(raw: Value) -> Value {
    match raw {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

/// Reasoning models served through Ollama prefix answers with `<think>` blocks.
fn strip_think(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

fn from_choice(message: ChoiceMessage) -> AgentMessage {
    let text = strip_think(message.content.as_deref().unwrap_or_default());
    let calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let invocation =
                ToolInvocation::new(call.function.name, parse_arguments(call.function.arguments));
            match call.id {
                Some(id) => invocation.with_call_id(id),
                None => invocation,
            }
        })
        .collect();
    AgentMessage::assistant_with_tools(text, calls)
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
        let messages = to_openai_messages(&request);
        let body = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            tools: to_openai_tools(&request.tools),
        };

        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = body.tools.len(),
            "chat completion request"
        );

        let mut call = self.client.post(self.config.url()).json(&body);
        if let Some(key) = &self.config.api_key {
            call = call.bearer_auth(key);
        }
        let response = call.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %error_text, "chat completion failed");
            anyhow::bail!("chat completion error: {status} - {error_text}");
        }

        let data: ChatResponse = response.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("chat completion response missing choices"))?;

        Ok(LlmResponse {
            message: from_choice(choice.message),
        })
    }
}
