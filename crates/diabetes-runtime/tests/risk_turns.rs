//! Full turns against the real diabetes tools, with a language model that
//! follows a fixed policy instead of a network call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use diabetes_core::{
    AgentMessage, AgentState, InMemorySessionStore, LanguageModel, LlmRequest, LlmResponse,
    MessageRole, SessionStore, ToolInvocation,
};
use diabetes_model::{Forest, LoadedModel};
use diabetes_runtime::{DiabetesAgentBuilder, OrchestratorState, TurnError};
use serde_json::{json, Value};

const FOREST: &str = r#"{
    "feature_names": ["age", "bmi", "diabetes_pedigree_function"],
    "classes": [0, 1],
    "trees": [
        { "nodes": [
            { "feature": 1, "threshold": 29.95, "left": 1, "right": 2, "cover": 100 },
            { "feature": 0, "threshold": 40.5, "left": 3, "right": 4, "cover": 60 },
            { "feature": 0, "threshold": 30.5, "left": 5, "right": 6, "cover": 40 },
            { "value": [45, 5], "cover": 50 },
            { "value": [4, 6], "cover": 10 },
            { "value": [12, 8], "cover": 20 },
            { "value": [3, 17], "cover": 20 }
        ] },
        { "nodes": [
            { "feature": 2, "threshold": 0.55, "left": 1, "right": 2, "cover": 100 },
            { "value": [56, 14], "cover": 70 },
            { "feature": 1, "threshold": 27.0, "left": 3, "right": 4, "cover": 30 },
            { "value": [8, 4], "cover": 12 },
            { "value": [3, 15], "cover": 18 }
        ] }
    ]
}"#;

fn loaded_model() -> LoadedModel {
    LoadedModel::from_forest(Forest::from_json_str(FOREST).unwrap())
}

/// Calls `tool` with `args` on a fresh user message, then summarises the
/// tool result it gets back.
struct PolicyModel {
    tool: &'static str,
    args: Value,
    calls: AtomicUsize,
}

impl PolicyModel {
    fn new(tool: &'static str, args: Value) -> Arc<Self> {
        Arc::new(Self {
            tool,
            args,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LanguageModel for PolicyModel {
    async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.tools.iter().any(|t| t.name == self.tool));

        let last = request
            .messages
            .last()
            .ok_or_else(|| anyhow::anyhow!("empty conversation"))?;
        let message = match last.role {
            MessageRole::User => AgentMessage::assistant_with_tools(
                "",
                vec![ToolInvocation::new(self.tool, self.args.clone())],
            ),
            _ => {
                let result: Value = serde_json::from_str(&last.content_text())?;
                if let Some(error) = result.get("error") {
                    AgentMessage::assistant(format!(
                        "I could not compute a risk: {}",
                        error["message"].as_str().unwrap_or_default()
                    ))
                } else {
                    AgentMessage::assistant(format!(
                        "The estimated probability of diabetes is {}.",
                        result["probability"]
                    ))
                }
            }
        };
        Ok(LlmResponse { message })
    }
}

#[tokio::test]
async fn prediction_query_takes_one_round_trip() {
    let model = loaded_model();
    let llm = PolicyModel::new(
        "predict_risk",
        json!({"age": 45, "bmi": 28, "diabetes_pedigree_function": 0.5}),
    );
    let agent = DiabetesAgentBuilder::new()
        .with_model(llm.clone())
        .with_risk_model(&model)
        .build()
        .unwrap();

    let mut state = AgentState::new();
    let outcome = agent
        .run_turn(&mut state, "predict diabetes risk for age 45, BMI 28, pedigree 0.5")
        .await
        .unwrap();

    assert_eq!(
        outcome.transitions,
        vec![
            OrchestratorState::AwaitModel,
            OrchestratorState::AwaitToolResults,
            OrchestratorState::AwaitModel,
            OrchestratorState::Done,
        ]
    );
    assert_eq!(outcome.tool_calls().len(), 1);
    assert_eq!(outcome.answer, "The estimated probability of diabetes is 0.4.");
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.len(), 4);
}

#[tokio::test]
async fn invalid_feature_reaches_the_model_as_tool_error() {
    let llm = PolicyModel::new(
        "predict_risk",
        json!({"age": -1, "bmi": 28, "diabetes_pedigree_function": 0.5}),
    );
    let agent = DiabetesAgentBuilder::new()
        .with_model(llm)
        .with_risk_model(&loaded_model())
        .build()
        .unwrap();

    let outcome = agent
        .run_turn(&mut AgentState::new(), "risk for age -1?")
        .await
        .unwrap();
    let (_, result) = outcome.tool_calls()[0];
    let payload: Value = serde_json::from_str(&result.unwrap().content_text()).unwrap();
    assert_eq!(payload["error"]["kind"], "invalid_feature");
    assert!(outcome.answer.contains("\"age\""));
}

#[tokio::test]
async fn combined_tool_explains_positive_subject() {
    let llm = PolicyModel::new(
        "predict_and_explain",
        json!({"age": 55, "bmi": 35, "diabetes_pedigree_function": 0.9}),
    );
    let agent = DiabetesAgentBuilder::new()
        .with_model(llm)
        .with_risk_model(&loaded_model())
        .build()
        .unwrap();

    let outcome = agent
        .run_turn(&mut AgentState::new(), "explain the risk for 55, 35, 0.9")
        .await
        .unwrap();
    let (_, result) = outcome.tool_calls()[0];
    let payload: Value = serde_json::from_str(&result.unwrap().content_text()).unwrap();
    assert_eq!(payload["prediction"], 1);
    assert_eq!(payload["risk_band"], "high");

    let explanation = payload["explanation"].as_object().unwrap();
    let total: f64 = explanation.values().map(|v| v.as_f64().unwrap()).sum();
    let base = payload["base_value"].as_f64().unwrap();
    assert!((base + total - 0.841_666_666_666_666_7).abs() < 1e-9);
}

#[tokio::test]
async fn budget_failure_leaves_session_usable() {
    /// Keeps asking for guidelines until it has seen three tool results.
    struct Stubborn;

    #[async_trait]
    impl LanguageModel for Stubborn {
        async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
            let seen = request
                .messages
                .iter()
                .filter(|m| m.role == MessageRole::Tool)
                .count();
            let message = if seen < 3 {
                AgentMessage::assistant_with_tools(
                    "",
                    vec![ToolInvocation::new("get_guidelines", json!({}))],
                )
            } else {
                AgentMessage::assistant("Here are the guidelines.")
            };
            Ok(LlmResponse { message })
        }
    }

    let store = InMemorySessionStore::new();
    let session = store.create_session().await.unwrap();
    let tight = DiabetesAgentBuilder::new()
        .with_model(Arc::new(Stubborn))
        .with_risk_model(&loaded_model())
        .with_max_round_trips(2)
        .build()
        .unwrap();

    let err = tight
        .run_session_turn(&store, &session.id, "guidelines please")
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::TurnBudgetExceeded { limit: 2 }));
    assert!(store.acquire(&session.id).await.unwrap().is_empty());

    let roomy = DiabetesAgentBuilder::new()
        .with_model(Arc::new(Stubborn))
        .with_risk_model(&loaded_model())
        .build()
        .unwrap();
    let outcome = roomy
        .run_session_turn(&store, &session.id, "guidelines please")
        .await
        .unwrap();
    assert_eq!(outcome.round_trips, 3);
    assert_eq!(outcome.answer, "Here are the guidelines.");
}
