//! The conversation orchestrator: a bounded three-state machine per turn.
//!
//! ```text
//!             user message appended
//!                      |
//!                      v
//!   +--------->  AwaitModel  ----- no tool calls ----->  Done
//!   |                  |
//!   |             tool calls
//!   |                  v
//!   +------  AwaitToolResults
//! ```
//!
//! Every `AwaitToolResults -> AwaitModel` edge is one round trip. A turn that
//! would need more than `max_round_trips` of them fails with
//! [`TurnError::TurnBudgetExceeded`]. A failed turn is rolled back, so the
//! session keeps exactly the history it had before the query.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use diabetes_core::{
    AgentMessage, AgentState, LanguageModel, LlmRequest, MessageRole, SessionId, SessionStore,
    ToolError, ToolInvocation, ToolRegistry, ToolResult,
};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;

use crate::config::AgentConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratorState {
    AwaitModel,
    AwaitToolResults,
    Done,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorState::AwaitModel => "AWAIT_MODEL",
            OrchestratorState::AwaitToolResults => "AWAIT_TOOL_RESULTS",
            OrchestratorState::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("no final answer after {limit} tool round trips")]
    TurnBudgetExceeded { limit: usize },

    #[error("language model did not respond within {elapsed:?}")]
    ModelTimeout { elapsed: Duration },

    #[error("language model call failed: {0:#}")]
    Model(anyhow::Error),

    #[error("session unavailable: {0:#}")]
    Session(anyhow::Error),
}

/// Result of one completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final assistant text.
    pub answer: String,
    /// States visited, starting with `AwaitModel` and ending with `Done`.
    pub transitions: Vec<OrchestratorState>,
    /// Messages this turn appended: the user query, every assistant and tool
    /// message, and the final answer.
    pub trace: Vec<AgentMessage>,
    pub round_trips: usize,
}

impl TurnOutcome {
    /// Each invocation made during the turn, paired with its tool-role result.
    pub fn tool_calls(&self) -> Vec<(&ToolInvocation, Option<&AgentMessage>)> {
        let results: Vec<&AgentMessage> = self
            .trace
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .collect();
        self.trace
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .map(|call| {
                let result = results.iter().copied().find(|r| {
                    r.metadata.as_ref().and_then(|meta| meta.tool_call_id.as_ref())
                        == call.tool_call_id.as_ref()
                });
                (call, result)
            })
            .collect()
    }
}

/// Tool-augmented conversational agent for diabetes risk questions.
#[derive(Clone)]
pub struct DiabetesAgent {
    llm: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl DiabetesAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, registry: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            llm,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one turn on `state`. On success the state holds the whole turn; on
    /// failure it is left as it was before the call.
    #[tracing::instrument(skip_all, fields(turn = state.turn_count() + 1))]
    pub async fn run_turn(
        &self,
        state: &mut AgentState,
        query: impl Into<String> + Send,
    ) -> Result<TurnOutcome, TurnError> {
        let start = state.len();
        state.push(AgentMessage::user(query));

        match self.drive(state).await {
            Ok((answer, transitions, round_trips)) => {
                state.record_turn();
                Ok(TurnOutcome {
                    answer,
                    transitions,
                    trace: state.since(start).to_vec(),
                    round_trips,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "turn failed; rolling back");
                state.rollback_to(start);
                Err(err)
            }
        }
    }

    /// Run a turn against prior history and return the updated state.
    pub async fn run_with_history(
        &self,
        history: Vec<AgentMessage>,
        query: impl Into<String> + Send,
    ) -> Result<(TurnOutcome, AgentState), TurnError> {
        let mut state = AgentState::with_history(history);
        let outcome = self.run_turn(&mut state, query).await?;
        Ok((outcome, state))
    }

    /// Run a turn with exclusive access to a stored session.
    pub async fn run_session_turn(
        &self,
        store: &dyn SessionStore,
        session_id: &SessionId,
        query: impl Into<String> + Send,
    ) -> Result<TurnOutcome, TurnError> {
        let mut guard = store
            .acquire(session_id)
            .await
            .map_err(TurnError::Session)?;
        self.run_turn(&mut guard, query).await
    }

    async fn drive(
        &self,
        state: &mut AgentState,
    ) -> Result<(String, Vec<OrchestratorState>, usize), TurnError> {
        let limit = self.config.max_round_trips.get();
        let mut current = OrchestratorState::AwaitModel;
        let mut transitions = vec![current];
        let mut round_trips = 0usize;
        let mut pending: Vec<ToolInvocation> = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut answer = String::new();

        loop {
            current = match current {
                OrchestratorState::AwaitModel => {
                    let mut reply = self.call_model(state).await?;
                    reply.role = MessageRole::Assistant;
                    if reply.has_tool_calls() {
                        if round_trips == limit {
                            return Err(TurnError::TurnBudgetExceeded { limit });
                        }
                        assign_call_ids(&mut reply.tool_calls, &mut seen_ids);
                        pending = reply.tool_calls.clone();
                        state.push(reply);
                        OrchestratorState::AwaitToolResults
                    } else {
                        answer = reply.content_text();
                        state.push(reply);
                        OrchestratorState::Done
                    }
                }
                OrchestratorState::AwaitToolResults => {
                    let results = self.dispatch_all(std::mem::take(&mut pending)).await;
                    state.extend(results.into_iter().map(ToolResult::into_message));
                    round_trips += 1;
                    OrchestratorState::AwaitModel
                }
                OrchestratorState::Done => break,
            };
            tracing::debug!(state = %current, round_trips, "transition");
            transitions.push(current);
        }

        Ok((answer, transitions, round_trips))
    }

    async fn call_model(&self, state: &AgentState) -> Result<AgentMessage, TurnError> {
        let request = LlmRequest::new(self.config.system_prompt.clone(), state.messages().to_vec())
            .with_tools(self.registry.schemas());
        let timeout = self.config.model_timeout;
        match tokio::time::timeout(timeout, self.llm.generate(request)).await {
            Ok(Ok(response)) => Ok(response.message),
            Ok(Err(err)) => Err(TurnError::Model(err)),
            Err(_) => Err(TurnError::ModelTimeout { elapsed: timeout }),
        }
    }

    /// Dispatch concurrently; results come back in invocation order.
    async fn dispatch_all(&self, calls: Vec<ToolInvocation>) -> Vec<ToolResult> {
        let timeout = self.config.tool_timeout;
        let dispatches = calls.into_iter().map(|call| async move {
            match tokio::time::timeout(timeout, self.registry.dispatch(call.clone())).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(tool = %call.tool_name, ?timeout, "tool call timed out");
                    let err = ToolError::Timeout {
                        tool: call.tool_name.clone(),
                        elapsed: timeout,
                    };
                    ToolResult::failure(&call, err)
                }
            }
        });
        join_all(dispatches).await
    }
}

/// Tool results are matched to invocations by id, so every invocation in a
/// turn needs a distinct one. Missing, empty and repeated ids are replaced.
fn assign_call_ids(calls: &mut [ToolInvocation], seen: &mut HashSet<String>) {
    for call in calls.iter_mut() {
        let keep = match call.tool_call_id.as_deref() {
            Some(id) if !id.is_empty() => seen.insert(id.to_string()),
            _ => false,
        };
        if !keep {
            let id = format!("call_{}", uuid::Uuid::new_v4().simple());
            seen.insert(id.clone());
            call.tool_call_id = Some(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use diabetes_core::{LlmResponse, MessageContent, Tool, ToolSchema};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    /// Replays canned responses and records every request it receives.
    struct ScriptedModel {
        script: Mutex<VecDeque<AgentMessage>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedModel {
        fn new(script: Vec<AgentMessage>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
            self.requests.lock().unwrap().push(request);
            let message = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
            Ok(LlmResponse { message })
        }
    }

    /// Requests the same tool forever.
    struct ToolLoopModel;

    #[async_trait]
    impl LanguageModel for ToolLoopModel {
        async fn generate(&self, _request: LlmRequest) -> anyhow::Result<LlmResponse> {
            Ok(LlmResponse {
                message: AgentMessage::assistant_with_tools(
                    "",
                    vec![ToolInvocation::new("echo", json!({"again": true}))],
                ),
            })
        }
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn generate(&self, _request: LlmRequest) -> anyhow::Result<LlmResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(LlmResponse {
                message: AgentMessage::assistant("late"),
            })
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::no_params("echo", "Echoes its arguments")
        }

        async fn execute(&self, args: Value) -> Result<Value, ToolError> {
            Ok(args)
        }
    }

    /// Sleeps for `args.ms` before answering, to scramble completion order.
    struct DelayTool;

    #[async_trait]
    impl Tool for DelayTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::no_params("delay", "Answers after a delay")
        }

        async fn execute(&self, args: Value) -> Result<Value, ToolError> {
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!({ "slept": ms }))
        }
    }

    fn agent(llm: Arc<dyn LanguageModel>, config: AgentConfig) -> DiabetesAgent {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(DelayTool));
        DiabetesAgent::new(llm, Arc::new(registry), config)
    }

    fn tool_payload(message: &AgentMessage) -> &Value {
        match &message.content {
            MessageContent::Json(value) => value,
            other => panic!("expected JSON tool content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_answer_goes_straight_to_done() {
        let llm = ScriptedModel::new(vec![AgentMessage::assistant("Hello!")]);
        let agent = agent(llm.clone(), AgentConfig::default());
        let mut state = AgentState::new();

        let outcome = agent.run_turn(&mut state, "hi").await.unwrap();
        assert_eq!(outcome.answer, "Hello!");
        assert_eq!(
            outcome.transitions,
            vec![OrchestratorState::AwaitModel, OrchestratorState::Done]
        );
        assert_eq!(outcome.round_trips, 0);
        assert_eq!(state.len(), 2);
        assert_eq!(state.turn_count(), 1);
        assert_eq!(llm.request_count(), 1);
    }

    #[tokio::test]
    async fn model_sees_tools_and_full_history() {
        let llm = ScriptedModel::new(vec![
            AgentMessage::assistant("first"),
            AgentMessage::assistant("second"),
        ]);
        let agent = agent(llm.clone(), AgentConfig::default());
        let mut state = AgentState::new();
        agent.run_turn(&mut state, "one").await.unwrap();
        agent.run_turn(&mut state, "two").await.unwrap();

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(requests[1].tools.len(), 2);
        assert_eq!(state.turn_count(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_message_and_turn_continues() {
        let llm = ScriptedModel::new(vec![
            AgentMessage::assistant_with_tools(
                "",
                vec![ToolInvocation::new("launch_rocket", json!({}))],
            ),
            AgentMessage::assistant("I cannot do that."),
            AgentMessage::assistant("Anything else?"),
        ]);
        let agent = agent(llm, AgentConfig::default());
        let mut state = AgentState::new();

        let outcome = agent.run_turn(&mut state, "launch").await.unwrap();
        assert_eq!(outcome.answer, "I cannot do that.");
        let tool_message = &outcome.trace[2];
        assert_eq!(tool_message.role, MessageRole::Tool);
        assert_eq!(tool_payload(tool_message)["error"]["kind"], "unknown_tool");

        let next = agent.run_turn(&mut state, "never mind").await.unwrap();
        assert_eq!(next.answer, "Anything else?");
        assert_eq!(state.len(), 6);
    }

    #[tokio::test]
    async fn always_calling_tools_hits_the_budget() {
        let config =
            AgentConfig::default().with_max_round_trips(NonZeroUsize::new(3).unwrap());
        let agent = agent(Arc::new(ToolLoopModel), config);
        let mut state = AgentState::with_history(vec![
            AgentMessage::user("earlier"),
            AgentMessage::assistant("reply"),
        ]);

        let err = agent.run_turn(&mut state, "loop forever").await.unwrap_err();
        assert!(matches!(err, TurnError::TurnBudgetExceeded { limit: 3 }));
        assert_eq!(state.len(), 2, "failed turn is rolled back");
        assert_eq!(state.turn_count(), 0);
    }

    #[tokio::test]
    async fn session_survives_budget_failure() {
        let llm = ScriptedModel::new(vec![
            AgentMessage::assistant_with_tools("", vec![ToolInvocation::new("echo", json!({}))]),
            AgentMessage::assistant_with_tools("", vec![ToolInvocation::new("echo", json!({}))]),
            AgentMessage::assistant("recovered"),
        ]);
        let config =
            AgentConfig::default().with_max_round_trips(NonZeroUsize::new(1).unwrap());
        let agent = agent(llm, config);
        let mut state = AgentState::new();

        assert!(agent.run_turn(&mut state, "first").await.is_err());
        let outcome = agent.run_turn(&mut state, "second").await.unwrap();
        assert_eq!(outcome.answer, "recovered");
        assert_eq!(state.messages()[0].content_text(), "second");
    }

    #[tokio::test]
    async fn parallel_results_keep_invocation_order() {
        let llm = ScriptedModel::new(vec![
            AgentMessage::assistant_with_tools(
                "",
                vec![
                    ToolInvocation::new("delay", json!({"ms": 40})).with_call_id("a"),
                    ToolInvocation::new("delay", json!({"ms": 1})).with_call_id("b"),
                    ToolInvocation::new("echo", json!({"n": 3})).with_call_id("c"),
                ],
            ),
            AgentMessage::assistant("done"),
        ]);
        let agent = agent(llm, AgentConfig::default());
        let mut state = AgentState::new();

        let outcome = agent.run_turn(&mut state, "go").await.unwrap();
        let ids: Vec<_> = outcome
            .trace
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .map(|m| m.metadata.as_ref().unwrap().tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);

        let pairs = outcome.tool_calls();
        assert_eq!(pairs.len(), 3);
        assert_eq!(tool_payload(pairs[0].1.unwrap())["slept"], 40);
    }

    #[tokio::test]
    async fn missing_call_ids_are_assigned() {
        let llm = ScriptedModel::new(vec![
            AgentMessage::assistant_with_tools("", vec![ToolInvocation::new("echo", json!({}))]),
            AgentMessage::assistant("ok"),
        ]);
        let agent = agent(llm, AgentConfig::default());
        let outcome = agent.run_turn(&mut AgentState::new(), "go").await.unwrap();
        let (call, result) = outcome.tool_calls()[0];
        assert!(call.tool_call_id.as_deref().unwrap().starts_with("call_"));
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn empty_and_repeated_call_ids_are_replaced() {
        let llm = ScriptedModel::new(vec![
            AgentMessage::assistant_with_tools(
                "",
                vec![
                    ToolInvocation::new("echo", json!({"n": 1})).with_call_id(""),
                    ToolInvocation::new("echo", json!({"n": 2})).with_call_id(""),
                    ToolInvocation::new("echo", json!({"n": 3})).with_call_id("call_0"),
                ],
            ),
            AgentMessage::assistant_with_tools(
                "",
                vec![ToolInvocation::new("echo", json!({"n": 4})).with_call_id("call_0")],
            ),
            AgentMessage::assistant("done"),
        ]);
        let agent = agent(llm.clone(), AgentConfig::default());
        let outcome = agent.run_turn(&mut AgentState::new(), "go").await.unwrap();

        let pairs = outcome.tool_calls();
        assert_eq!(pairs.len(), 4);
        for &(call, result) in &pairs {
            let result = result.expect("every call has a result");
            assert_eq!(tool_payload(result)["n"], call.args["n"]);
        }
        let ids: HashSet<_> = pairs.iter().map(|(c, _)| c.tool_call_id.clone()).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(pairs[2].0.tool_call_id.as_deref(), Some("call_0"));

        // The model is shown the rewritten ids, not the duplicates it sent.
        let requests = llm.requests.lock().unwrap();
        let sent: Vec<_> = requests[2]
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .map(|m| m.metadata.as_ref().unwrap().tool_call_id.clone())
            .collect();
        assert_eq!(sent.iter().collect::<HashSet<_>>().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn tool_timeout_is_reported_to_the_model() {
        let llm = ScriptedModel::new(vec![
            AgentMessage::assistant_with_tools(
                "",
                vec![ToolInvocation::new("delay", json!({"ms": 60_000}))],
            ),
            AgentMessage::assistant("the tool was too slow"),
        ]);
        let config = AgentConfig::default().with_tool_timeout(Duration::from_millis(100));
        let agent = agent(llm, config);

        let outcome = agent.run_turn(&mut AgentState::new(), "go").await.unwrap();
        assert_eq!(tool_payload(&outcome.trace[2])["error"]["kind"], "timeout");
        assert_eq!(outcome.answer, "the tool was too slow");
    }

    #[tokio::test(start_paused = true)]
    async fn model_timeout_fails_the_turn() {
        let config = AgentConfig::default().with_model_timeout(Duration::from_secs(1));
        let agent = agent(Arc::new(SlowModel), config);
        let mut state = AgentState::new();

        let err = agent.run_turn(&mut state, "hello?").await.unwrap_err();
        assert!(matches!(err, TurnError::ModelTimeout { .. }));
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn session_turns_use_the_store() {
        let store = diabetes_core::InMemorySessionStore::new();
        let session = store.create_session().await.unwrap();
        let llm = ScriptedModel::new(vec![AgentMessage::assistant("hi")]);
        let agent = agent(llm, AgentConfig::default());

        agent.run_session_turn(&store, &session.id, "hello").await.unwrap();
        assert_eq!(store.acquire(&session.id).await.unwrap().len(), 2);

        let missing = agent
            .run_session_turn(&store, &"nope".to_string(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(missing, TurnError::Session(_)));
    }
}
