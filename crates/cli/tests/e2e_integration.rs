//! End-to-end integration tests for the Toolwright agent.
//!
//! These tests exercise the full pipeline from user request to final answer:
//! the provider-backed model gateway, the currency tool, the decision loop
//! and the reflection loop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use toolwright_agent::{
    Acceptance, Agent, DecisionState, FailureReason, ForcedReason, RunStage,
};
use toolwright_config::{AgentConfig, AppConfig};
use toolwright_core::conversation::{TurnContent, TurnRole};
use toolwright_core::error::{ProviderError, ToolError};
use toolwright_core::event::{DomainEvent, EventBus};
use toolwright_core::message::{Message, MessageToolCall};
use toolwright_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use toolwright_core::tool::{ToolOutcome, ToolRegistry};
use toolwright_providers::ProviderGateway;
use toolwright_tools::{StaticRates, registry_with_rates};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A provider that replays scripted replies in sequence and records every
/// request it receives.
struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("script exhausted".into()))
    }
}

fn response(message: Message) -> ProviderResponse {
    ProviderResponse {
        message,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

fn text_response(text: &str) -> ProviderResponse {
    response(Message::assistant(text))
}

fn tool_response(id: &str, name: &str, args: serde_json::Value) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = vec![MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }];
    response(message)
}

fn convert_usd_eur(id: &str, amount: f64) -> ProviderResponse {
    tool_response(
        id,
        "convert_currency",
        serde_json::json!({"amount": amount, "from_currency": "USD", "to_currency": "EUR"}),
    )
}

fn critique_response(requires_changes: bool, reflection: &str) -> ProviderResponse {
    text_response(
        &serde_json::json!({
            "requires_changes": requires_changes,
            "reflection": reflection,
            "suggestions": [],
        })
        .to_string(),
    )
}

fn registry() -> Arc<ToolRegistry> {
    Arc::new(registry_with_rates(StaticRates::new().with_rate("USD", "EUR", 0.925)).unwrap())
}

fn agent_config(max_tool_iterations: u32, max_revisions: u32) -> AgentConfig {
    AgentConfig {
        max_tool_iterations,
        max_revisions,
        retry_backoff_ms: 1,
        max_backoff_ms: 1,
        ..AgentConfig::default()
    }
}

fn agent(provider: Arc<ScriptedProvider>, config: &AgentConfig, reflect: bool) -> Agent {
    let gateway = ProviderGateway::new(provider, "mock");
    Agent::with_settings(Arc::new(gateway), registry(), config, reflect)
}

// ── Scenario A: one tool round-trip, then an approved answer ─────────────

#[tokio::test]
async fn e2e_currency_conversion_round_trip() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        convert_usd_eur("call_1", 100.0),
        text_response("100 USD is approximately 92.50 EUR"),
        critique_response(false, "The figure matches the tool result."),
    ]));
    let agent = agent(provider.clone(), &agent_config(8, 2), true);

    let outcome = agent.run("Convert 100 USD to EUR").await.unwrap();

    assert_eq!(outcome.answer, "100 USD is approximately 92.50 EUR");
    assert_eq!(outcome.acceptance, Acceptance::Approved);
    assert_eq!(outcome.tool_round_trips, 1);
    assert_eq!(
        outcome.decision_transitions,
        vec![
            DecisionState::AwaitingDecision,
            DecisionState::ExecutingTool,
            DecisionState::AwaitingDecision,
            DecisionState::Done,
        ]
    );
    assert_eq!(provider.calls(), 3);

    // user, tool call, tool result, agent answer
    let turns = outcome.conversation.turns();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[3].role(), TurnRole::Agent);
    let TurnContent::ToolResult { result } = turns[2].content() else {
        panic!("expected a tool result turn");
    };
    let ToolOutcome::Success { value } = &result.outcome else {
        panic!("expected a successful conversion");
    };
    assert_eq!(value["converted"], 92.5);

    // The second decision sees the tool result; the critique asks for JSON.
    let requests = provider.requests();
    assert!(requests[1].messages.iter().any(|m| m.content.contains("92.5")));
    assert!(!requests[1].tools.is_empty());
    assert!(requests[2].json_mode);
    assert!(requests[2].tools.is_empty());
}

// ── Scenario B: unknown tool fails without retry ─────────────────────────

#[tokio::test]
async fn e2e_unknown_tool_fails_fast() {
    let provider = Arc::new(ScriptedProvider::new(vec![tool_response(
        "call_1",
        "weather_lookup",
        serde_json::json!({"city": "Paris"}),
    )]));
    let agent = agent(provider.clone(), &agent_config(8, 2), true);

    let failure = agent.run("What's the weather in Paris?").await.unwrap_err();

    assert_eq!(failure.stage, RunStage::Decision);
    assert!(matches!(
        &failure.reason,
        FailureReason::Tool(ToolError::UnknownTool { name, .. }) if name == "weather_lookup"
    ));
    assert!(!failure.reason.is_limit());
    assert_eq!(provider.calls(), 1);
}

// ── Scenario C: the tool iteration cap ───────────────────────────────────

#[tokio::test]
async fn e2e_iteration_limit_stops_endless_tool_calls() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        convert_usd_eur("call_1", 1.0),
        convert_usd_eur("call_2", 2.0),
        convert_usd_eur("call_3", 3.0),
        convert_usd_eur("call_4", 4.0),
    ]));
    let agent = agent(provider.clone(), &agent_config(2, 2), true);

    let failure = agent.run("Keep converting").await.unwrap_err();

    assert_eq!(
        failure.reason,
        FailureReason::IterationLimitExceeded { limit: 2 }
    );
    assert!(failure.reason.is_limit());
    // Two executed calls, then the third decision trips the cap.
    assert_eq!(provider.calls(), 3);
    let results = failure
        .conversation
        .turns()
        .iter()
        .filter(|t| matches!(t.content(), TurnContent::ToolResult { .. }))
        .count();
    assert_eq!(results, 2);
}

// ── Scenario D: forced acceptance after the revision cap ─────────────────

#[tokio::test]
async fn e2e_reflection_forces_acceptance_at_revision_cap() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Exchange rates float."),
        critique_response(true, "Explain what drives them."),
        text_response("Exchange rates float with supply and demand."),
        critique_response(true, "Mention central banks."),
    ]));
    let agent = agent(provider.clone(), &agent_config(8, 1), true);

    let outcome = agent.run("Why do exchange rates change?").await.unwrap();

    assert_eq!(outcome.answer, "Exchange rates float with supply and demand.");
    assert_eq!(
        outcome.acceptance,
        Acceptance::Forced(ForcedReason::RevisionLimit)
    );
    assert!(outcome.is_forced());
    assert_eq!(outcome.revisions, 1);
    assert_eq!(provider.calls(), 4);
}

// ── Malformed replies are retried, then succeed ──────────────────────────

#[tokio::test]
async fn e2e_malformed_decision_is_retried() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response(r#"{"thought": "no action here"}"#),
        text_response("Paris"),
    ]));
    let agent = agent(provider.clone(), &agent_config(8, 2), false);

    let outcome = agent.run("Capital of France?").await.unwrap();
    assert_eq!(outcome.answer, "Paris");
    assert_eq!(outcome.acceptance, Acceptance::Skipped);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn e2e_persistent_provider_outage_fails_run() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let agent = agent(provider.clone(), &agent_config(8, 2), true);

    let failure = agent.run("Anything").await.unwrap_err();
    assert!(matches!(
        failure.reason,
        FailureReason::GatewayUnavailable { attempts: 3, .. }
    ));
    assert_eq!(provider.calls(), 3);
}

// ── Config-driven wiring ─────────────────────────────────────────────────

#[tokio::test]
async fn e2e_agent_built_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[agent]
max_tool_iterations = 1

[reflection]
enabled = false
"#,
    )
    .unwrap();
    let config = AppConfig::load_from(&path).unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        convert_usd_eur("call_1", 10.0),
        text_response("10 USD is approximately 9.25 EUR"),
    ]));
    let gateway = ProviderGateway::new(provider, "mock");
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let agent = Agent::from_config(Arc::new(gateway), registry(), &config).with_event_bus(bus);
    assert!(!agent.reflection_enabled());

    let outcome = agent.run("Convert 10 USD to EUR").await.unwrap();
    assert_eq!(outcome.acceptance, Acceptance::Skipped);
    assert_eq!(outcome.tool_round_trips, 1);

    let mut tools_run = 0;
    let mut finished = false;
    while let Ok(event) = rx.try_recv() {
        match &*event {
            DomainEvent::ToolExecuted { success, .. } => {
                assert!(*success);
                tools_run += 1;
            }
            DomainEvent::RunFinished { success, .. } => finished = *success,
            _ => {}
        }
    }
    assert_eq!(tools_run, 1);
    assert!(finished);
}
