//! Shared test helpers for loop and run tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use toolwright_core::error::GatewayError;
use toolwright_core::gateway::{
    Critique, CritiqueRequest, Decision, DecisionRequest, ModelGateway, RevisionRequest,
};
use toolwright_core::tool::{
    ExecutionFailure, ParameterSchema, ToolExecutor, ToolInvocation, ToolSpec,
};

type Script<T> = Mutex<VecDeque<Result<T, GatewayError>>>;

/// A gateway that replays scripted replies, one per call, in order.
///
/// Each method has its own queue. An empty queue answers
/// `Unavailable("script exhausted")`.
#[derive(Default)]
pub struct ScriptedGateway {
    decisions: Script<Decision>,
    critiques: Script<Critique>,
    revisions: Script<String>,
    decide_delay: Option<Duration>,
    critique_delay: Option<Duration>,
    decide_calls: AtomicUsize,
    critique_calls: AtomicUsize,
    revise_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(self, items: impl IntoIterator<Item = Decision>) -> Self {
        push(&self.decisions, items.into_iter().map(Ok));
        self
    }

    pub fn decide_errors(self, items: impl IntoIterator<Item = GatewayError>) -> Self {
        push(&self.decisions, items.into_iter().map(Err));
        self
    }

    pub fn critiques(self, items: impl IntoIterator<Item = Critique>) -> Self {
        push(&self.critiques, items.into_iter().map(Ok));
        self
    }

    pub fn critique_errors(self, items: impl IntoIterator<Item = GatewayError>) -> Self {
        push(&self.critiques, items.into_iter().map(Err));
        self
    }

    pub fn revisions<S: Into<String>>(self, items: impl IntoIterator<Item = S>) -> Self {
        push(&self.revisions, items.into_iter().map(|s| Ok(s.into())));
        self
    }

    /// Every `decide` sleeps this long before answering.
    pub fn with_decide_delay(mut self, delay: Duration) -> Self {
        self.decide_delay = Some(delay);
        self
    }

    /// Every `critique` sleeps this long before answering.
    pub fn with_critique_delay(mut self, delay: Duration) -> Self {
        self.critique_delay = Some(delay);
        self
    }

    pub fn decide_calls(&self) -> usize {
        self.decide_calls.load(Ordering::SeqCst)
    }

    pub fn critique_calls(&self) -> usize {
        self.critique_calls.load(Ordering::SeqCst)
    }

    pub fn revise_calls(&self) -> usize {
        self.revise_calls.load(Ordering::SeqCst)
    }
}

fn push<T>(script: &Script<T>, items: impl Iterator<Item = Result<T, GatewayError>>) {
    script.lock().unwrap().extend(items);
}

fn next<T>(script: &Script<T>) -> Result<T, GatewayError> {
    script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(GatewayError::unavailable("script exhausted")))
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, GatewayError> {
        assert!(!request.context.is_empty(), "decide called with empty context");
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.decide_delay {
            tokio::time::sleep(delay).await;
        }
        next(&self.decisions)
    }

    async fn critique(&self, _request: CritiqueRequest<'_>) -> Result<Critique, GatewayError> {
        self.critique_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.critique_delay {
            tokio::time::sleep(delay).await;
        }
        next(&self.critiques)
    }

    async fn revise(&self, _request: RevisionRequest<'_>) -> Result<String, GatewayError> {
        self.revise_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.revisions)
    }
}

static CALL_IDS: AtomicUsize = AtomicUsize::new(1);

/// A tool-call decision with a fresh call id.
pub fn tool_call(name: &str, arguments: Value) -> Decision {
    let arguments = match arguments {
        Value::Object(map) => map,
        other => panic!("tool arguments must be an object, got {other}"),
    };
    let id = CALL_IDS.fetch_add(1, Ordering::SeqCst);
    Decision::ToolCall {
        invocation: ToolInvocation::new(format!("call_{id}"), name, arguments),
    }
}

pub fn final_answer(text: &str) -> Decision {
    Decision::FinalAnswer { text: text.into() }
}

pub fn approve(reflection: &str) -> Critique {
    Critique {
        requires_changes: false,
        reflection: reflection.into(),
        suggestions: Vec::new(),
    }
}

pub fn reject(reflection: &str) -> Critique {
    Critique {
        requires_changes: true,
        reflection: reflection.into(),
        suggestions: vec![format!("address: {reflection}")],
    }
}

struct SlowTool(Duration);

#[async_trait]
impl ToolExecutor for SlowTool {
    async fn execute(&self, _arguments: &Map<String, Value>) -> Result<Value, ExecutionFailure> {
        tokio::time::sleep(self.0).await;
        Ok(Value::String("finally".into()))
    }
}

/// A parameterless tool that sleeps for `delay` before answering.
pub fn slow_tool(name: &str, delay: Duration) -> ToolSpec {
    ToolSpec::new(
        name,
        "Sleeps, then answers",
        ParameterSchema::new(),
        SlowTool(delay),
    )
}
