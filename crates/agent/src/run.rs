//! Run orchestration: decision loop, then reflection.
//!
//! A run owns its [`RunContext`]: conversation, working memory and a
//! cancellation token. Nothing is shared between runs except the read-only
//! gateway and tool registry, so independent runs can proceed in parallel.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use toolwright_config::{AgentConfig, AppConfig};
use toolwright_core::conversation::Conversation;
use toolwright_core::event::{DomainEvent, EventBus};
use toolwright_core::gateway::ModelGateway;
use toolwright_core::memory::MemoryItem;
use toolwright_core::tool::ToolRegistry;
use tracing::{info, warn};
use uuid::Uuid;

use crate::decision_loop::{DecisionLoop, DecisionState};
use crate::failure::FailureReason;
use crate::reflection::{Acceptance, ReflectionLoop, ReflectionState};
use crate::working_memory::WorkingMemory;

/// Everything one run owns.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: String,
    pub conversation: Conversation,
    pub memory: WorkingMemory,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Start a run: the request becomes the first user turn.
    pub fn new(request: impl Into<String>, memory_capacity: usize) -> Self {
        let mut conversation = Conversation::new();
        conversation.push_user(request);
        Self {
            run_id: Uuid::new_v4().to_string(),
            conversation,
            memory: WorkingMemory::new(memory_capacity),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A run that produced an answer.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub answer: String,
    pub acceptance: Acceptance,
    pub tool_round_trips: u32,
    pub revisions: u32,
    pub conversation: Conversation,
    /// Working memory at the end of the run, oldest first.
    pub memory: Vec<MemoryItem>,
    pub decision_transitions: Vec<DecisionState>,
    pub reflection_transitions: Vec<ReflectionState>,
}

impl RunOutcome {
    pub fn is_forced(&self) -> bool {
        self.acceptance.is_forced()
    }
}

/// Which loop a run failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Decision,
    Reflection,
}

/// A run that ended in `FAILED`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("run {run_id} failed during {stage:?}: {reason}")]
pub struct RunFailure {
    pub run_id: String,
    pub reason: FailureReason,
    pub stage: RunStage,
    /// Conversation as it stood when the run stopped.
    pub conversation: Conversation,
    /// Latest draft, when reflection had one.
    pub last_draft: Option<String>,
}

/// The agent: a decision loop followed by an optional reflection loop.
pub struct Agent {
    decision: DecisionLoop,
    reflection: Option<ReflectionLoop>,
    memory_capacity: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl Agent {
    pub fn new(gateway: Arc<dyn ModelGateway>, tools: Arc<ToolRegistry>) -> Self {
        Self::with_settings(gateway, tools, &AgentConfig::default(), true)
    }

    /// Build from the loaded application configuration.
    pub fn from_config(
        gateway: Arc<dyn ModelGateway>,
        tools: Arc<ToolRegistry>,
        config: &AppConfig,
    ) -> Self {
        Self::with_settings(gateway, tools, &config.agent, config.reflection.enabled)
    }

    pub fn with_settings(
        gateway: Arc<dyn ModelGateway>,
        tools: Arc<ToolRegistry>,
        config: &AgentConfig,
        reflect: bool,
    ) -> Self {
        let decision = DecisionLoop::new(gateway.clone(), tools).with_config(config);
        let reflection = reflect.then(|| ReflectionLoop::new(gateway).with_config(config));
        Self {
            decision,
            reflection,
            memory_capacity: config.working_memory_capacity,
            event_bus: None,
        }
    }

    /// Publish run and loop events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.decision = self.decision.with_event_bus(bus.clone());
        self.reflection = self.reflection.map(|r| r.with_event_bus(bus.clone()));
        self.event_bus = Some(bus);
        self
    }

    pub fn reflection_enabled(&self) -> bool {
        self.reflection.is_some()
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.decision.tools()
    }

    /// Run a request to completion with a fresh context.
    pub async fn run(&self, request: &str) -> Result<RunOutcome, RunFailure> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Like [`Agent::run`], stopping early once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        request: &str,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RunFailure> {
        let mut ctx = RunContext::new(request, self.memory_capacity).with_cancel(cancel);
        self.run_in(&mut ctx).await
    }

    /// Run inside a caller-owned context.
    pub async fn run_in(&self, ctx: &mut RunContext) -> Result<RunOutcome, RunFailure> {
        let request_preview: String = ctx
            .conversation
            .request()
            .unwrap_or_default()
            .chars()
            .take(80)
            .collect();
        info!(run_id = %ctx.run_id, request = %request_preview, "Run started");
        self.publish(DomainEvent::RunStarted {
            run_id: ctx.run_id.clone(),
            request_preview,
            timestamp: Utc::now(),
        });

        let result = self.drive(ctx).await;

        match &result {
            Ok(outcome) => {
                info!(
                    run_id = %ctx.run_id,
                    acceptance = %outcome.acceptance,
                    round_trips = outcome.tool_round_trips,
                    revisions = outcome.revisions,
                    "Run finished"
                );
                self.publish(DomainEvent::RunFinished {
                    run_id: ctx.run_id.clone(),
                    success: true,
                    summary: outcome.acceptance.to_string(),
                    timestamp: Utc::now(),
                });
            }
            Err(failure) => {
                warn!(
                    run_id = %ctx.run_id,
                    kind = %failure.reason.kind(),
                    limit = failure.reason.is_limit(),
                    "Run failed: {}",
                    failure.reason
                );
                self.publish(DomainEvent::RunFinished {
                    run_id: ctx.run_id.clone(),
                    success: false,
                    summary: failure.reason.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        result
    }

    async fn drive(&self, ctx: &mut RunContext) -> Result<RunOutcome, RunFailure> {
        let decided = match self.decision.run(ctx).await {
            Ok(decided) => decided,
            Err(failure) => {
                return Err(RunFailure {
                    run_id: ctx.run_id.clone(),
                    reason: failure.reason,
                    stage: RunStage::Decision,
                    conversation: ctx.conversation.clone(),
                    last_draft: None,
                });
            }
        };

        let Some(reflection) = &self.reflection else {
            return Ok(Self::outcome(
                ctx,
                decided.answer,
                Acceptance::Skipped,
                decided.round_trips,
                0,
                decided.transitions,
                Vec::new(),
            ));
        };

        match reflection.run(ctx, decided.answer).await {
            Ok(reflected) => Ok(Self::outcome(
                ctx,
                reflected.answer,
                reflected.acceptance,
                decided.round_trips,
                reflected.revisions,
                decided.transitions,
                reflected.transitions,
            )),
            Err(failure) => Err(RunFailure {
                run_id: ctx.run_id.clone(),
                reason: failure.reason,
                stage: RunStage::Reflection,
                conversation: ctx.conversation.clone(),
                last_draft: Some(failure.last_draft),
            }),
        }
    }

    fn outcome(
        ctx: &RunContext,
        answer: String,
        acceptance: Acceptance,
        tool_round_trips: u32,
        revisions: u32,
        decision_transitions: Vec<DecisionState>,
        reflection_transitions: Vec<ReflectionState>,
    ) -> RunOutcome {
        RunOutcome {
            run_id: ctx.run_id.clone(),
            answer,
            acceptance,
            tool_round_trips,
            revisions,
            conversation: ctx.conversation.clone(),
            memory: ctx.memory.iter().cloned().collect(),
            decision_transitions,
            reflection_transitions,
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
