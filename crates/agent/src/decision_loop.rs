//! Decision loop: the tool-use engine.
//!
//! ```text
//! AWAITING_DECISION ──FinalAnswer──▶ DONE
//!        │  ▲
//!   ToolCall │ result appended
//!        ▼  │
//!   EXECUTING_TOOL
//!
//! any state ──retries exhausted / registry error / cap / cancel──▶ FAILED
//! ```
//!
//! Each tool call is resolved and validated by the registry before anything
//! runs, and its result goes back into the conversation (and working memory)
//! so the gateway can reason about it, failures included.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use toolwright_config::AgentConfig;
use toolwright_core::event::{DomainEvent, EventBus};
use toolwright_core::gateway::{Decision, DecisionRequest, ModelGateway};
use toolwright_core::memory::MemoryKind;
use toolwright_core::tool::{ToolInvocation, ToolRegistry, ToolResult};
use tracing::{debug, info, warn};

use crate::failure::FailureReason;
use crate::retry::{RetryError, RetryPolicy};
use crate::run::RunContext;

/// States of the decision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionState {
    AwaitingDecision,
    ExecutingTool,
    Done,
    Failed,
}

/// A loop that reached `DONE`.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub answer: String,
    /// Tool calls executed.
    pub round_trips: u32,
    pub transitions: Vec<DecisionState>,
}

/// A loop that reached `FAILED`.
#[derive(Debug, Clone)]
pub struct DecisionFailure {
    pub reason: FailureReason,
    pub round_trips: u32,
    pub transitions: Vec<DecisionState>,
}

/// Drives the gateway and the tool registry until a final answer.
pub struct DecisionLoop {
    gateway: Arc<dyn ModelGateway>,
    tools: Arc<ToolRegistry>,
    retry: RetryPolicy,
    max_tool_iterations: u32,
    memory_window: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl DecisionLoop {
    pub fn new(gateway: Arc<dyn ModelGateway>, tools: Arc<ToolRegistry>) -> Self {
        let defaults = AgentConfig::default();
        Self {
            gateway,
            tools,
            retry: RetryPolicy::from_config(&defaults),
            max_tool_iterations: defaults.max_tool_iterations,
            memory_window: defaults.memory_window,
            event_bus: None,
        }
    }

    /// Take limits, retry policy and memory window from configuration.
    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.retry = RetryPolicy::from_config(config);
        self.max_tool_iterations = config.max_tool_iterations;
        self.memory_window = config.memory_window;
        self
    }

    pub fn with_max_tool_iterations(mut self, max: u32) -> Self {
        self.max_tool_iterations = max;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run until `DONE` or `FAILED`. The request must already be the last
    /// user turn in `ctx.conversation`.
    pub async fn run(&self, ctx: &mut RunContext) -> Result<DecisionOutcome, DecisionFailure> {
        let mut transitions = vec![DecisionState::AwaitingDecision];
        let mut round_trips = 0u32;
        let mut iteration = 0u32;
        let definitions = self.tools.definitions();

        let fail = |reason: FailureReason, round_trips: u32, mut transitions: Vec<DecisionState>| {
            transitions.push(DecisionState::Failed);
            debug!(state = ?DecisionState::Failed, reason = %reason, "Decision loop transition");
            DecisionFailure {
                reason,
                round_trips,
                transitions,
            }
        };

        loop {
            iteration += 1;
            debug!(run_id = %ctx.run_id, iteration, "Awaiting decision");

            let memory = ctx.memory.recent(self.memory_window);
            let request = DecisionRequest {
                context: ctx.conversation.turns(),
                tools: &definitions,
                memory: &memory,
            };
            let gateway = self.gateway.as_ref();
            let decision = match self
                .retry
                .run("decide", &ctx.cancel, move || gateway.decide(request))
                .await
            {
                Ok(decision) => decision,
                Err(RetryError::Cancelled) => {
                    info!(run_id = %ctx.run_id, "Decision loop cancelled");
                    return Err(fail(FailureReason::Cancelled, round_trips, transitions));
                }
                Err(RetryError::Exhausted { attempts, last }) => {
                    return Err(fail(
                        FailureReason::exhausted(attempts, last),
                        round_trips,
                        transitions,
                    ));
                }
            };

            self.publish(DomainEvent::DecisionReceived {
                run_id: ctx.run_id.clone(),
                iteration,
                tool_call: match &decision {
                    Decision::ToolCall { invocation } => Some(invocation.name.clone()),
                    Decision::FinalAnswer { .. } => None,
                },
                timestamp: Utc::now(),
            });

            let invocation = match decision {
                Decision::FinalAnswer { text } => {
                    ctx.conversation.push_agent(text.clone());
                    transitions.push(DecisionState::Done);
                    debug!(state = ?DecisionState::Done, round_trips, "Decision loop transition");
                    return Ok(DecisionOutcome {
                        answer: text,
                        round_trips,
                        transitions,
                    });
                }
                Decision::ToolCall { invocation } => invocation,
            };

            if round_trips >= self.max_tool_iterations {
                warn!(
                    run_id = %ctx.run_id,
                    limit = self.max_tool_iterations,
                    tool = %invocation.name,
                    "Tool iteration limit reached"
                );
                return Err(fail(
                    FailureReason::IterationLimitExceeded {
                        limit: self.max_tool_iterations,
                    },
                    round_trips,
                    transitions,
                ));
            }

            transitions.push(DecisionState::ExecutingTool);
            debug!(
                state = ?DecisionState::ExecutingTool,
                tool = %invocation.name,
                "Decision loop transition"
            );
            ctx.conversation.push_tool_call(invocation.clone());

            let result = match self.execute(ctx, &invocation).await {
                Ok(result) => result,
                Err(reason) => return Err(fail(reason, round_trips, transitions)),
            };
            round_trips += 1;

            ctx.memory.append(
                MemoryKind::ToolResult,
                format!("{}: {}", invocation.name, result.render()),
            );
            ctx.conversation.push_tool_result(result);

            transitions.push(DecisionState::AwaitingDecision);
            debug!(
                state = ?DecisionState::AwaitingDecision,
                round_trips,
                "Decision loop transition"
            );
        }
    }

    /// Invoke one tool under the per-call timeout. A timeout or executor
    /// error is a failed [`ToolResult`]; registry errors and cancellation
    /// end the loop.
    async fn execute(
        &self,
        ctx: &RunContext,
        invocation: &ToolInvocation,
    ) -> Result<ToolResult, FailureReason> {
        if ctx.cancel.is_cancelled() {
            return Err(FailureReason::Cancelled);
        }

        let timeout = self.retry.per_call_timeout;
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(FailureReason::Cancelled),
            outcome = tokio::time::timeout(timeout, self.tools.invoke(invocation)) => outcome,
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(tool_error)) => {
                warn!(
                    run_id = %ctx.run_id,
                    tool = %invocation.name,
                    error = %tool_error,
                    "Tool call rejected"
                );
                return Err(FailureReason::Tool(tool_error));
            }
            Err(_) => ToolResult::failure(
                invocation.clone(),
                format!("timed out after {}", format_duration(timeout)),
            ),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if result.is_success() {
            debug!(tool = %invocation.name, duration_ms, "Tool succeeded");
        } else {
            warn!(tool = %invocation.name, duration_ms, output = %result.render(), "Tool failed");
        }
        self.publish(DomainEvent::ToolExecuted {
            run_id: ctx.run_id.clone(),
            tool_name: invocation.name.clone(),
            success: result.is_success(),
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok(result)
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
