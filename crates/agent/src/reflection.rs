//! Reflection loop: critique and revise a draft answer.
//!
//! ```text
//! DRAFTED ──▶ CRITIQUING ──accept──▶ ACCEPTED
//!                 │  ▲
//!          reject │  │ revised draft
//!                 ▼  │
//!               REVISING
//! ```
//!
//! With `max_revisions = N` there are at most N revisions and N + 1
//! critiques. A draft still rejected after N revisions is accepted anyway
//! and tagged forced. Cancellation also force-accepts the current draft.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use toolwright_config::AgentConfig;
use toolwright_core::event::{DomainEvent, EventBus};
use toolwright_core::gateway::{Critique, CritiqueRequest, ModelGateway, RevisionRequest};
use toolwright_core::memory::MemoryKind;
use tracing::{debug, info, warn};

use crate::failure::FailureReason;
use crate::retry::{RetryError, RetryPolicy};
use crate::run::RunContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReflectionState {
    Drafted,
    Critiquing,
    Revising,
    Accepted,
}

/// How the final answer came to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    /// The critique accepted the draft.
    Approved,
    /// Accepted without approval.
    Forced(ForcedReason),
    /// Reflection was disabled.
    Skipped,
}

impl Acceptance {
    pub fn is_forced(&self) -> bool {
        matches!(self, Self::Forced(_))
    }
}

impl std::fmt::Display for Acceptance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => f.write_str("approved"),
            Self::Forced(ForcedReason::RevisionLimit) => f.write_str("forced-accept"),
            Self::Forced(ForcedReason::Cancelled) => f.write_str("forced-accept (cancelled)"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedReason {
    RevisionLimit,
    Cancelled,
}

/// One critique of one draft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectionRecord {
    pub draft: String,
    pub critique: Critique,
    pub accepted: bool,
    /// Revisions made before this critique.
    pub revision: u32,
}

impl ReflectionRecord {
    /// Memory text for a rejected draft's critique.
    fn memory_text(&self) -> String {
        if self.critique.suggestions.is_empty() {
            self.critique.reflection.clone()
        } else {
            format!(
                "{} Suggestions: {}",
                self.critique.reflection,
                self.critique.suggestions.join("; ")
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    pub answer: String,
    pub acceptance: Acceptance,
    pub revisions: u32,
    pub records: Vec<ReflectionRecord>,
    pub transitions: Vec<ReflectionState>,
}

/// Reflection ended without an accepted answer (gateway retries exhausted).
#[derive(Debug, Clone)]
pub struct ReflectionFailure {
    pub reason: FailureReason,
    pub last_draft: String,
    pub revisions: u32,
    pub transitions: Vec<ReflectionState>,
}

pub struct ReflectionLoop {
    gateway: Arc<dyn ModelGateway>,
    retry: RetryPolicy,
    max_revisions: u32,
    memory_window: usize,
    event_bus: Option<Arc<EventBus>>,
}

/// Result of one gateway step inside the loop.
enum Step<T> {
    Done(T),
    Cancelled,
    Failed(FailureReason),
}

impl<T> From<Result<T, RetryError>> for Step<T> {
    fn from(result: Result<T, RetryError>) -> Self {
        match result {
            Ok(value) => Step::Done(value),
            Err(RetryError::Cancelled) => Step::Cancelled,
            Err(RetryError::Exhausted { attempts, last }) => {
                Step::Failed(FailureReason::exhausted(attempts, last))
            }
        }
    }
}

impl ReflectionLoop {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        let defaults = AgentConfig::default();
        Self {
            gateway,
            retry: RetryPolicy::from_config(&defaults),
            max_revisions: defaults.max_revisions,
            memory_window: defaults.memory_window,
            event_bus: None,
        }
    }

    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.retry = RetryPolicy::from_config(config);
        self.max_revisions = config.max_revisions;
        self.memory_window = config.memory_window;
        self
    }

    pub fn with_max_revisions(mut self, max: u32) -> Self {
        self.max_revisions = max;
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

    /// Critique `draft` (and its revisions) until accepted.
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        draft: String,
    ) -> Result<ReflectionOutcome, ReflectionFailure> {
        let request = ctx.conversation.request().unwrap_or_default().to_string();
        let mut draft = draft;
        let mut revisions = 0u32;
        let mut records = Vec::new();
        let mut transitions = vec![ReflectionState::Drafted];
        ctx.memory.append(MemoryKind::Draft, draft.clone());

        loop {
            transitions.push(ReflectionState::Critiquing);
            debug!(run_id = %ctx.run_id, revision = revisions, "Critiquing draft");

            let memory = ctx.memory.recent(self.memory_window);
            let critique_request = CritiqueRequest {
                request: &request,
                draft: &draft,
                memory: &memory,
            };
            let gateway = self.gateway.as_ref();
            let step = Step::from(
                self.retry
                    .run("critique", &ctx.cancel, move || gateway.critique(critique_request))
                    .await,
            );
            let critique = match step {
                Step::Done(critique) => critique,
                Step::Cancelled => {
                    return Ok(self.forced(
                        ctx,
                        draft,
                        ForcedReason::Cancelled,
                        revisions,
                        records,
                        transitions,
                    ));
                }
                Step::Failed(reason) => {
                    return Err(ReflectionFailure {
                        reason,
                        last_draft: draft,
                        revisions,
                        transitions,
                    });
                }
            };

            let accepted = critique.accepts();
            self.publish(DomainEvent::CritiqueIssued {
                run_id: ctx.run_id.clone(),
                revision: revisions,
                accepted,
                timestamp: Utc::now(),
            });
            let record = ReflectionRecord {
                draft: draft.clone(),
                critique,
                accepted,
                revision: revisions,
            };

            if accepted {
                records.push(record);
                transitions.push(ReflectionState::Accepted);
                info!(run_id = %ctx.run_id, revisions, "Draft approved");
                return Ok(ReflectionOutcome {
                    answer: draft,
                    acceptance: Acceptance::Approved,
                    revisions,
                    records,
                    transitions,
                });
            }

            ctx.memory.append(MemoryKind::Critique, record.memory_text());
            let critique = record.critique.clone();
            records.push(record);

            if revisions >= self.max_revisions {
                warn!(
                    run_id = %ctx.run_id,
                    max_revisions = self.max_revisions,
                    "Revision limit reached, accepting latest draft"
                );
                return Ok(self.forced(
                    ctx,
                    draft,
                    ForcedReason::RevisionLimit,
                    revisions,
                    records,
                    transitions,
                ));
            }

            transitions.push(ReflectionState::Revising);
            debug!(run_id = %ctx.run_id, revision = revisions + 1, "Revising draft");

            let memory = ctx.memory.recent(self.memory_window);
            let revision_request = RevisionRequest {
                request: &request,
                draft: &draft,
                critique: &critique,
                memory: &memory,
            };
            let step = Step::from(
                self.retry
                    .run("revise", &ctx.cancel, move || gateway.revise(revision_request))
                    .await,
            );
            let revised = match step {
                Step::Done(revised) => revised,
                Step::Cancelled => {
                    return Ok(self.forced(
                        ctx,
                        draft,
                        ForcedReason::Cancelled,
                        revisions,
                        records,
                        transitions,
                    ));
                }
                Step::Failed(reason) => {
                    return Err(ReflectionFailure {
                        reason,
                        last_draft: draft,
                        revisions,
                        transitions,
                    });
                }
            };

            revisions += 1;
            ctx.memory.append(MemoryKind::Draft, revised.clone());
            draft = revised;
        }
    }

    fn forced(
        &self,
        ctx: &RunContext,
        draft: String,
        reason: ForcedReason,
        revisions: u32,
        records: Vec<ReflectionRecord>,
        mut transitions: Vec<ReflectionState>,
    ) -> ReflectionOutcome {
        transitions.push(ReflectionState::Accepted);
        info!(run_id = %ctx.run_id, ?reason, revisions, "Draft force-accepted");
        ReflectionOutcome {
            answer: draft,
            acceptance: Acceptance::Forced(reason),
            revisions,
            records,
            transitions,
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
