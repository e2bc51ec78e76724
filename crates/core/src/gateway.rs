//! Model Gateway contract: what the loops ask of a reasoning backend.
//!
//! Every backend reply is interpreted strictly: a decision is either a final
//! answer or a single tool call, and a critique carries a structured verdict.
//! Anything else is [`GatewayError::MalformedDecision`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::Turn;
use crate::error::GatewayError;
use crate::memory::MemoryItem;
use crate::provider::ToolDefinition;
use crate::tool::ToolInvocation;

/// The gateway's answer to "what next?".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    FinalAnswer { text: String },
    ToolCall { invocation: ToolInvocation },
}

/// Structured verdict on a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    /// `false` means the draft is accepted as is.
    pub requires_changes: bool,
    /// Explanation of what should change, or why nothing should.
    #[serde(default)]
    pub reflection: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl Critique {
    pub fn accepts(&self) -> bool {
        !self.requires_changes
    }
}

/// Input for [`ModelGateway::decide`].
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    /// Conversation so far (or a window of it). Never empty.
    pub context: &'a [Turn],
    pub tools: &'a [ToolDefinition],
    /// Recent working memory, oldest first.
    pub memory: &'a [MemoryItem],
}

/// Input for [`ModelGateway::critique`].
#[derive(Debug, Clone, Copy)]
pub struct CritiqueRequest<'a> {
    pub request: &'a str,
    pub draft: &'a str,
    pub memory: &'a [MemoryItem],
}

/// Input for [`ModelGateway::revise`].
#[derive(Debug, Clone, Copy)]
pub struct RevisionRequest<'a> {
    pub request: &'a str,
    pub draft: &'a str,
    pub critique: &'a Critique,
    pub memory: &'a [MemoryItem],
}

/// A reasoning backend as seen by the decision and reflection loops.
///
/// One call, one answer: implementations must not retry internally; the
/// loops own the retry policy.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Choose the next action given the conversation.
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, GatewayError>;

    /// Judge a draft answer.
    async fn critique(&self, request: CritiqueRequest<'_>) -> Result<Critique, GatewayError>;

    /// Produce a revised draft that addresses a critique.
    async fn revise(&self, request: RevisionRequest<'_>) -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critique_verdict_is_structured() {
        let critique: Critique = serde_json::from_str(
            r#"{"requires_changes": false, "reflection": "Plan is efficient"}"#,
        )
        .unwrap();
        assert!(critique.accepts());
        assert!(critique.suggestions.is_empty());
    }

    #[test]
    fn critique_without_verdict_does_not_parse() {
        let parsed = serde_json::from_str::<Critique>(r#"{"reflection": "looks fine"}"#);
        assert!(parsed.is_err());
    }
}
