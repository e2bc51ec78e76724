//! Conversation context: the append-only record of a run.
//!
//! Turns are immutable once appended: fields are private and only read
//! accessors are exposed, and [`Conversation`] offers no way to remove,
//! replace or reorder a turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::{ToolInvocation, ToolResult};

/// Unique identifier for a conversation (one per run).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Agent,
    Tool,
}

/// Payload of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    Text { text: String },
    ToolCall { invocation: ToolInvocation },
    ToolResult { result: ToolResult },
}

/// One exchange unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    seq: u64,
    role: TurnRole,
    content: TurnContent,
    timestamp: DateTime<Utc>,
}

impl Turn {
    /// Position in the conversation, starting at 0.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn role(&self) -> TurnRole {
        self.role
    }

    pub fn content(&self) -> &TurnContent {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The text of a `Text` turn.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// An ordered, append-only sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    id: ConversationId,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append a turn and return it.
    pub fn push(&mut self, role: TurnRole, content: TurnContent) -> &Turn {
        let seq = self.turns.len() as u64;
        self.turns.push(Turn {
            seq,
            role,
            content,
            timestamp: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> &Turn {
        self.push(TurnRole::User, TurnContent::Text { text: text.into() })
    }

    pub fn push_agent(&mut self, text: impl Into<String>) -> &Turn {
        self.push(TurnRole::Agent, TurnContent::Text { text: text.into() })
    }

    pub fn push_tool_call(&mut self, invocation: ToolInvocation) -> &Turn {
        self.push(TurnRole::Agent, TurnContent::ToolCall { invocation })
    }

    pub fn push_tool_result(&mut self, result: ToolResult) -> &Turn {
        self.push(TurnRole::Tool, TurnContent::ToolResult { result })
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns (all of them if fewer).
    pub fn window(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Text of the first user turn (the run's request).
    pub fn request(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == TurnRole::User)
            .and_then(Turn::text)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
