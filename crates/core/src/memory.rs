//! Working-memory artifacts.
//!
//! A [`MemoryItem`] is one retained reasoning artifact. The bounded store
//! that holds them lives in the agent crate; the item type lives here so the
//! gateway contract can carry memory windows without depending on it.

use serde::{Deserialize, Serialize};

/// Kind of artifact retained in working memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Draft,
    Critique,
    ToolResult,
}

impl MemoryKind {
    pub fn label(&self) -> &'static str {
        match self {
            MemoryKind::Draft => "Draft",
            MemoryKind::Critique => "Critique",
            MemoryKind::ToolResult => "Tool result",
        }
    }
}

/// A single retained artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub kind: MemoryKind,
    pub content: String,
    /// Insertion index, assigned by the store.
    pub seq: u64,
}

impl std::fmt::Display for MemoryItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.seq, self.kind.label(), self.content)
    }
}

/// Render items as a prompt block, one per line, oldest first.
pub fn render_memory(items: &[MemoryItem]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
