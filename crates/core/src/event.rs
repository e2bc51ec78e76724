//! Domain event system: lets observers follow a run without coupling.
//!
//! The loops publish events as they move through their states; anything
//! interested (a CLI progress printer, a test) subscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run accepted a user request
    RunStarted {
        run_id: String,
        request_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The gateway returned a decision
    DecisionReceived {
        run_id: String,
        iteration: u32,
        tool_call: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        run_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The reflection loop judged a draft
    CritiqueIssued {
        run_id: String,
        revision: u32,
        accepted: bool,
        timestamp: DateTime<Utc>,
    },

    /// A run reached a terminal state
    RunFinished {
        run_id: String,
        success: bool,
        summary: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
