//! # Toolwright Core
//!
//! Domain types, traits, and error definitions for the Toolwright agent
//! control core. This crate has **no framework dependencies**; it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the loops is a trait here ([`ModelGateway`],
//! [`Provider`], [`ToolExecutor`]). Implementations live in their respective
//! crates, which keeps the loops testable with scripted stand-ins.

pub mod conversation;
pub mod error;
pub mod event;
pub mod gateway;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use conversation::{Conversation, ConversationId, Turn, TurnContent, TurnRole};
pub use error::{ArgumentIssue, GatewayError, ProviderError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use gateway::{
    Critique, CritiqueRequest, Decision, DecisionRequest, ModelGateway, RevisionRequest,
};
pub use memory::{MemoryItem, MemoryKind, render_memory};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{
    ExecutionFailure, ParamSpec, ParamType, ParameterSchema, ToolExecutor, ToolInvocation,
    ToolOutcome, ToolRegistry, ToolResult, ToolSpec,
};
