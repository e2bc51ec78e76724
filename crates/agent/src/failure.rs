//! Why a run stopped without an answer.

use serde::Serialize;
use thiserror::Error;
use toolwright_core::error::{GatewayError, ToolError};

/// Terminal failure reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("model gateway unavailable after {attempts} attempt(s): {message}")]
    GatewayUnavailable { attempts: u32, message: String },

    #[error("malformed decision after {attempts} attempt(s): {message}")]
    MalformedDecision { attempts: u32, message: String },

    /// `UnknownTool` or `InvalidArguments`; never retried.
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("tool iteration limit of {limit} exceeded")]
    IterationLimitExceeded { limit: u32 },

    #[error("run cancelled")]
    Cancelled,
}

impl FailureReason {
    /// Retry budget spent; `last` is the error from the final attempt.
    pub fn exhausted(attempts: u32, last: GatewayError) -> Self {
        match last {
            GatewayError::Unavailable(message) => Self::GatewayUnavailable { attempts, message },
            GatewayError::MalformedDecision(message) => {
                Self::MalformedDecision { attempts, message }
            }
        }
    }

    /// A designed stop (budget used up) rather than a fault.
    pub fn is_limit(&self) -> bool {
        matches!(self, Self::IterationLimitExceeded { .. })
    }

    /// Short machine-friendly name, used in logs and events.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::GatewayUnavailable { .. } => FailureKind::GatewayUnavailable,
            Self::MalformedDecision { .. } => FailureKind::MalformedDecision,
            Self::Tool(ToolError::UnknownTool { .. }) => FailureKind::UnknownTool,
            Self::Tool(ToolError::InvalidArguments { .. }) => FailureKind::InvalidArguments,
            Self::Tool(ToolError::DuplicateTool(_)) => FailureKind::DuplicateTool,
            Self::IterationLimitExceeded { .. } => FailureKind::IterationLimitExceeded,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    GatewayUnavailable,
    MalformedDecision,
    UnknownTool,
    InvalidArguments,
    DuplicateTool,
    IterationLimitExceeded,
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GatewayUnavailable => "gateway_unavailable",
            Self::MalformedDecision => "malformed_decision",
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
            Self::DuplicateTool => "duplicate_tool",
            Self::IterationLimitExceeded => "iteration_limit_exceeded",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_keeps_last_error_kind() {
        let reason = FailureReason::exhausted(3, GatewayError::malformed("no JSON"));
        assert_eq!(reason.kind(), FailureKind::MalformedDecision);
        assert_eq!(
            reason.to_string(),
            "malformed decision after 3 attempt(s): no JSON"
        );
    }

    #[test]
    fn only_iteration_limit_is_a_limit() {
        assert!(FailureReason::IterationLimitExceeded { limit: 2 }.is_limit());
        assert!(!FailureReason::Cancelled.is_limit());
        let unknown = FailureReason::from(ToolError::UnknownTool {
            name: "weather_lookup".into(),
            available: "convert_currency".into(),
        });
        assert!(!unknown.is_limit());
        assert_eq!(unknown.kind().to_string(), "unknown_tool");
    }
}
