//! Error types for the Toolwright domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use std::fmt;
use thiserror::Error;

/// Failures of a single Model Gateway call.
///
/// Both variants are transient from the loops' point of view: each counts
/// as one failed attempt under the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Transport failure, HTTP error, rate limit or per-call timeout.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The backend answered, but the answer fits neither decision variant.
    #[error("malformed decision: {0}")]
    MalformedDecision(String),
}

impl GatewayError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDecision(reason.into())
    }
}

/// Errors from the raw LLM transport.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<ProviderError> for GatewayError {
    fn from(err: ProviderError) -> Self {
        GatewayError::Unavailable(err.to_string())
    }
}

/// Registry-level tool errors. None of these are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    #[error("unknown tool: {name} (available: {available})")]
    UnknownTool { name: String, available: String },

    #[error("invalid arguments for {tool}: {}", format_issues(.issues))]
    InvalidArguments {
        tool: String,
        issues: Vec<ArgumentIssue>,
    },
}

/// One problem found while validating tool arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentIssue {
    Missing { name: String },
    Mistyped {
        name: String,
        expected: String,
        found: String,
    },
    Unexpected { name: String },
}

impl fmt::Display for ArgumentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentIssue::Missing { name } => write!(f, "missing '{name}'"),
            ArgumentIssue::Mistyped {
                name,
                expected,
                found,
            } => write!(f, "'{name}' should be {expected}, got {found}"),
            ArgumentIssue::Unexpected { name } => write!(f, "unexpected '{name}'"),
        }
    }
}

fn format_issues(issues: &[ArgumentIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
