//! Configuration loading, validation, and management for Toolwright.
//!
//! Loads configuration from `~/.toolwright/config.toml` with environment
//! variable overrides. Validates all settings at startup, before any run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.toolwright/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model-provider API key (environment variables take precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM backend settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Decision and reflection loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Reflection loop switch
    #[serde(default)]
    pub reflection: ReflectionConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("reflection", &self.reflection)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Limits that bound every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tool-call round-trips allowed per run before `IterationLimitExceeded`
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Critique/revise round-trips before the latest draft is force-accepted
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,

    /// Attempts per gateway call (first try included)
    #[serde(default = "default_gateway_retry_limit")]
    pub gateway_retry_limit: u32,

    /// Upper bound on any single gateway or tool call
    #[serde(default = "default_per_call_timeout_secs")]
    pub per_call_timeout_secs: u64,

    /// Working memory capacity (items)
    #[serde(default = "default_working_memory_capacity")]
    pub working_memory_capacity: usize,

    /// How many recent memory items are shown to the gateway
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,

    /// Delay before the first retry; doubles per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Ceiling for the retry delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_tool_iterations() -> u32 {
    8
}
fn default_max_revisions() -> u32 {
    2
}
fn default_gateway_retry_limit() -> u32 {
    3
}
fn default_per_call_timeout_secs() -> u64 {
    60
}
fn default_working_memory_capacity() -> usize {
    32
}
fn default_memory_window() -> usize {
    8
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8000
}

impl AgentConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            max_revisions: default_max_revisions(),
            gateway_retry_limit: default_gateway_retry_limit(),
            per_call_timeout_secs: default_per_call_timeout_secs(),
            working_memory_capacity: default_working_memory_capacity(),
            memory_window: default_memory_window(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolwright/config.toml).
    ///
    /// Environment overrides:
    /// - `TOOLWRIGHT_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `TOOLWRIGHT_MODEL`
    /// - `TOOLWRIGHT_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file path, then apply
    /// environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("TOOLWRIGHT_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = var("TOOLWRIGHT_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = var("TOOLWRIGHT_BASE_URL") {
            self.provider.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolwright")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let agent = &self.agent;
        if agent.gateway_retry_limit == 0 {
            return Err(ConfigError::ValidationError(
                "agent.gateway_retry_limit must be at least 1".into(),
            ));
        }
        if agent.per_call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.per_call_timeout_secs must be at least 1".into(),
            ));
        }
        if agent.working_memory_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "agent.working_memory_capacity must be at least 1".into(),
            ));
        }
        if agent.memory_window > agent.working_memory_capacity {
            return Err(ConfigError::ValidationError(
                "agent.memory_window cannot exceed agent.working_memory_capacity".into(),
            ));
        }

        Ok(())
    }

    /// The provider credential, or a fatal configuration error.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential)
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderConfig::default(),
            agent: AgentConfig::default(),
            reflection: ReflectionConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No model-provider credential: set TOOLWRIGHT_API_KEY or OPENAI_API_KEY")]
    MissingCredential,
}
