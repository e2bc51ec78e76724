//! Tool specifications and the tool registry.
//!
//! A [`ToolSpec`] pairs a unique name and a declared parameter schema with an
//! executor. The [`ToolRegistry`] is the authoritative name → spec mapping:
//! the decision loop resolves and validates every invocation through it
//! before anything is executed.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ArgumentIssue, ToolError};
use crate::provider::ToolDefinition;

/// A request to execute a tool, parsed from a gateway decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Unique call ID (matches the LLM's tool_call.id when there is one)
    pub call_id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments by parameter name
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// What came out of an executed tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { value: Value },
    Failure { reason: String },
}

/// The result of a tool execution, tagged with its invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub invocation: ToolInvocation,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(invocation: ToolInvocation, value: Value) -> Self {
        Self {
            invocation,
            outcome: ToolOutcome::Success { value },
        }
    }

    pub fn failure(invocation: ToolInvocation, reason: impl Into<String>) -> Self {
        Self {
            invocation,
            outcome: ToolOutcome::Failure {
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    /// Text form of the outcome, as shown to the model.
    pub fn render(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { value: Value::String(s) } => s.clone(),
            ToolOutcome::Success { value } => value.to_string(),
            ToolOutcome::Failure { reason } => format!("Error: {reason}"),
        }
    }
}

/// Expected JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// Whether `value` satisfies this type. Any JSON number is a `Number`.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declaration of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Parameter name → declaration. Ordered so validation output is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    params: BTreeMap<String, ParamSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter.
    pub fn required(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, description, true)
    }

    /// Declare an optional parameter.
    pub fn optional(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, description, false)
    }

    fn param(mut self, name: &str, kind: ParamType, description: &str, required: bool) -> Self {
        self.params.insert(
            name.to_string(),
            ParamSpec {
                kind,
                description: description.to_string(),
                required,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check `arguments` against the declaration. Returns every issue found;
    /// an empty list means the arguments are valid. Never mutates anything.
    pub fn check(&self, arguments: &Map<String, Value>) -> Vec<ArgumentIssue> {
        let mut issues = Vec::new();

        for (name, spec) in &self.params {
            match arguments.get(name) {
                None | Some(Value::Null) if spec.required => {
                    issues.push(ArgumentIssue::Missing { name: name.clone() });
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.accepts(value) => {
                    issues.push(ArgumentIssue::Mistyped {
                        name: name.clone(),
                        expected: spec.kind.to_string(),
                        found: json_type_name(value).to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        for name in arguments.keys() {
            if !self.params.contains_key(name) {
                issues.push(ArgumentIssue::Unexpected { name: name.clone() });
            }
        }

        issues
    }

    /// Render as a JSON Schema object for the LLM.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    serde_json::json!({
                        "type": spec.kind.as_str(),
                        "description": spec.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Failure reported by a tool executor. Carried as data, never as a panic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ExecutionFailure(pub String);

impl ExecutionFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// The executable half of a tool.
///
/// Arguments have already been validated against the owning spec's schema
/// when `execute` is called.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value, ExecutionFailure>;
}

/// A registered tool: name, description, schema and executor.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        executor: impl ToolExecutor + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            executor: Arc::new(executor),
        }
    }

    /// Convert this spec into a ToolDefinition for sending to the LLM.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.to_json_schema(),
        }
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// A registry of available tools.
///
/// Built once at startup, then shared read-only (usually behind an `Arc`).
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names are unique; a second registration fails.
    pub fn register(&mut self, spec: ToolSpec) -> Result<(), ToolError> {
        if self.tools.contains_key(&spec.name) {
            return Err(ToolError::DuplicateTool(spec.name));
        }
        self.tools.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Get a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&ToolSpec, ToolError> {
        self.tools.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    /// Resolve and check arguments without executing anything.
    pub fn validate(&self, invocation: &ToolInvocation) -> Result<&ToolSpec, ToolError> {
        let spec = self.resolve(&invocation.name)?;
        let issues = spec.parameters.check(&invocation.arguments);
        if issues.is_empty() {
            Ok(spec)
        } else {
            Err(ToolError::InvalidArguments {
                tool: spec.name.clone(),
                issues,
            })
        }
    }

    /// Validate, then execute. Executor failures come back as a failed
    /// [`ToolResult`]; only registry-level problems are `Err`.
    pub async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolResult, ToolError> {
        let spec = self.validate(invocation)?;
        let result = match spec.executor.execute(&invocation.arguments).await {
            Ok(value) => ToolResult::success(invocation.clone(), value),
            Err(failure) => ToolResult::failure(invocation.clone(), failure.0),
        };
        Ok(result)
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(ToolSpec::to_definition).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
