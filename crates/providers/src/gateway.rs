//! Provider-backed Model Gateway.
//!
//! Turns a conversation into chat messages, sends them through a
//! [`Provider`], and interprets the reply strictly. A reply that is neither
//! a single tool call nor a final answer is a
//! [`GatewayError::MalformedDecision`]; nothing is guessed.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use toolwright_config::{AppConfig, ConfigError};
use toolwright_core::conversation::{Turn, TurnContent, TurnRole};
use toolwright_core::error::GatewayError;
use toolwright_core::gateway::{
    Critique, CritiqueRequest, Decision, DecisionRequest, ModelGateway, RevisionRequest,
};
use toolwright_core::memory::{MemoryItem, render_memory};
use toolwright_core::message::{Message, MessageToolCall};
use toolwright_core::provider::{Provider, ProviderRequest, ToolDefinition};
use toolwright_core::tool::ToolInvocation;

use crate::openai_compat::OpenAiCompatProvider;

/// A [`ModelGateway`] that talks to an LLM through a [`Provider`].
pub struct ProviderGateway {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ProviderGateway {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(
        &self,
        messages: Vec<Message>,
        tools: &[ToolDefinition],
        json_mode: bool,
    ) -> Result<Message, GatewayError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.to_vec(),
            json_mode,
        };

        let response = self.provider.complete(request).await?;
        trace!(
            content = %response.message.content,
            tool_calls = response.message.tool_calls.len(),
            "Raw gateway reply"
        );
        Ok(response.message)
    }
}

#[async_trait]
impl ModelGateway for ProviderGateway {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, GatewayError> {
        if request.context.is_empty() {
            return Err(GatewayError::malformed("conversation context is empty"));
        }

        let mut messages = vec![Message::system(system_prompt(request.tools))];
        if let Some(memory) = memory_message(request.memory) {
            messages.push(memory);
        }
        messages.extend(context_messages(request.context));

        let reply = self.send(messages, request.tools, false).await?;
        let decision = parse_decision(&reply)?;
        debug!(
            provider = %self.provider.name(),
            tool_call = matches!(decision, Decision::ToolCall { .. }),
            "Decision parsed"
        );
        Ok(decision)
    }

    async fn critique(&self, request: CritiqueRequest<'_>) -> Result<Critique, GatewayError> {
        let prompt = json!({
            "task": "reflection",
            "context": {
                "user_query": request.request,
                "draft_answer": request.draft,
            },
            "instructions": [
                "Review the draft answer for potential improvements",
                "Check that it actually answers the user's query",
                "Verify any figures against the tool results in working memory",
                "Only require changes that would make the answer materially better"
            ],
            "response_format": {
                "type": "json",
                "schema": {
                    "requires_changes": {
                        "type": "boolean",
                        "description": "whether the draft needs modifications"
                    },
                    "reflection": {
                        "type": "string",
                        "description": "explanation of what changes are needed or why no changes are needed"
                    },
                    "suggestions": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "specific suggestions for improvements",
                        "optional": true
                    }
                }
            }
        });

        let mut messages = vec![Message::system(system_prompt(&[]))];
        if let Some(memory) = memory_message(request.memory) {
            messages.push(memory);
        }
        messages.push(Message::user(pretty(&prompt)));

        let reply = self.send(messages, &[], true).await?;
        parse_critique(&reply.content)
    }

    async fn revise(&self, request: RevisionRequest<'_>) -> Result<String, GatewayError> {
        let feedback = serde_json::to_string(request.critique)
            .map_err(|e| GatewayError::malformed(format!("unserializable critique: {e}")))?;

        let mut messages = vec![Message::system(system_prompt(&[]))];
        if let Some(memory) = memory_message(request.memory) {
            messages.push(memory);
        }
        messages.push(Message::user(request.request));
        messages.push(Message::assistant(request.draft));
        messages.push(Message::user(format!(
            "Please revise the answer based on this feedback: {feedback}\n\
             Reply with the revised answer only."
        )));

        let reply = self.send(messages, &[], false).await?;
        parse_revision(&reply.content)
    }
}

/// Build the gateway described by the configuration.
///
/// Fails with [`ConfigError::MissingCredential`] when no API key is set.
pub fn build_from_config(config: &AppConfig) -> Result<ProviderGateway, ConfigError> {
    let api_key = config.require_api_key()?;
    let settings = &config.provider;

    let provider = OpenAiCompatProvider::new(&settings.name, &settings.base_url, api_key)
        .with_timeout(config.agent.per_call_timeout());

    Ok(ProviderGateway::new(Arc::new(provider), &settings.model)
        .with_temperature(settings.temperature)
        .with_max_tokens(settings.max_tokens))
}

fn system_prompt(tools: &[ToolDefinition]) -> String {
    let tools: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters["properties"],
            })
        })
        .collect();

    let prompt = json!({
        "role": "AI Assistant",
        "capabilities": [
            "Using provided tools to help users when necessary",
            "Responding directly without tools for questions that don't require tool usage",
            "Planning efficient tool usage sequences"
        ],
        "instructions": [
            "Use tools only when they are necessary for the task",
            "Call at most one tool per reply",
            "If a query can be answered directly, respond with a simple message instead of using tools",
            "When a tool reports an error, decide whether to retry with different arguments or explain the failure"
        ],
        "tools": tools,
        "response_format": {
            "type": "json",
            "schema": {
                "tool_name": {
                    "type": "string",
                    "description": "the tool to call next (when a tool is needed)",
                    "optional": true
                },
                "arguments": {
                    "type": "object",
                    "description": "arguments for the tool call",
                    "optional": true
                },
                "final_answer": {
                    "type": "string",
                    "description": "the answer for the user (when no further tool is needed)",
                    "optional": true
                }
            }
        }
    });
    pretty(&prompt)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn memory_message(memory: &[MemoryItem]) -> Option<Message> {
    if memory.is_empty() {
        return None;
    }
    Some(Message::system(format!(
        "Working memory (oldest first):\n{}",
        render_memory(memory)
    )))
}

/// Translate turns into chat messages.
///
/// Tool results whose call is outside the window would be rejected by the
/// backend as orphans, so they are folded into a plain user message.
fn context_messages(turns: &[Turn]) -> Vec<Message> {
    let mut seen_calls: HashSet<&str> = HashSet::new();
    let mut messages = Vec::with_capacity(turns.len());

    for turn in turns {
        let message = match turn.content() {
            TurnContent::Text { text } => match turn.role() {
                TurnRole::User => Message::user(text),
                TurnRole::Agent => Message::assistant(text),
                TurnRole::Tool => Message::user(format!("Tool output: {text}")),
            },
            TurnContent::ToolCall { invocation } => {
                seen_calls.insert(invocation.call_id.as_str());
                let mut message = Message::assistant("");
                message.tool_calls.push(MessageToolCall {
                    id: invocation.call_id.clone(),
                    name: invocation.name.clone(),
                    arguments: Value::Object(invocation.arguments.clone()).to_string(),
                });
                message
            }
            TurnContent::ToolResult { result } => {
                let call_id = result.invocation.call_id.as_str();
                if seen_calls.contains(call_id) {
                    Message::tool_result(call_id, result.render())
                } else {
                    Message::user(format!(
                        "Result of {}: {}",
                        result.invocation.name,
                        result.render()
                    ))
                }
            }
        };
        messages.push(message);
    }

    messages
}

/// Strip a surrounding Markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Interpret a backend reply as a [`Decision`].
pub fn parse_decision(reply: &Message) -> Result<Decision, GatewayError> {
    match reply.tool_calls.as_slice() {
        [] => {}
        [call] => {
            let arguments = parse_arguments(&call.arguments)?;
            let call_id = if call.id.is_empty() {
                new_call_id()
            } else {
                call.id.clone()
            };
            return Ok(Decision::ToolCall {
                invocation: ToolInvocation::new(call_id, &call.name, arguments),
            });
        }
        calls => {
            return Err(GatewayError::malformed(format!(
                "expected at most one tool call, got {}",
                calls.len()
            )));
        }
    }

    let content = strip_code_fence(&reply.content);
    if content.is_empty() {
        return Err(GatewayError::malformed("empty reply"));
    }
    let value = match serde_json::from_str::<Value>(content) {
        Ok(value) => value,
        Err(e) if content.starts_with('{') => {
            return Err(GatewayError::malformed(format!("unparsable JSON reply: {e}")));
        }
        Err(_) => {
            return Ok(Decision::FinalAnswer {
                text: content.to_string(),
            });
        }
    };
    let mut object = match value {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Err(GatewayError::malformed(
                "reply is a JSON array, expected a single decision object",
            ));
        }
        // A bare scalar ("42", "true") is a plain answer.
        _ => {
            return Ok(Decision::FinalAnswer {
                text: content.to_string(),
            });
        }
    };

    let tool_name = object.remove("tool_name");
    let final_answer = object.remove("final_answer");
    match (tool_name, final_answer) {
        (Some(_), Some(_)) => Err(GatewayError::malformed(
            "reply has both 'tool_name' and 'final_answer'",
        )),
        (Some(Value::String(name)), None) => {
            let Some(Value::Object(arguments)) = object.remove("arguments") else {
                return Err(GatewayError::malformed(format!(
                    "'arguments' for {name} must be an object"
                )));
            };
            Ok(Decision::ToolCall {
                invocation: ToolInvocation::new(new_call_id(), name, arguments),
            })
        }
        (Some(_), None) => Err(GatewayError::malformed("'tool_name' must be a string")),
        (None, Some(Value::String(text))) if !text.trim().is_empty() => {
            Ok(Decision::FinalAnswer { text })
        }
        (None, Some(_)) => Err(GatewayError::malformed(
            "'final_answer' must be a non-empty string",
        )),
        (None, None) => Err(GatewayError::malformed(
            "reply has neither 'tool_name' nor 'final_answer'",
        )),
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, GatewayError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(_) => Err(GatewayError::malformed("tool arguments must be a JSON object")),
        Err(e) => Err(GatewayError::malformed(format!(
            "unparsable tool arguments: {e}"
        ))),
    }
}

/// Interpret a backend reply as a structured [`Critique`].
pub fn parse_critique(content: &str) -> Result<Critique, GatewayError> {
    serde_json::from_str(strip_code_fence(content))
        .map_err(|e| GatewayError::malformed(format!("unparsable critique: {e}")))
}

/// Interpret a backend reply as a revised draft.
pub fn parse_revision(content: &str) -> Result<String, GatewayError> {
    let content = strip_code_fence(content);
    let text = if content.starts_with('{') {
        serde_json::from_str::<Value>(content)
            .ok()
            .and_then(|v| v.get("final_answer").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| content.to_string())
    } else {
        content.to_string()
    };

    if text.trim().is_empty() {
        return Err(GatewayError::malformed("empty revision"));
    }
    Ok(text)
}
