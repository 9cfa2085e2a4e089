//! A concrete `LlmProvider` talking to Anthropic's Messages API over SSE.
//!
//! One call to [`ClaudeProvider::run_stream_events`] is one outbound HTTP
//! request — the agentic loop of executing tool calls and re-entering the
//! provider lives in the runtime crate, not here. That keeps this module a
//! thin, swappable transport, matching the "any provider fitting the
//! contract is acceptable" language in the external-interfaces contract.

use std::time::Duration;

use astrid_core::{DeferredToolRequest, Message, MessageHistory, Part};
use async_stream::try_stream;
use futures::StreamExt;
use serde_json::{Value, json};

use crate::error::{LlmError, LlmResult};
use crate::provider::{EventStream, LlmProvider};
use crate::types::{
    AgentRunResult, DeferredToolResults, ModelSettings, PartStartKind, RunOutput, StreamingEvent,
    ToolCallPart, Usage,
};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl std::fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish()
    }
}

impl ClaudeProvider {
    /// Build a provider for the given model, using the default Anthropic
    /// endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_owned(),
            model: model.into(),
        }
    }

    /// Override the API endpoint, e.g. for a compatible proxy.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn build_request_body(
        &self,
        user_input: Option<&str>,
        history: &MessageHistory,
        settings: &ModelSettings,
        deferred_results: Option<&DeferredToolResults>,
    ) -> Value {
        let mut messages = render_history(history);

        if let Some(results) = deferred_results {
            let content: Vec<Value> = results
                .results
                .iter()
                .map(|(call_id, outcome)| match outcome {
                    Ok(content) => json!({
                        "type": "tool_result",
                        "tool_use_id": call_id,
                        "content": display_text(content),
                    }),
                    Err(reason) => json!({
                        "type": "tool_result",
                        "tool_use_id": call_id,
                        "content": reason,
                        "is_error": true,
                    }),
                })
                .collect();
            if !content.is_empty() {
                messages.push(json!({"role": "user", "content": content}));
            }
        } else if let Some(text) = user_input {
            messages.push(json!({"role": "user", "content": text}));
        }

        let tools: Vec<Value> = settings
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": settings.max_tokens,
            "temperature": settings.temperature,
            "system": settings.system_prompt,
            "messages": messages,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn run_stream_events(
        &self,
        user_input: Option<&str>,
        history: &MessageHistory,
        settings: &ModelSettings,
        deferred_results: Option<DeferredToolResults>,
    ) -> LlmResult<EventStream> {
        let body =
            self.build_request_body(user_input, history, settings, deferred_results.as_ref());

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status,
                retry_after,
                body,
            });
        }

        let byte_stream = response
            .bytes_stream()
            .map(|r| r.map_err(|e| LlmError::Transport(e.to_string())));
        let stream = parse_sse_events(byte_stream);
        Ok(Box::pin(stream))
    }
}

fn render_history(history: &MessageHistory) -> Vec<Value> {
    history
        .messages()
        .iter()
        .map(|m| match m {
            Message::UserRequest { parts } => json!({
                "role": "user",
                "content": render_parts(parts),
            }),
            Message::ModelResponse { parts } => json!({
                "role": "assistant",
                "content": render_parts(parts),
            }),
        })
        .collect()
}

fn render_parts(parts: &[Part]) -> Vec<Value> {
    parts
        .iter()
        .map(|p| match p {
            Part::UserText(t) | Part::AssistantText(t) => json!({"type": "text", "text": t}),
            Part::Thinking(t) => json!({"type": "thinking", "thinking": t}),
            Part::ToolCall {
                call_id,
                tool_name,
                args_json,
            } => {
                let input: Value = serde_json::from_str(args_json).unwrap_or_else(|_| json!({}));
                json!({"type": "tool_use", "id": call_id, "name": tool_name, "input": input})
            },
            Part::ToolReturn {
                call_id, content, ..
            } => json!({
                "type": "tool_result",
                "tool_use_id": call_id,
                "content": display_text(content),
            }),
        })
        .collect()
}

fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a raw byte-chunk stream of Anthropic SSE events into our
/// [`StreamingEvent`] vocabulary. Generic over the chunk source so tests can
/// drive it from a fixed buffer instead of a live `reqwest::Response`.
///
/// Anthropic's wire events: `content_block_start`, `content_block_delta`
/// (`text_delta` / `thinking_delta` / `input_json_delta`),
/// `content_block_stop`, `message_delta` (carries `stop_reason` and
/// cumulative usage), `message_stop`.
fn parse_sse_events<S>(byte_stream: S) -> impl futures::Stream<Item = LlmResult<StreamingEvent>>
where
    S: futures::Stream<Item = LlmResult<bytes::Bytes>>,
{
    try_stream! {
        futures::pin_mut!(byte_stream);
        let mut buffer = String::new();

        let mut pending_tool: Option<(String, String, String)> = None; // (id, name, partial_json)
        let mut final_text = String::new();
        let mut usage = Usage::default();
        let mut tool_calls: Vec<ToolCallPart> = Vec::new();
        let mut stop_reason = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find("\n\n") {
                let event_block: String = buffer.drain(..pos + 2).collect();

                let mut data_line = None;
                for line in event_block.lines() {
                    if let Some(rest) = line.strip_prefix("data: ") {
                        data_line = Some(rest.to_owned());
                    }
                }
                let Some(data) = data_line else { continue };
                if data == "[DONE]" {
                    continue;
                }

                let value: Value = serde_json::from_str(&data)
                    .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
                let event_type = value.get("type").and_then(Value::as_str).unwrap_or("");

                match event_type {
                    "content_block_start" => {
                        let block = &value["content_block"];
                        match block.get("type").and_then(Value::as_str) {
                            Some("text") => {
                                let initial = block
                                    .get("text")
                                    .and_then(Value::as_str)
                                    .unwrap_or("")
                                    .to_owned();
                                final_text.push_str(&initial);
                                yield StreamingEvent::PartStart {
                                    kind: PartStartKind::Text,
                                    initial_content: initial,
                                };
                            },
                            Some("thinking") => {
                                let initial = block
                                    .get("thinking")
                                    .and_then(Value::as_str)
                                    .unwrap_or("")
                                    .to_owned();
                                yield StreamingEvent::PartStart {
                                    kind: PartStartKind::Thinking,
                                    initial_content: initial,
                                };
                            },
                            Some("tool_use") => {
                                let id = block
                                    .get("id")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_owned();
                                let name = block
                                    .get("name")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_owned();
                                pending_tool = Some((id, name, String::new()));
                            },
                            _ => {},
                        }
                    },
                    "content_block_delta" => {
                        let delta = &value["delta"];
                        match delta.get("type").and_then(Value::as_str) {
                            Some("text_delta") => {
                                let text = delta
                                    .get("text")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default();
                                final_text.push_str(text);
                                yield StreamingEvent::TextDelta(text.to_owned());
                            },
                            Some("thinking_delta") => {
                                let text = delta
                                    .get("thinking")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default();
                                yield StreamingEvent::ThinkingDelta(text.to_owned());
                            },
                            Some("input_json_delta") => {
                                if let Some((_, _, ref mut partial)) = pending_tool {
                                    let fragment = delta
                                        .get("partial_json")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default();
                                    partial.push_str(fragment);
                                }
                            },
                            _ => {},
                        }
                    },
                    "content_block_stop" => {
                        if let Some((id, name, partial)) = pending_tool.take() {
                            let args_json = if partial.is_empty() {
                                "{}".to_owned()
                            } else {
                                partial
                            };
                            let part = ToolCallPart {
                                call_id: id,
                                tool_name: name,
                                args_json,
                            };
                            tool_calls.push(part.clone());
                            yield StreamingEvent::FunctionToolCall(part);
                        }
                    },
                    "message_delta" => {
                        if let Some(reason) = value["delta"]
                            .get("stop_reason")
                            .and_then(Value::as_str)
                        {
                            stop_reason = reason.to_owned();
                        }
                        if let Some(u) = value.get("usage") {
                            usage.output_tokens = u
                                .get("output_tokens")
                                .and_then(Value::as_u64)
                                .unwrap_or(usage.output_tokens);
                        }
                    },
                    "message_start" => {
                        if let Some(u) = value["message"].get("usage") {
                            usage.input_tokens =
                                u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
                        }
                    },
                    "message_stop" => {
                        let output = if stop_reason == "tool_use" && !tool_calls.is_empty() {
                            let deferred = tool_calls
                                .iter()
                                .map(|t| DeferredToolRequest {
                                    call_id: t.call_id.clone(),
                                    tool_name: t.tool_name.clone(),
                                    args_json: t.args_json.clone(),
                                    approval_required: true,
                                })
                                .collect();
                            RunOutput::Deferred(deferred)
                        } else {
                            RunOutput::Text(final_text.clone())
                        };
                        yield StreamingEvent::AgentRunResult(AgentRunResult {
                            output,
                            usage,
                            streamed_text: !final_text.is_empty(),
                        });
                    },
                    _ => {},
                }
            }
        }
    }
}
