//! Streaming dispatcher (C7): consumes one provider event stream, drives the
//! frontend's delta/commit/tool callbacks under the commit-boundary rule,
//! and assembles the messages the run produced.

use std::collections::HashMap;

use astrid_core::{Frontend, Message, Part, ToolResultContent};
use astrid_llm::{EventStream, LlmError, LlmResult, PartStartKind, RunOutput, StreamingEvent, Usage};
use futures::StreamExt;

/// What one dispatched run produced: the messages to append to history, the
/// terminal output, usage for this request, and whether any text actually
/// streamed (vs. going straight to a deferred batch).
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Messages produced by this run, in order: at most one `ModelResponse`
    /// (the assembled text/thinking/tool-call parts) followed by zero or
    /// more synthetic `UserRequest`s holding inline `ToolReturn`s.
    pub new_messages: Vec<Message>,
    /// The run's terminal output.
    pub output: RunOutput,
    /// Usage consumed by this single outbound request.
    pub usage: Usage,
    /// Whether `on_text_delta`/`on_text_commit` fired at all.
    pub streamed_text: bool,
}

/// Drive `stream` to completion against `frontend`, calling `frontend.cleanup()`
/// exactly once if the stream ends in an error.
///
/// # Errors
///
/// Returns the underlying [`LlmError`] if the stream yields one, or
/// `LlmError::MalformedResponse` if the stream ends without an
/// `AgentRunResult` event.
pub async fn dispatch(stream: EventStream, frontend: &dyn Frontend) -> LlmResult<DispatchOutcome> {
    match dispatch_inner(stream, frontend).await {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            frontend.cleanup();
            Err(error)
        },
    }
}

async fn dispatch_inner(stream: EventStream, frontend: &dyn Frontend) -> LlmResult<DispatchOutcome> {
    futures::pin_mut!(stream);

    let mut text_buf = String::new();
    let mut thinking_buf = String::new();
    let mut response_parts: Vec<Part> = Vec::new();
    let mut extra_messages: Vec<Message> = Vec::new();
    let mut pending_calls: HashMap<String, String> = HashMap::new();
    let mut streamed_text = false;

    while let Some(event) = stream.next().await {
        match event? {
            StreamingEvent::PartStart {
                kind: PartStartKind::Text,
                initial_content,
            } => {
                text_buf.push_str(&initial_content);
                if !text_buf.is_empty() {
                    frontend.on_text_delta(&text_buf);
                    streamed_text = true;
                }
            },
            StreamingEvent::TextDelta(delta) => {
                text_buf.push_str(&delta);
                frontend.on_text_delta(&text_buf);
                streamed_text = true;
            },
            StreamingEvent::PartStart {
                kind: PartStartKind::Thinking,
                initial_content,
            } => {
                thinking_buf.push_str(&initial_content);
                if !thinking_buf.is_empty() {
                    frontend.on_thinking_delta(&thinking_buf);
                }
            },
            StreamingEvent::ThinkingDelta(delta) => {
                thinking_buf.push_str(&delta);
                frontend.on_thinking_delta(&thinking_buf);
            },
            StreamingEvent::FunctionToolCall(call) => {
                commit_thinking(&mut thinking_buf, frontend, &mut response_parts);
                commit_text(&mut text_buf, frontend, &mut response_parts);

                let title = command_argument(&call.args_json).unwrap_or_else(|| call.tool_name.clone());
                pending_calls.insert(call.call_id.clone(), title);
                let args_display = format!("{}({})", call.tool_name, call.args_json);
                frontend.on_tool_call(&call.tool_name, &args_display);
                response_parts.push(Part::ToolCall {
                    call_id: call.call_id,
                    tool_name: call.tool_name,
                    args_json: call.args_json,
                });
            },
            StreamingEvent::FunctionToolResult(result) => {
                commit_thinking(&mut thinking_buf, frontend, &mut response_parts);
                commit_text(&mut text_buf, frontend, &mut response_parts);

                let title = pending_calls
                    .remove(&result.call_id)
                    .unwrap_or_else(|| result.tool_name.clone());
                let display = ToolResultContent::classify(&result.content);
                frontend.on_tool_result(&title, &display);
                extra_messages.push(Message::UserRequest {
                    parts: vec![Part::ToolReturn {
                        call_id: result.call_id,
                        tool_name: result.tool_name,
                        content: result.content,
                    }],
                });
            },
            StreamingEvent::AgentRunResult(result) => {
                commit_thinking(&mut thinking_buf, frontend, &mut response_parts);
                commit_text(&mut text_buf, frontend, &mut response_parts);

                let mut new_messages = Vec::with_capacity(1 + extra_messages.len());
                if !response_parts.is_empty() {
                    new_messages.push(Message::ModelResponse {
                        parts: response_parts,
                    });
                }
                new_messages.extend(extra_messages);

                return Ok(DispatchOutcome {
                    new_messages,
                    output: result.output,
                    usage: result.usage,
                    streamed_text,
                });
            },
        }
    }

    Err(LlmError::MalformedResponse(
        "event stream ended without an AgentRunResult".to_owned(),
    ))
}

fn commit_text(buf: &mut String, frontend: &dyn Frontend, parts: &mut Vec<Part>) {
    if buf.is_empty() {
        return;
    }
    frontend.on_text_commit(buf);
    parts.push(Part::AssistantText(std::mem::take(buf)));
}

fn commit_thinking(buf: &mut String, frontend: &dyn Frontend, parts: &mut Vec<Part>) {
    if buf.is_empty() {
        return;
    }
    frontend.on_thinking_commit(buf);
    parts.push(Part::Thinking(std::mem::take(buf)));
}

/// Extract a shell-like tool's `command` argument from its raw `args_json`,
/// so the result panel can be titled with the command string rather than
/// the tool name.
fn command_argument(args_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(args_json).ok()?;
    value.get("command")?.as_str().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_llm::{AgentRunResult, ToolCallPart};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingFrontend {
        events: Mutex<Vec<String>>,
        cleanup_calls: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl Frontend for RecordingFrontend {
        fn on_text_delta(&self, accumulated_text: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("delta:{accumulated_text}"));
        }

        fn on_text_commit(&self, final_text: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("commit:{final_text}"));
        }

        fn on_tool_call(&self, tool_name: &str, _args_display: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("tool_call:{tool_name}"));
        }

        fn on_tool_result(&self, title: &str, _content: &ToolResultContent) {
            self.events
                .lock()
                .unwrap()
                .push(format!("tool_result:{title}"));
        }

        fn on_status(&self, _message: &str) {}

        fn on_final_output(&self, _text: &str) {}

        async fn prompt_approval(&self, _description: &str) -> String {
            "y".to_owned()
        }

        fn cleanup(&self) {
            *self.cleanup_calls.lock().unwrap() += 1;
        }
    }

    fn stream_of(events: Vec<LlmResult<StreamingEvent>>) -> EventStream {
        Box::pin(futures::stream::iter(events))
    }

    #[tokio::test]
    async fn happy_path_text_only_commits_once_before_nothing_else() {
        let frontend = RecordingFrontend::default();
        let stream = stream_of(vec![
            Ok(StreamingEvent::TextDelta("hi ".into())),
            Ok(StreamingEvent::TextDelta("there".into())),
            Ok(StreamingEvent::AgentRunResult(AgentRunResult {
                output: RunOutput::Text("hi there".into()),
                usage: Usage::default(),
                streamed_text: true,
            })),
        ]);

        let outcome = dispatch(stream, &frontend).await.unwrap();
        assert_eq!(outcome.output, RunOutput::Text("hi there".into()));
        assert!(outcome.streamed_text);
        assert_eq!(outcome.new_messages.len(), 1);

        let events = frontend.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["delta:hi ", "delta:hi there", "commit:hi there"]
        );
    }

    #[tokio::test]
    async fn tool_call_forces_commit_before_tool_call_event() {
        let frontend = RecordingFrontend::default();
        let stream = stream_of(vec![
            Ok(StreamingEvent::TextDelta("let me check".into())),
            Ok(StreamingEvent::FunctionToolCall(ToolCallPart {
                call_id: "1".into(),
                tool_name: "shell".into(),
                args_json: "{}".into(),
            })),
            Ok(StreamingEvent::AgentRunResult(AgentRunResult {
                output: RunOutput::Deferred(vec![astrid_core::DeferredToolRequest {
                    call_id: "1".into(),
                    tool_name: "shell".into(),
                    args_json: "{}".into(),
                    approval_required: true,
                }]),
                usage: Usage::default(),
                streamed_text: true,
            })),
        ]);

        let outcome = dispatch(stream, &frontend).await.unwrap();
        let events = frontend.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["delta:let me check", "commit:let me check", "tool_call:shell"]
        );

        let Message::ModelResponse { parts } = &outcome.new_messages[0] else {
            panic!("expected ModelResponse");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], Part::AssistantText(_)));
        assert!(matches!(parts[1], Part::ToolCall { .. }));
    }

    #[tokio::test]
    async fn inline_tool_result_becomes_synthetic_user_request() {
        let frontend = RecordingFrontend::default();
        let stream = stream_of(vec![
            Ok(StreamingEvent::FunctionToolCall(ToolCallPart {
                call_id: "1".into(),
                tool_name: "shell".into(),
                args_json: "{}".into(),
            })),
            Ok(StreamingEvent::FunctionToolResult(astrid_llm::ToolResultPart {
                call_id: "1".into(),
                tool_name: "shell".into(),
                content: json!("ok"),
            })),
            Ok(StreamingEvent::AgentRunResult(AgentRunResult {
                output: RunOutput::Text("done".into()),
                usage: Usage::default(),
                streamed_text: false,
            })),
        ]);

        let outcome = dispatch(stream, &frontend).await.unwrap();
        assert_eq!(outcome.new_messages.len(), 2);
        let Message::UserRequest { parts } = &outcome.new_messages[1] else {
            panic!("expected synthetic UserRequest");
        };
        assert!(matches!(&parts[0], Part::ToolReturn { call_id, .. } if call_id == "1"));
    }

    #[tokio::test]
    async fn tool_result_panel_is_titled_with_the_shell_command() {
        let frontend = RecordingFrontend::default();
        let stream = stream_of(vec![
            Ok(StreamingEvent::FunctionToolCall(ToolCallPart {
                call_id: "1".into(),
                tool_name: "shell".into(),
                args_json: r#"{"command":"ls -la"}"#.into(),
            })),
            Ok(StreamingEvent::FunctionToolResult(astrid_llm::ToolResultPart {
                call_id: "1".into(),
                tool_name: "shell".into(),
                content: json!("total 0"),
            })),
            Ok(StreamingEvent::AgentRunResult(AgentRunResult {
                output: RunOutput::Text("done".into()),
                usage: Usage::default(),
                streamed_text: false,
            })),
        ]);

        let outcome = dispatch(stream, &frontend).await.unwrap();
        let events = frontend.events.lock().unwrap().clone();
        assert!(events.contains(&"tool_result:ls -la".to_owned()));

        let Message::UserRequest { parts } = &outcome.new_messages[1] else {
            panic!("expected synthetic UserRequest");
        };
        assert!(matches!(&parts[0], Part::ToolReturn { tool_name, .. } if tool_name == "shell"));
    }

    #[tokio::test]
    async fn missing_terminator_is_malformed_response_and_calls_cleanup_once() {
        let frontend = RecordingFrontend::default();
        let stream = stream_of(vec![Ok(StreamingEvent::TextDelta("partial".into()))]);

        let result = dispatch(stream, &frontend).await;
        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
        assert_eq!(*frontend.cleanup_calls.lock().unwrap(), 1);
    }
}
