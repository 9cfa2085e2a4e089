//! Message/part data model and the message-history invariants.

use serde::{Deserialize, Serialize};

/// One piece of a message. Ordered within a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Part {
    /// User prompt or synthetic injection (e.g. a reflected error body).
    UserText(String),
    /// Model-visible assistant text.
    AssistantText(String),
    /// Opaque reasoning stream, model-visible only when verbose mode is on.
    Thinking(String),
    /// Model request to execute a tool.
    ToolCall {
        /// Correlates this call with its eventual [`Part::ToolReturn`].
        call_id: String,
        /// Tool name as registered in the tool registry.
        tool_name: String,
        /// Raw JSON-encoded arguments.
        args_json: String,
    },
    /// Paired response to a [`Part::ToolCall`] with the same `call_id`.
    ToolReturn {
        /// Must match the originating [`Part::ToolCall::call_id`].
        call_id: String,
        /// Tool name, carried for display purposes.
        tool_name: String,
        /// Either a plain string or an object with a `display` field.
        content: serde_json::Value,
    },
}

/// A single turn of conversation: either what the user sent, or what the
/// model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Message {
    /// Input from the user, or a synthetic stand-in for it (reflection,
    /// interrupt repair, summarisation replacement).
    UserRequest {
        /// Ordered parts.
        parts: Vec<Part>,
    },
    /// Output from the model.
    ModelResponse {
        /// Ordered parts.
        parts: Vec<Part>,
    },
}

impl Message {
    /// Build a `UserRequest` with a single [`Part::UserText`].
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::UserRequest {
            parts: vec![Part::UserText(text.into())],
        }
    }

    /// Build a `ModelResponse` with a single [`Part::AssistantText`].
    #[must_use]
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::ModelResponse {
            parts: vec![Part::AssistantText(text.into())],
        }
    }

    /// Parts of this message, regardless of role.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        match self {
            Self::UserRequest { parts } | Self::ModelResponse { parts } => parts,
        }
    }
}

/// An ordered, finite sequence of [`Message`]s.
///
/// Created empty at session start. Mutated only at turn boundaries by the
/// REPL dispatcher (replacing it wholesale with a turn's final message
/// list) or by slash commands (`/clear`, `/compact`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageHistory {
    messages: Vec<Message>,
}

impl MessageHistory {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Replace the entire history (used at turn boundaries).
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Empty the history (`/clear`).
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Push one message onto the end.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Build a history from a raw vector, for tests and turn-result plumbing.
    #[must_use]
    pub fn from_vec(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Consume into the raw vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<Message> {
        self.messages
    }
}

/// Scan all `ModelResponse`s for `ToolCall` parts with no later matching
/// `ToolReturn`, and append one synthetic `UserRequest` holding a
/// `ToolReturn` per dangling call.
///
/// This is the interrupt-repair step (`patch_dangling`) that restores
/// invariant H1 (tool-call pairing) whenever control returns to the outer
/// REPL mid-turn, e.g. on a keyboard interrupt.
#[must_use]
pub fn patch_dangling_tool_calls(mut messages: Vec<Message>) -> Vec<Message> {
    use std::collections::HashSet;

    let returned: HashSet<&str> = messages
        .iter()
        .flat_map(Message::parts)
        .filter_map(|p| match p {
            Part::ToolReturn { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
        .collect();

    let dangling: Vec<(String, String)> = messages
        .iter()
        .flat_map(Message::parts)
        .filter_map(|p| match p {
            Part::ToolCall {
                call_id, tool_name, ..
            } if !returned.contains(call_id.as_str()) => {
                Some((call_id.clone(), tool_name.clone()))
            },
            _ => None,
        })
        .collect();

    if dangling.is_empty() {
        return messages;
    }

    let parts = dangling
        .into_iter()
        .map(|(call_id, tool_name)| Part::ToolReturn {
            call_id,
            tool_name,
            content: serde_json::Value::String("Interrupted by user.".to_owned()),
        })
        .collect();

    messages.push(Message::UserRequest { parts });
    messages
}

/// A running counter of LLM requests shared across all streaming and
/// approval resumes within one turn.
///
/// Decremented per outbound LLM request. When exhausted, the turn machine
/// reports `ABORT` with a usage-limit error. A single budget flows through
/// every resume in a turn so that N deferred hops cannot inflate usage to
/// N times the cap.
#[derive(Debug, Clone, Copy)]
pub struct TurnBudget {
    remaining: u32,
}

impl TurnBudget {
    /// Default per-turn LLM round-trip cap.
    pub const DEFAULT_MAX_REQUESTS: u32 = 25;

    /// Create a budget with the given cap.
    #[must_use]
    pub fn new(max_requests: u32) -> Self {
        Self {
            remaining: max_requests,
        }
    }

    /// How many requests remain.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Whether the budget has any requests left.
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        self.remaining > 0
    }

    /// Consume one request. Saturates at zero rather than underflowing.
    pub fn consume_one(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}

impl Default for TurnBudget {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_REQUESTS)
    }
}

/// A tool call the LLM runtime has marked as needing human approval before
/// it can execute. Terminal for the current agent invocation; resumed by
/// feeding back a parallel map of decisions keyed by `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredToolRequest {
    /// Correlates with the eventual approval decision and `ToolReturn`.
    pub call_id: String,
    /// Tool name as registered in the tool registry.
    pub tool_name: String,
    /// Raw JSON-encoded arguments, possibly still a string to be parsed.
    pub args_json: String,
    /// Whether this specific call was flagged as requiring approval.
    pub approval_required: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_dangling_appends_synthetic_return() {
        let messages = vec![Message::ModelResponse {
            parts: vec![Part::ToolCall {
                call_id: "1".into(),
                tool_name: "shell".into(),
                args_json: "{}".into(),
            }],
        }];

        let patched = patch_dangling_tool_calls(messages);
        assert_eq!(patched.len(), 2);
        let Message::UserRequest { parts } = &patched[1] else {
            panic!("expected synthetic UserRequest");
        };
        assert_eq!(parts.len(), 1);
        assert!(matches!(&parts[0], Part::ToolReturn { call_id, content, .. }
            if call_id == "1" && content == "Interrupted by user."));
    }

    #[test]
    fn patch_dangling_is_noop_when_all_calls_paired() {
        let messages = vec![
            Message::ModelResponse {
                parts: vec![Part::ToolCall {
                    call_id: "1".into(),
                    tool_name: "shell".into(),
                    args_json: "{}".into(),
                }],
            },
            Message::UserRequest {
                parts: vec![Part::ToolReturn {
                    call_id: "1".into(),
                    tool_name: "shell".into(),
                    content: serde_json::Value::String("ok".into()),
                }],
            },
        ];
        let patched = patch_dangling_tool_calls(messages.clone());
        assert_eq!(patched, messages);
    }

    #[test]
    fn patch_dangling_handles_multiple_calls_in_one_response() {
        let messages = vec![Message::ModelResponse {
            parts: vec![
                Part::ToolCall {
                    call_id: "1".into(),
                    tool_name: "shell".into(),
                    args_json: "{}".into(),
                },
                Part::ToolCall {
                    call_id: "2".into(),
                    tool_name: "read_file".into(),
                    args_json: "{}".into(),
                },
            ],
        }];
        let patched = patch_dangling_tool_calls(messages);
        let Message::UserRequest { parts } = &patched[1] else {
            panic!("expected synthetic UserRequest");
        };
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn turn_budget_saturates_at_zero() {
        let mut budget = TurnBudget::new(1);
        assert!(budget.has_remaining());
        budget.consume_one();
        assert!(!budget.has_remaining());
        budget.consume_one();
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn message_history_clear_then_empty() {
        let mut history = MessageHistory::new();
        history.push(Message::user_text("hi"));
        assert_eq!(history.len(), 1);
        history.clear();
        assert!(history.is_empty());
    }
}
