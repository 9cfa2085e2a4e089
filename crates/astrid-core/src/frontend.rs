//! Display and input abstraction (C5).
//!
//! Two implementations typically exist: a terminal frontend with rich
//! formatting and a headless/record frontend for tests. The ordering
//! contract in §4.7 of the runtime spec (delta*, commit, then any other
//! event) is enforced by the streaming dispatcher, not by implementations
//! of this trait.

use async_trait::async_trait;
use serde_json::Value;

/// Either plain text (rendered as a panel) or a tool-authored object with a
/// `display` field (rendered verbatim, never summarised or reformatted).
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResultContent {
    /// Rendered as a panel titled with the tool or command name.
    Text(String),
    /// The tool's own authored UX; shown verbatim, including embedded URLs.
    Display(Value),
    /// Kept in history but not shown to the user.
    Silent,
}

impl ToolResultContent {
    /// Classify a raw tool-return value per §4.7: a string becomes `Text`,
    /// an object with a `display` field becomes `Display`, anything else is
    /// `Silent`.
    #[must_use]
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s.clone()),
            Value::Object(map) if map.contains_key("display") => {
                Self::Display(map["display"].clone())
            },
            _ => Self::Silent,
        }
    }
}

/// The contract between the agent runtime and any user interface.
///
/// Implementations must be throttled internally (deltas can arrive at a
/// high rate); the trait itself does not rate-limit.
#[async_trait]
pub trait Frontend: Send + Sync {
    /// Called on each incremental text chunk with the full text accumulated
    /// so far in the current run.
    fn on_text_delta(&self, accumulated_text: &str);

    /// Called exactly once per text run, after its deltas, before any
    /// subsequent tool or thinking event.
    fn on_text_commit(&self, final_text: &str);

    /// Called on each incremental thinking chunk. Only fired in verbose mode.
    fn on_thinking_delta(&self, _accumulated: &str) {}

    /// Called exactly once per thinking run. Only fired in verbose mode.
    fn on_thinking_commit(&self, _final: &str) {}

    /// Annotation shown before a tool executes.
    fn on_tool_call(&self, tool_name: &str, args_display: &str);

    /// Panel/region for a tool's result.
    fn on_tool_result(&self, title: &str, content: &ToolResultContent);

    /// A one-line status update (used for error summaries, not diagnostics).
    fn on_status(&self, message: &str);

    /// The turn's final textual output, shown only when nothing was
    /// already streamed via `on_text_delta`/`on_text_commit`.
    fn on_final_output(&self, text: &str);

    /// Synchronously prompt the user for an approval decision. Returns
    /// `"y"`, `"n"`, or `"a"` (approve-and-enable session yolo).
    ///
    /// The turn machine guarantees this is never called concurrently with
    /// another call to this method.
    async fn prompt_approval(&self, description: &str) -> String;

    /// Release any resources held for the current run (e.g. tear down an
    /// in-progress streaming region). Called exactly once per run,
    /// including on the error path.
    fn cleanup(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_string_is_text() {
        let v = Value::String("hi".into());
        assert_eq!(
            ToolResultContent::classify(&v),
            ToolResultContent::Text("hi".into())
        );
    }

    #[test]
    fn classify_object_with_display_is_display() {
        let v = serde_json::json!({"display": {"url": "http://x"}, "other": 1});
        assert_eq!(
            ToolResultContent::classify(&v),
            ToolResultContent::Display(serde_json::json!({"url": "http://x"}))
        );
    }

    #[test]
    fn classify_object_without_display_is_silent() {
        let v = serde_json::json!({"foo": "bar"});
        assert_eq!(ToolResultContent::classify(&v), ToolResultContent::Silent);
    }

    #[test]
    fn classify_number_is_silent() {
        let v = serde_json::json!(42);
        assert_eq!(ToolResultContent::classify(&v), ToolResultContent::Silent);
    }
}
