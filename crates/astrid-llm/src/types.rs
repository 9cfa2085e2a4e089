//! The LLM runtime's event stream and run-output vocabulary (§4.7, §6).

use astrid_core::DeferredToolRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which kind of run a `PartStart` event begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// A model-visible text run.
    Text,
    /// An opaque reasoning run, surfaced only in verbose mode.
    Thinking,
}

/// A tool invocation beginning, as surfaced by the event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallPart {
    /// Correlates with the eventual [`ToolResultPart`] and approval decision.
    pub call_id: String,
    /// Tool name as registered in the tool registry.
    pub tool_name: String,
    /// Raw JSON-encoded arguments.
    pub args_json: String,
}

/// A tool invocation's result, as surfaced by the event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultPart {
    /// Matches the originating [`ToolCallPart::call_id`].
    pub call_id: String,
    /// Tool name, carried for display purposes.
    pub tool_name: String,
    /// Either a plain string or an object with a `display` field.
    pub content: Value,
}

/// Terminal output of one run: either a plain textual answer, or a batch of
/// tool calls awaiting human approval before the run can continue.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    /// A final textual answer.
    Text(String),
    /// Calls the approval cycle (C8) must resolve before resuming.
    Deferred(Vec<DeferredToolRequest>),
}

/// Per-request token accounting, used for cost/usage reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens consumed by this request.
    pub input_tokens: u64,
    /// Output tokens produced by this request.
    pub output_tokens: u64,
}

impl Usage {
    /// Accumulate another request's usage into this total.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Result of a complete run: the terminal output plus the updated message
/// list and usage for this run.
#[derive(Debug, Clone)]
pub struct AgentRunResult {
    /// The run's terminal output.
    pub output: RunOutput,
    /// Usage consumed by this run (may span several outbound requests if
    /// the provider itself retries internally; most providers report one).
    pub usage: Usage,
    /// Whether any text was actually streamed via delta/commit events
    /// (vs. a run that went straight to `Deferred`).
    pub streamed_text: bool,
}

/// One event in the ordered stream a provider yields for a single run.
///
/// See §4.7 of the runtime specification for the full semantics, in
/// particular the commit-boundary rule enforced by the streaming dispatcher
/// (not by the provider itself).
#[derive(Debug, Clone, PartialEq)]
pub enum StreamingEvent {
    /// Begin a text or thinking run. `initial_content` may be non-empty and
    /// must not be dropped by consumers.
    PartStart {
        /// Which kind of run this begins.
        kind: PartStartKind,
        /// Content already present at the start of the run.
        initial_content: String,
    },
    /// Append to the current text run.
    TextDelta(String),
    /// Append to the current thinking run.
    ThinkingDelta(String),
    /// A tool invocation is beginning.
    FunctionToolCall(ToolCallPart),
    /// A tool invocation completed.
    FunctionToolResult(ToolResultPart),
    /// Final terminator; carries the full result object.
    AgentRunResult(AgentRunResult),
}

/// Discriminates the two [`StreamingEvent::PartStart`] variants without
/// needing a separate enum per part kind in the event itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPartStartKind {
    /// Begins a text run.
    Text,
    /// Begins a thinking run.
    Thinking,
}

// Alias kept short for use at call sites; `PartKind` and
// `StreamPartStartKind` are intentionally the same shape (the spec's event
// table uses `PartStart(TextPart, ...)` / `PartStart(ThinkingPart, ...)`).
pub use StreamPartStartKind as PartStartKind;

/// A registered tool's LLM-visible shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmToolDefinition {
    /// Tool name (no colons for built-ins).
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema for the tool's input parameters.
    pub input_schema: Value,
    /// Whether the runtime must surface calls to this tool as deferred
    /// (approval-gated) requests.
    pub requires_approval: bool,
}

/// Per-request model configuration (not session-level `RuntimeConfig`).
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Model identifier sent to the provider API.
    pub model: String,
    /// Maximum tokens to request per completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// System prompt prepended to the conversation.
    pub system_prompt: String,
    /// Tool definitions visible to the model this run.
    pub tools: Vec<LlmToolDefinition>,
}

/// Tool calls the approval cycle has resolved, fed back into a resumed run.
#[derive(Debug, Clone, Default)]
pub struct DeferredToolResults {
    /// `call_id -> Ok(content)` for approved calls already executed, or
    /// `Err(reason)` for denied calls.
    pub results: Vec<(String, Result<Value, String>)>,
}
