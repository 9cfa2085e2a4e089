#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! The LLM provider boundary: the streaming event vocabulary, the
//! `LlmProvider` trait, and a concrete Anthropic Claude implementation.

pub mod claude;
pub mod error;
pub mod provider;
pub mod types;

pub use claude::ClaudeProvider;
pub use error::{LlmError, LlmResult};
pub use provider::{EventStream, LlmProvider};
pub use types::{
    AgentRunResult, DeferredToolResults, LlmToolDefinition, ModelSettings, PartKind,
    PartStartKind, RunOutput, StreamingEvent, ToolCallPart, ToolResultPart, Usage,
};
