#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Shared data model for the Astrid agent runtime.
//!
//! Defines the message/part union, turn budget, deferred tool requests,
//! the error classification taxonomy, the frontend display contract, and
//! the per-session resource carrier threaded into tool invocations.

pub mod deps;
pub mod error;
pub mod frontend;
pub mod message;
pub mod sandbox;
pub mod span;

pub use deps::DepsBundle;
pub use error::{
    ClassifiedAction, ProviderFailure, ToolOutcome, backoff_delay, classify_provider_failure,
};
pub use frontend::{Frontend, ToolResultContent};
pub use message::{
    DeferredToolRequest, Message, MessageHistory, Part, TurnBudget, patch_dangling_tool_calls,
};
pub use sandbox::{IsolationLevel, SandboxBackendKind, SandboxLimits};
pub use span::SpanRecord;
