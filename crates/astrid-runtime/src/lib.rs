#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Turn state machine, history governance, and approval cycle for the
//! Astrid agent runtime.
//!
//! This crate wires together the LLM provider boundary (`astrid-llm`), the
//! tool layer (`astrid-tools`), and the sandbox (`astrid-sandbox`) behind a
//! single [`turn::run_turn`] entry point that a REPL dispatcher drives one
//! user turn at a time.

pub mod approval;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod turn;

pub use approval::resolve_deferred;
pub use dispatcher::{DispatchOutcome, dispatch};
pub use error::{RuntimeError, RuntimeResult};
pub use history::{AsyncProcessor, Processor, SlidingWindowSummariser, SyncProcessor, ToolOutputTruncator, apply_processors};
pub use turn::{TurnContext, TurnResult, run_turn};
