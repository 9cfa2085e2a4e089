//! Runtime error taxonomy (§7): what a turn can fail with, beyond the
//! `REFLECT`/`BACKOFF`/`ABORT` actions already modeled in
//! `astrid_core::error` for provider failures.

use thiserror::Error;

/// Errors the turn machine or its collaborators can raise.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The LLM provider transport failed in a way `classify_provider_failure`
    /// resolved to `Abort`, or retries were exhausted under `Backoff`.
    #[error("provider error: {0}")]
    Provider(#[from] astrid_llm::LlmError),

    /// The per-turn request budget was exhausted before a terminal output
    /// was reached.
    #[error("turn request budget exhausted after {requests} requests")]
    BudgetExceeded {
        /// Requests consumed before the budget ran out.
        requests: u32,
    },

    /// A sandbox-level failure surfaced while executing a tool.
    #[error("sandbox error: {0}")]
    Sandbox(#[from] astrid_sandbox::SandboxError),

    /// A built-in tool failed outside the retryable categories it already
    /// classifies itself (`ToolErrorCategory`) — this only fires for
    /// failures in the plumbing around a tool, not the tool's own logic.
    #[error("tool error: {0}")]
    Tool(#[from] astrid_tools::ToolError),

    /// A structural invariant (e.g. H1 tool-call pairing) was found
    /// violated somewhere other than the interrupt path, which is expected
    /// to and does repair it via `patch_dangling_tool_calls`.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
