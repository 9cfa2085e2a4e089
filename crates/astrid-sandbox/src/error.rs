//! Sandbox backend error taxonomy (§4.3, §7 `SandboxError`).

/// Failures a [`crate::SandboxBackend`] can surface.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The command did not finish within its timeout.
    #[error("command timed out after {0}s")]
    CommandTimeout(u64),
    /// The command finished but exited non-zero.
    #[error("command exited {code}")]
    NonZeroExit {
        /// Process exit status.
        code: i32,
        /// Combined stdout/stderr captured before exit.
        output: String,
    },
    /// The requested backend could not be started.
    #[error("sandbox backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
