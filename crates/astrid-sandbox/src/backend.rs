//! The one contract both sandbox variants implement (§4.3).

use astrid_core::IsolationLevel;

use crate::error::SandboxResult;

/// Result of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code.
    pub exit_code: i32,
    /// Combined stdout + stderr.
    pub stdout_stderr: String,
    /// Wall-clock duration of the call.
    pub duration_ms: u64,
}

/// A backend that can run shell commands with some degree of isolation.
#[async_trait::async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Run `cmd`, enforcing `timeout_s` at the backend boundary in addition
    /// to whatever internal timeout the backend itself applies.
    async fn run_command(&self, cmd: &str, timeout_s: u64) -> SandboxResult<CommandOutput>;

    /// The isolation this backend actually provides. `C8` consults this to
    /// decide whether the safe-command auto-approval gate may apply at all.
    fn isolation_level(&self) -> IsolationLevel;

    /// Tear down any persistent resources (container, process group).
    /// Must be safe to call more than once.
    async fn cleanup(&self) -> SandboxResult<()>;
}
