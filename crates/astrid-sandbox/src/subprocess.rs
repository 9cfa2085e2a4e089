//! Subprocess sandbox variant: no resource limits, `isolation_level = None`.
//!
//! Every command gets its own process group (`setsid` in `pre_exec`) so a
//! timeout can kill the whole descendant tree, not just the immediate child.

use std::process::Stdio;
use std::time::Instant;

use astrid_core::IsolationLevel;
use tokio::process::Command;

use crate::backend::{CommandOutput, SandboxBackend};
use crate::error::{SandboxError, SandboxResult};

/// Runs commands as plain OS subprocesses with no container isolation.
pub struct SubprocessBackend;

impl SubprocessBackend {
    /// Build a new subprocess backend. Stateless — nothing to persist
    /// between calls.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for SubprocessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SandboxBackend for SubprocessBackend {
    async fn run_command(&self, cmd: &str, timeout_s: u64) -> SandboxResult<CommandOutput> {
        let mut command = Command::new("bash");
        command.arg("-c").arg(cmd);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                // New session/process group: a timeout can signal the whole
                // tree via `killpg`, not just the direct child.
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| SandboxError::BackendUnavailable(e.to_string()))?;
        let pid = child.id();

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(timeout_s), child.wait_with_output())
                .await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.is_empty() {
                    if !combined.is_empty() {
                        combined.push('\n');
                    }
                    combined.push_str(&stderr);
                }
                Ok(CommandOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout_stderr: combined,
                    duration_ms,
                })
            },
            Ok(Err(e)) => Err(SandboxError::BackendUnavailable(e.to_string())),
            Err(_) => {
                #[cfg(unix)]
                if let Some(pid) = pid {
                    // Negative pid targets the whole process group.
                    unsafe {
                        libc::kill(-(i32::try_from(pid).unwrap_or(i32::MAX)), libc::SIGKILL);
                    }
                }
                Err(SandboxError::CommandTimeout(timeout_s))
            },
        }
    }

    fn isolation_level(&self) -> IsolationLevel {
        IsolationLevel::None
    }

    async fn cleanup(&self) -> SandboxResult<()> {
        Ok(())
    }
}
