//! Docker sandbox variant: a long-lived, locked-down container reused across
//! tool calls within a session (§4.3).

use std::time::{Duration, Instant};

use astrid_core::{IsolationLevel, SandboxLimits};
use bollard::Docker;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HostConfig;
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::backend::{CommandOutput, SandboxBackend};
use crate::error::{SandboxError, SandboxResult};

/// Pinned base image: small, POSIX-complete, no surprises from a rolling tag.
const DEFAULT_IMAGE: &str = "debian:bookworm-slim";
/// Fixed in-container mount point for the session workspace.
const WORKSPACE_MOUNT: &str = "/workspace";
/// Exit code `timeout(1)` uses when it had to kill the wrapped command.
const TIMEOUT_EXIT_CODE: i64 = 124;

/// Long-lived Docker container backend.
pub struct DockerBackend {
    docker: Docker,
    limits: SandboxLimits,
    host_workspace: String,
    image: String,
    container_id: Mutex<Option<String>>,
}

impl DockerBackend {
    /// Connect to the local Docker daemon. Does not start a container yet —
    /// that happens lazily on first `run_command`.
    pub fn connect(limits: SandboxLimits, host_workspace: impl Into<String>) -> SandboxResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            docker,
            limits,
            host_workspace: host_workspace.into(),
            image: DEFAULT_IMAGE.to_owned(),
            container_id: Mutex::new(None),
        })
    }

    /// Override the base image (tests, alternate toolchains).
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    async fn ensure_container(&self) -> SandboxResult<String> {
        let mut guard = self.container_id.lock().await;
        if let Some(id) = guard.as_ref() {
            return Ok(id.clone());
        }

        let name = format!("astrid-sandbox-{}", uuid::Uuid::new_v4());
        let host_config = HostConfig {
            binds: Some(vec![format!("{}:{WORKSPACE_MOUNT}", self.host_workspace)]),
            cap_drop: Some(vec!["ALL".to_owned()]),
            security_opt: Some(vec!["no-new-privileges".to_owned()]),
            pids_limit: Some(i64::from(self.limits.pids)),
            memory: Some(
                i64::try_from(self.limits.mem_mb).unwrap_or(i64::MAX).saturating_mul(1024 * 1024),
            ),
            // One CPU period (100ms) scaled by the configured percentage.
            cpu_period: Some(100_000),
            cpu_quota: Some(i64::from(self.limits.cpu_percent).saturating_mul(1000)),
            network_mode: Some(self.limits.net_mode.clone()),
            ..Default::default()
        };

        let config = ContainerConfig {
            image: Some(self.image.clone()),
            working_dir: Some(WORKSPACE_MOUNT.to_owned()),
            user: Some("1000:1000".to_owned()),
            tty: Some(false),
            cmd: Some(vec!["sleep".to_owned(), "infinity".to_owned()]),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };

        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| SandboxError::BackendUnavailable(e.to_string()))?;
        self.docker
            .start_container::<String>(&name, None)
            .await
            .map_err(|e| SandboxError::BackendUnavailable(e.to_string()))?;

        *guard = Some(name.clone());
        Ok(name)
    }
}

#[async_trait::async_trait]
impl SandboxBackend for DockerBackend {
    async fn run_command(&self, cmd: &str, timeout_s: u64) -> SandboxResult<CommandOutput> {
        let container_id = self.ensure_container().await?;

        let wrapped = format!("timeout {timeout_s} sh -c {}", shell_quote(cmd));

        let exec = self
            .docker
            .create_exec(
                &container_id,
                CreateExecOptions {
                    cmd: Some(vec!["sh".to_owned(), "-c".to_owned(), wrapped]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::BackendUnavailable(e.to_string()))?;

        let started = Instant::now();
        let outer_timeout = Duration::from_secs(timeout_s.saturating_add(5));

        let run = async {
            let mut combined = String::new();
            match self
                .docker
                .start_exec(&exec.id, None)
                .await
                .map_err(|e| SandboxError::BackendUnavailable(e.to_string()))?
            {
                StartExecResults::Attached { mut output, .. } => {
                    while let Some(chunk) = output.next().await {
                        if let Ok(chunk) = chunk {
                            combined.push_str(&chunk.to_string());
                        }
                    }
                },
                StartExecResults::Detached => {},
            }

            let inspect = self
                .docker
                .inspect_exec(&exec.id)
                .await
                .map_err(|e| SandboxError::BackendUnavailable(e.to_string()))?;
            let exit_code = inspect.exit_code.unwrap_or(-1);
            Ok::<_, SandboxError>((combined, exit_code))
        };

        let (stdout_stderr, exit_code) = match tokio::time::timeout(outer_timeout, run).await {
            Ok(result) => result?,
            Err(_) => return Err(SandboxError::CommandTimeout(timeout_s)),
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if exit_code == TIMEOUT_EXIT_CODE {
            return Err(SandboxError::CommandTimeout(timeout_s));
        }

        Ok(CommandOutput {
            exit_code: i32::try_from(exit_code).unwrap_or(-1),
            stdout_stderr,
            duration_ms,
        })
    }

    fn isolation_level(&self) -> IsolationLevel {
        IsolationLevel::Full
    }

    async fn cleanup(&self) -> SandboxResult<()> {
        let mut guard = self.container_id.lock().await;
        let Some(id) = guard.take() else {
            return Ok(());
        };
        let _ = self
            .docker
            .stop_container(&id, Some(StopContainerOptions { t: 5 }))
            .await;
        let _ = self
            .docker
            .remove_container(
                &id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        Ok(())
    }
}

/// POSIX single-quote a string for embedding in `sh -c '...'`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("echo 'hi'"), r"'echo '\''hi'\'''");
    }

    #[test]
    fn shell_quote_passes_through_plain_commands() {
        assert_eq!(shell_quote("ls -la"), "'ls -la'");
    }
}
