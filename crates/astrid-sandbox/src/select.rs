//! Backend selection policy (§4.3 "Selection policy").

use astrid_core::{SandboxBackendKind, SandboxLimits};
use tracing::warn;

use crate::backend::SandboxBackend;
use crate::docker::DockerBackend;
use crate::error::{SandboxError, SandboxResult};
use crate::subprocess::SubprocessBackend;

/// How `auto` selection behaves when Docker is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Silently degrade to the subprocess backend.
    Warn,
    /// Refuse to start at all.
    Error,
}

/// Build the configured backend, applying the `auto`/`docker`/`subprocess`
/// selection policy and the `warn`/`error` fallback mode.
pub async fn build_backend(
    kind: SandboxBackendKind,
    fallback: FallbackMode,
    limits: SandboxLimits,
    workspace_root: impl Into<String>,
) -> SandboxResult<Box<dyn SandboxBackend>> {
    let workspace_root = workspace_root.into();

    match kind {
        SandboxBackendKind::Subprocess => Ok(Box::new(SubprocessBackend::new())),
        SandboxBackendKind::Docker => {
            let backend = DockerBackend::connect(limits, workspace_root)?;
            Ok(Box::new(backend))
        },
        SandboxBackendKind::Auto => match DockerBackend::connect(limits.clone(), workspace_root) {
            Ok(backend) => Ok(Box::new(backend)),
            Err(e) => match fallback {
                FallbackMode::Warn => {
                    warn!(error = %e, "Docker unavailable, falling back to subprocess sandbox");
                    Ok(Box::new(SubprocessBackend::new()))
                },
                FallbackMode::Error => Err(SandboxError::BackendUnavailable(format!(
                    "docker unavailable and sandbox_fallback=error: {e}"
                ))),
            },
        },
    }
}
