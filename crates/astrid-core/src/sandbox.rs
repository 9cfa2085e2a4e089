//! Shared sandbox contract types (C3).
//!
//! The concrete backends (Docker, subprocess) live in `astrid-sandbox`; this
//! module only defines the vocabulary shared between that crate, the tool
//! layer, and the runtime.

use serde::{Deserialize, Serialize};

/// Whether a sandbox session provides real resource/namespace isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Commands run inside an isolated container: no capabilities, a PID
    /// limit, a non-root uid, and a configurable network mode.
    Full,
    /// Commands run as a bare subprocess with no resource limits. A safe
    /// UX convenience only, never a security boundary.
    None,
}

/// Which backend a [`SandboxLimits`]/session is configured to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackendKind {
    /// Try Docker, fall back to subprocess per `sandbox_fallback`.
    Auto,
    /// Require Docker; fail fast if unavailable.
    Docker,
    /// Skip Docker entirely.
    Subprocess,
}

/// Resource and timeout policy for a sandbox session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Memory limit in MiB (Docker variant only).
    pub mem_mb: u64,
    /// CPU quota as a percentage of one core (Docker variant only).
    pub cpu_percent: u32,
    /// PID limit (Docker variant only).
    pub pids: u32,
    /// Container network mode, e.g. `"none"`, `"bridge"` (Docker variant only).
    pub net_mode: String,
    /// Upper bound on any single command's timeout, in seconds.
    pub shell_max_timeout_secs: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            mem_mb: 512,
            cpu_percent: 50,
            pids: 256,
            net_mode: "none".to_owned(),
            shell_max_timeout_secs: 600,
        }
    }
}
