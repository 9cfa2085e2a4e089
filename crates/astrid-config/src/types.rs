//! Configuration types for the Astrid runtime.
//!
//! All types here are self-contained aside from the shared sandbox
//! vocabulary in `astrid-core`/`astrid-sandbox`. Every struct implements
//! [`Default`] with the production defaults from the configuration surface,
//! so an empty or partial TOML file still produces a working configuration.

use astrid_core::SandboxBackendKind;
use astrid_sandbox::FallbackMode;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for the Astrid runtime.
///
/// Loaded from layered TOML files (user, project) with environment variable
/// overrides. Every section defaults to a working configuration on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider selection and connection details.
    pub model: ModelConfig,
    /// Request loop, history, and tool-retry behaviour.
    pub runtime: RuntimeConfig,
    /// Sandboxed shell execution policy.
    pub sandbox: SandboxConfig,
    /// Human-in-the-loop approval behaviour.
    pub approval: ApprovalConfig,
}

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

/// LLM provider connection details.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name sent to the provider API.
    pub model: String,
    /// API key. Prefer the `ANTHROPIC_API_KEY` environment variable over
    /// storing this in a file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL for the provider API (overrides the default endpoint).
    #[serde(skip_serializing)]
    pub api_url: Option<String>,
    /// Maximum tokens to request per completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Model used for sliding-window summarisation turns. Empty string means
    /// "use `model`" (no separate summarisation model configured).
    pub summarization_model: String,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("has_api_url", &self.api_url.is_some())
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("summarization_model", &self.summarization_model)
            .finish()
    }
}

impl Serialize for ModelConfig {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ModelConfig", 4)?;
        // api_key and api_url are intentionally omitted.
        state.serialize_field("model", &self.model)?;
        state.serialize_field("max_tokens", &self.max_tokens)?;
        state.serialize_field("temperature", &self.temperature)?;
        state.serialize_field("summarization_model", &self.summarization_model)?;
        state.end()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_owned(),
            api_key: None,
            api_url: None,
            max_tokens: 4096,
            temperature: 1.0,
            summarization_model: String::new(),
        }
    }
}

impl ModelConfig {
    /// Whether a separate summarisation model was configured.
    #[must_use]
    pub fn has_summarization_model(&self) -> bool {
        !self.summarization_model.is_empty()
    }

    /// The model to use for summarisation turns: the configured
    /// `summarization_model`, or `model` when none was set.
    #[must_use]
    pub fn summarization_model_or_default(&self) -> &str {
        if self.summarization_model.is_empty() {
            &self.model
        } else {
            &self.summarization_model
        }
    }
}

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

/// Request loop, history, and tool-retry behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of model requests allowed within a single turn before
    /// aborting (guards against runaway tool-call loops).
    pub max_request_limit: u32,
    /// Maximum retry attempts for a transient LLM HTTP failure.
    pub model_http_retries: u32,
    /// Maximum retry attempts for a tool execution that failed transiently.
    pub tool_retries: u32,
    /// Number of most recent messages kept verbatim in history before the
    /// sliding-window summariser engages.
    pub max_history_messages: usize,
    /// Maximum characters of a tool result kept before truncation. `0`
    /// disables truncation.
    pub tool_output_trim_chars: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_request_limit: 25,
            model_http_retries: 2,
            tool_retries: 3,
            max_history_messages: 40,
            tool_output_trim_chars: 2000,
        }
    }
}

// ---------------------------------------------------------------------------
// SandboxConfig
// ---------------------------------------------------------------------------

/// Sandboxed shell execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Upper bound, in seconds, on any single shell command's timeout.
    pub shell_max_timeout: u64,
    /// Container network mode passed to the Docker backend, e.g. `"none"`.
    pub sandbox_network: String,
    /// Which sandbox backend to use.
    pub sandbox_backend: SandboxBackendKind,
    /// How `sandbox_backend = "auto"` behaves when Docker is unavailable.
    pub sandbox_fallback: FallbackMode,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            shell_max_timeout: 600,
            sandbox_network: "none".to_owned(),
            sandbox_backend: SandboxBackendKind::Auto,
            sandbox_fallback: FallbackMode::Warn,
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalConfig
// ---------------------------------------------------------------------------

/// Human-in-the-loop approval behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// When `true`, approval-required tool calls are auto-confirmed instead
    /// of prompting the human (`--yolo` / `/yolo`).
    pub auto_confirm: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_confirm: false,
        }
    }
}
