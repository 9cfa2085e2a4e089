//! Environment variable overrides.
//!
//! Per the documented precedence (env vars > project-local config > user
//! config > built-in defaults), these are applied last, after both file
//! layers have been merged, and always win regardless of whether the field
//! was already set by a file.

use astrid_core::SandboxBackendKind;
use astrid_sandbox::FallbackMode;
use tracing::warn;

use crate::types::Config;

/// Apply `ASTRID_*`/`ANTHROPIC_*` environment variable overrides onto an
/// already-merged configuration.
///
/// Malformed values (e.g. a non-numeric `ASTRID_MAX_REQUEST_LIMIT`) are
/// logged and ignored rather than treated as a hard error, so a typo in the
/// shell environment degrades to file/default behaviour instead of refusing
/// to start.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(v) = env_str("ANTHROPIC_API_KEY") {
        config.model.api_key = Some(v);
    }
    if let Some(v) = env_str("ASTRID_MODEL") {
        config.model.model = v;
    }
    if let Some(v) = env_str("ASTRID_API_URL") {
        config.model.api_url = Some(v);
    }
    if let Some(v) = env_parsed("ASTRID_MAX_TOKENS") {
        config.model.max_tokens = v;
    }
    if let Some(v) = env_parsed("ASTRID_TEMPERATURE") {
        config.model.temperature = v;
    }
    if let Some(v) = env_str("ASTRID_SUMMARIZATION_MODEL") {
        config.model.summarization_model = v;
    }

    if let Some(v) = env_parsed("ASTRID_MAX_REQUEST_LIMIT") {
        config.runtime.max_request_limit = v;
    }
    if let Some(v) = env_parsed("ASTRID_MODEL_HTTP_RETRIES") {
        config.runtime.model_http_retries = v;
    }
    if let Some(v) = env_parsed("ASTRID_TOOL_RETRIES") {
        config.runtime.tool_retries = v;
    }
    if let Some(v) = env_parsed("ASTRID_MAX_HISTORY_MESSAGES") {
        config.runtime.max_history_messages = v;
    }
    if let Some(v) = env_parsed("ASTRID_TOOL_OUTPUT_TRIM_CHARS") {
        config.runtime.tool_output_trim_chars = v;
    }

    if let Some(v) = env_parsed("ASTRID_SHELL_MAX_TIMEOUT") {
        config.sandbox.shell_max_timeout = v;
    }
    if let Some(v) = env_str("ASTRID_SANDBOX_NETWORK") {
        config.sandbox.sandbox_network = v;
    }
    if let Some(v) = env_str("ASTRID_SANDBOX_BACKEND") {
        match v.as_str() {
            "auto" => config.sandbox.sandbox_backend = SandboxBackendKind::Auto,
            "docker" => config.sandbox.sandbox_backend = SandboxBackendKind::Docker,
            "subprocess" => config.sandbox.sandbox_backend = SandboxBackendKind::Subprocess,
            other => warn!(value = other, "ignoring unrecognized ASTRID_SANDBOX_BACKEND"),
        }
    }
    if let Some(v) = env_str("ASTRID_SANDBOX_FALLBACK") {
        match v.as_str() {
            "warn" => config.sandbox.sandbox_fallback = FallbackMode::Warn,
            "error" => config.sandbox.sandbox_fallback = FallbackMode::Error,
            other => warn!(value = other, "ignoring unrecognized ASTRID_SANDBOX_FALLBACK"),
        }
    }

    if let Some(v) = env_parsed("ASTRID_AUTO_CONFIRM") {
        config.approval.auto_confirm = v;
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_str(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring environment variable with invalid value");
            None
        },
    }
}

/// Guards tests (in this module and in `loader`) that mutate process
/// environment variables, since `cargo test` runs tests in parallel by
/// default and env vars are process-global state.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_string_and_numeric_fields() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY-equivalent: test-only, single-threaded section under ENV_LOCK.
        unsafe {
            std::env::set_var("ASTRID_MODEL", "claude-opus-4");
            std::env::set_var("ASTRID_MAX_REQUEST_LIMIT", "50");
        }

        let mut config = Config::default();
        apply_env_overrides(&mut config);

        assert_eq!(config.model.model, "claude-opus-4");
        assert_eq!(config.runtime.max_request_limit, 50);

        unsafe {
            std::env::remove_var("ASTRID_MODEL");
            std::env::remove_var("ASTRID_MAX_REQUEST_LIMIT");
        }
    }

    #[test]
    fn invalid_numeric_override_is_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("ASTRID_MAX_REQUEST_LIMIT", "not-a-number");
        }

        let mut config = Config::default();
        let before = config.runtime.max_request_limit;
        apply_env_overrides(&mut config);

        assert_eq!(config.runtime.max_request_limit, before);

        unsafe {
            std::env::remove_var("ASTRID_MAX_REQUEST_LIMIT");
        }
    }

    #[test]
    fn sandbox_backend_override_parses_enum() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("ASTRID_SANDBOX_BACKEND", "subprocess");
        }

        let mut config = Config::default();
        apply_env_overrides(&mut config);
        assert_eq!(config.sandbox.sandbox_backend, SandboxBackendKind::Subprocess);

        unsafe {
            std::env::remove_var("ASTRID_SANDBOX_BACKEND");
        }
    }
}
