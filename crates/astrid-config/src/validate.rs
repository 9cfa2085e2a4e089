//! Post-merge configuration validation.
//!
//! Validates that a deserialized [`Config`] is within acceptable ranges.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Maximum allowed `max_tokens` value.
const MAX_TOKENS_UPPER_BOUND: u32 = 1_000_000;

/// Validate a fully-merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_model(config)?;
    validate_runtime(config)?;
    validate_sandbox(config)?;
    Ok(())
}

fn validate_model(config: &Config) -> ConfigResult<()> {
    let m = &config.model;

    if m.model.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "model.model".to_owned(),
            message: "model name must not be empty".to_owned(),
        });
    }

    if !(0.0..=1.0).contains(&m.temperature) {
        return Err(ConfigError::ValidationError {
            field: "model.temperature".to_owned(),
            message: format!(
                "temperature {} is out of range; must be between 0.0 and 1.0",
                m.temperature
            ),
        });
    }

    if m.max_tokens == 0 || m.max_tokens > MAX_TOKENS_UPPER_BOUND {
        return Err(ConfigError::ValidationError {
            field: "model.max_tokens".to_owned(),
            message: format!("max_tokens must be between 1 and {MAX_TOKENS_UPPER_BOUND}"),
        });
    }

    Ok(())
}

fn validate_runtime(config: &Config) -> ConfigResult<()> {
    let r = &config.runtime;

    if r.max_request_limit == 0 {
        return Err(ConfigError::ValidationError {
            field: "runtime.max_request_limit".to_owned(),
            message: "max_request_limit must be greater than 0".to_owned(),
        });
    }

    if r.max_history_messages == 0 {
        return Err(ConfigError::ValidationError {
            field: "runtime.max_history_messages".to_owned(),
            message: "max_history_messages must be greater than 0".to_owned(),
        });
    }

    Ok(())
}

fn validate_sandbox(config: &Config) -> ConfigResult<()> {
    let s = &config.sandbox;

    if s.shell_max_timeout == 0 {
        return Err(ConfigError::ValidationError {
            field: "sandbox.shell_max_timeout".to_owned(),
            message: "shell_max_timeout must be greater than 0".to_owned(),
        });
    }

    Ok(())
}
