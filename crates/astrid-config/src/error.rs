//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A config file failed to parse as TOML.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the file (or a placeholder such as `<embedded defaults>`).
        path: String,
        /// Underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A field failed post-merge validation.
    #[error("invalid config field {field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field, e.g. `"runtime.max_request_limit"`.
        field: String,
        /// Human-readable explanation.
        message: String,
    },

    /// The user's home directory could not be determined.
    #[error("could not determine home directory")]
    NoHomeDir,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
