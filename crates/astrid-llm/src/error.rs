//! Transport-level error type for LLM providers.

use std::time::Duration;

use astrid_core::ProviderFailure;

/// Failures a provider implementation can surface from `run_stream_events`.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The provider responded with a non-2xx HTTP status.
    #[error("provider HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Parsed `Retry-After` header, if present.
        retry_after: Option<Duration>,
        /// Response body.
        body: String,
    },
    /// The request never completed (connection reset, DNS failure, client
    /// timeout).
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be decoded into the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<&LlmError> for ProviderFailure {
    fn from(err: &LlmError) -> Self {
        match err {
            LlmError::Http {
                status,
                retry_after,
                body,
            } => Self::Http {
                status: *status,
                retry_after: *retry_after,
                body: body.clone(),
            },
            LlmError::Transport(msg) | LlmError::MalformedResponse(msg) => {
                Self::Transport(msg.clone())
            },
        }
    }
}

/// Result type for provider operations.
pub type LlmResult<T> = Result<T, LlmError>;
