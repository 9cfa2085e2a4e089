//! Error classification taxonomy (C1).
//!
//! Maps a single provider/transport failure to one of `REFLECT`, `BACKOFF`,
//! `ABORT`. Tool-raised conditions classify themselves into the separate
//! `TERMINAL` / `TRANSIENT` / `MISUSE` taxonomy before ever reaching this
//! layer.

use std::time::Duration;

/// A failure surfaced by the LLM provider transport, carrying just enough
/// information for [`classify_provider_failure`] to act on.
#[derive(Debug, Clone)]
pub enum ProviderFailure {
    /// An HTTP response came back with a non-2xx status.
    Http {
        /// HTTP status code.
        status: u16,
        /// Parsed `Retry-After` header, if present.
        retry_after: Option<Duration>,
        /// Response body, used verbatim for `REFLECT`.
        body: String,
    },
    /// The request never completed: connection reset, DNS failure, or a
    /// client-side timeout.
    Transport(String),
}

/// The action the turn machine should take in response to a
/// [`ProviderFailure`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedAction {
    /// Inject the failure body into history as user-role text and
    /// re-run with no new user input so the model can self-correct.
    Reflect,
    /// Sleep before retrying. `delay_hint` is the provider-suggested
    /// delay (from `Retry-After`); `base_seconds` seeds the exponential
    /// backoff schedule when no hint is present.
    Backoff {
        /// Provider-suggested delay, when present (e.g. from `Retry-After`).
        delay_hint: Option<Duration>,
        /// Base seconds for `base * 1.5^attempt` when there is no hint.
        base_seconds: f64,
    },
    /// Surface to the user and end the turn; never retried.
    Abort {
        /// Human-readable reason.
        reason: String,
    },
}

/// Classify one [`ProviderFailure`] per the fixed provider-error table:
///
/// | Signal | Action |
/// |---|---|
/// | HTTP 400 | `Reflect` |
/// | HTTP 401/403/404 | `Abort` |
/// | HTTP 429 | `Backoff` (parses `Retry-After`, else 3s) |
/// | HTTP 5xx | `Backoff` (base 2s) |
/// | transport/timeout | `Backoff` (base 2s) |
#[must_use]
pub fn classify_provider_failure(failure: &ProviderFailure) -> ClassifiedAction {
    match failure {
        ProviderFailure::Http {
            status,
            retry_after,
            body,
        } => match *status {
            400 => ClassifiedAction::Reflect,
            401 | 403 | 404 => ClassifiedAction::Abort {
                reason: format!("provider rejected the request (HTTP {status}): {body}"),
            },
            429 => ClassifiedAction::Backoff {
                delay_hint: *retry_after,
                base_seconds: 3.0,
            },
            500..=599 => ClassifiedAction::Backoff {
                delay_hint: None,
                base_seconds: 2.0,
            },
            _ => ClassifiedAction::Abort {
                reason: format!("unexpected provider status {status}: {body}"),
            },
        },
        ProviderFailure::Transport(_) => ClassifiedAction::Backoff {
            delay_hint: None,
            base_seconds: 2.0,
        },
    }
}

/// Compute the sleep duration for backoff attempt `k`: `min(30s, base *
/// 1.5^k)`, preferring a provider-supplied delay hint when present.
#[must_use]
pub fn backoff_delay(action: &ClassifiedAction, attempt: u32) -> Duration {
    let ClassifiedAction::Backoff {
        delay_hint,
        base_seconds,
    } = action
    else {
        return Duration::ZERO;
    };
    if let Some(hint) = delay_hint {
        return *hint;
    }
    #[allow(clippy::cast_precision_loss)]
    let scaled = base_seconds * 1.5_f64.powi(attempt as i32);
    Duration::from_secs_f64(scaled.min(30.0))
}

/// How a built-in or MCP tool classifies its own failure before it ever
/// reaches the turn machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The model should pick an alternative; not retried automatically.
    Terminal(String),
    /// Infrastructure-side failure; the LLM runtime should prompt the
    /// model to retry. Counted against `tool_retries`.
    Transient(String),
    /// Clear user/model error (bad arguments); retried with a correction
    /// hint. Counted against `tool_retries`.
    Misuse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_400_reflects() {
        let f = ProviderFailure::Http {
            status: 400,
            retry_after: None,
            body: "bad field".into(),
        };
        assert_eq!(classify_provider_failure(&f), ClassifiedAction::Reflect);
    }

    #[test]
    fn http_401_403_404_abort() {
        for status in [401, 403, 404] {
            let f = ProviderFailure::Http {
                status,
                retry_after: None,
                body: String::new(),
            };
            assert!(matches!(
                classify_provider_failure(&f),
                ClassifiedAction::Abort { .. }
            ));
        }
    }

    #[test]
    fn http_429_uses_retry_after_hint() {
        let f = ProviderFailure::Http {
            status: 429,
            retry_after: Some(Duration::from_secs(7)),
            body: String::new(),
        };
        let action = classify_provider_failure(&f);
        assert_eq!(backoff_delay(&action, 0), Duration::from_secs(7));
    }

    #[test]
    fn http_429_without_hint_defaults_to_3s_base() {
        let f = ProviderFailure::Http {
            status: 429,
            retry_after: None,
            body: String::new(),
        };
        let action = classify_provider_failure(&f);
        assert_eq!(backoff_delay(&action, 0), Duration::from_secs_f64(3.0));
    }

    #[test]
    fn http_5xx_backs_off_base_2s() {
        let f = ProviderFailure::Http {
            status: 503,
            retry_after: None,
            body: String::new(),
        };
        let action = classify_provider_failure(&f);
        assert_eq!(backoff_delay(&action, 0), Duration::from_secs_f64(2.0));
    }

    #[test]
    fn transport_backs_off() {
        let f = ProviderFailure::Transport("connection reset".into());
        assert!(matches!(
            classify_provider_failure(&f),
            ClassifiedAction::Backoff { .. }
        ));
    }

    #[test]
    fn backoff_schedule_escalates_and_caps_at_30s() {
        let action = ClassifiedAction::Backoff {
            delay_hint: None,
            base_seconds: 2.0,
        };
        assert_eq!(backoff_delay(&action, 0), Duration::from_secs_f64(2.0));
        assert_eq!(backoff_delay(&action, 1), Duration::from_secs_f64(3.0));
        // 2 * 1.5^10 far exceeds 30s; must cap.
        assert_eq!(backoff_delay(&action, 10), Duration::from_secs_f64(30.0));
    }
}
