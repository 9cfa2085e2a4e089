#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Telemetry and logging for the Astrid agent runtime (C4).
//!
//! Two independent concerns live here: configurable `tracing` setup for
//! process logs, and a batched SQLite span store that every component
//! writes structured spans into.

mod context;
mod error;
mod logging;
mod sink;

pub use context::{RequestContext, RequestGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
pub use sink::{DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, SpanReader, SpanSink};
