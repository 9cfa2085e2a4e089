#![allow(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Sandboxed command execution (C3): a Docker variant providing real
//! isolation and a subprocess variant providing none. The subprocess variant
//! needs `unsafe` for `setsid`/`killpg`, so this crate allows it at the
//! module boundary instead of denying it crate-wide.

mod backend;
mod docker;
mod error;
mod select;
mod subprocess;

pub use backend::{CommandOutput, SandboxBackend};
pub use docker::DockerBackend;
pub use error::{SandboxError, SandboxResult};
pub use select::{FallbackMode, build_backend};
pub use subprocess::SubprocessBackend;
