#![deny(unsafe_code)]
#![cfg_attr(test, allow(unsafe_code))]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for the Astrid agent runtime.
//!
//! A single [`Config`] type consolidates the runtime's configuration
//! surface: model connection, request/history/tool-retry behaviour,
//! sandbox policy, and approval behaviour.
//!
//! # Usage
//!
//! ```rust,no_run
//! use astrid_config::Config;
//!
//! let config = Config::load(Some(std::path::Path::new("."))).unwrap();
//! println!("using model: {}", config.model.model);
//! ```
//!
//! # Configuration precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`ASTRID_*`, `ANTHROPIC_*`)
//! 2. **Project-local** (`{project_root}/.astrid/config.toml`)
//! 3. **User-level** (`~/.astrid/config.toml`)
//! 4. **Embedded defaults**
//!
//! Structured fields (the `[model]`, `[runtime]`, `[sandbox]`, `[approval]`
//! tables) merge by whole-section replacement, not per-field deep merge: a
//! file that defines `[sandbox]` at all must repeat every field it cares
//! about, since fields it omits fall back to that section's `Default`
//! rather than to a lower-precedence layer's value for the same field.
//!
//! This deliberately skips the workspace-tightens-security enforcement and
//! multi-server structured merging found in more elaborate configuration
//! systems: there is exactly one user here and no MCP server fleet to
//! police.

/// Environment variable override resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and layered loading.
pub mod loader;
/// Top-level-key replacement merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::{ApprovalConfig, Config, ModelConfig, RuntimeConfig, SandboxConfig};

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the
    /// final configuration fails validation.
    pub fn load(project_root: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(project_root, None)
    }

    /// Load configuration with an explicit home directory override, used in
    /// tests and by callers that want user-level discovery rooted somewhere
    /// other than the real home directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the
    /// final configuration fails validation.
    pub fn load_with_home(
        project_root: Option<&std::path::Path>,
        home_dir: &std::path::Path,
    ) -> ConfigResult<Self> {
        loader::load(project_root, Some(home_dir))
    }

    /// Load configuration from a single file, with no layering and no
    /// environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
