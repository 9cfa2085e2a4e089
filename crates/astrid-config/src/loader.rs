//! Config file discovery and layered loading.
//!
//! Implements `Config::load()`:
//! 1. Parse embedded `defaults.toml` as the base tree.
//! 2. Merge `~/.astrid/config.toml` (user-level), replacing whole top-level
//!    sections the file defines.
//! 3. Merge `{project_root}/.astrid/config.toml` (project-local), same
//!    replacement semantics.
//! 4. Deserialize the merged tree into a [`Config`].
//! 5. Apply `ASTRID_*`/`ANTHROPIC_*` environment variable overrides.
//! 6. Validate.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::apply_env_overrides;
use crate::error::{ConfigError, ConfigResult};
use crate::merge::replace_top_level;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB). Guards against a misconfigured
/// path pointing at something enormous (e.g. a FIFO or device node).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load the unified configuration with layered file precedence.
///
/// `project_root` is the root of the current project (e.g. `cwd`). If
/// `None`, the project-local layer is skipped. `home_override` substitutes
/// an alternate home directory for user-level config discovery.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load(project_root: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let home_dir = match home_override {
        Some(h) => Some(h.to_path_buf()),
        None => directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()),
    };

    if let Some(home) = &home_dir {
        let user_path = home.join(".astrid").join("config.toml");
        if let Some(overlay) = try_load_file(&user_path)? {
            replace_top_level(&mut merged, &overlay);
            info!(path = %user_path.display(), "loaded user config");
        }
    }

    if let Some(root) = project_root {
        let project_path = root.join(".astrid").join("config.toml");
        if let Some(overlay) = try_load_file(&project_path)? {
            replace_top_level(&mut merged, &overlay);
            info!(path = %project_path.display(), "loaded project config");
        }
    }

    let mut config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source: e,
        })?;

    apply_env_overrides(&mut config);
    validate::validate(&config)?;
    Ok(config)
}

/// Load a config from a single explicit file path (no layering, no env
/// overrides).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if it doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_and_deserialize() {
        let val: toml::Value = toml::from_str(DEFAULTS_TOML).unwrap();
        assert!(val.as_table().unwrap().contains_key("model"));
        assert!(val.as_table().unwrap().contains_key("sandbox"));

        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config.model.model, "claude-sonnet-4-20250514");
        assert_eq!(config.runtime.max_request_limit, 25);
    }

    #[test]
    fn load_without_any_files_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(Some(dir.path()), Some(dir.path())).unwrap();
        assert_eq!(config.runtime.max_history_messages, 40);
    }

    #[test]
    fn project_layer_overrides_user_layer() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".astrid")).unwrap();
        std::fs::write(
            home.path().join(".astrid/config.toml"),
            "[sandbox]\nshell_max_timeout = 100\n",
        )
        .unwrap();

        let project = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(project.path().join(".astrid")).unwrap();
        std::fs::write(
            project.path().join(".astrid/config.toml"),
            "[sandbox]\nshell_max_timeout = 30\n",
        )
        .unwrap();

        let config = load(Some(project.path()), Some(home.path())).unwrap();
        assert_eq!(config.sandbox.shell_max_timeout, 30);
    }

    #[test]
    fn env_overrides_beat_both_file_layers() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".astrid")).unwrap();
        std::fs::write(
            home.path().join(".astrid/config.toml"),
            "[runtime]\nmax_request_limit = 5\n",
        )
        .unwrap();

        let _guard = crate::env::ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("ASTRID_MAX_REQUEST_LIMIT", "99");
        }

        let config = load(None, Some(home.path())).unwrap();
        assert_eq!(config.runtime.max_request_limit, 99);

        unsafe {
            std::env::remove_var("ASTRID_MAX_REQUEST_LIMIT");
        }
    }

    #[test]
    fn load_file_nonexistent() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        std::fs::write(&file_path, data).unwrap();

        let result = try_load_file(&file_path);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }
}
