//! JSON configuration loading (spec §6).
//!
//! On first run, if the configured path does not exist, a default stub is
//! written and [`load_or_bootstrap`] returns [`ConfigLoad::Bootstrapped`] so
//! the caller can print the "please edit it" message and exit 0.

mod types;

pub use types::Config;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Outcome of attempting to load the config file.
pub enum ConfigLoad {
    /// The file existed and parsed successfully.
    Loaded(Config),
    /// The file did not exist; a default stub was written at this path.
    Bootstrapped(PathBuf),
}

/// Load the config at `path`, bootstrapping a default stub if absent.
pub fn load_or_bootstrap(path: &Path) -> Result<ConfigLoad, ConfigError> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let stub = Config::default();
        let json = serde_json::to_string_pretty(&stub).expect("Config serializes");
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(ConfigLoad::Bootstrapped(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config =
        serde_json::from_str(&content).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(ConfigLoad::Loaded(config))
}

/// Resolve the config path from `--config`, the `CONFIG_FILE` env var, or
/// the default `./config.json`.
pub fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(p) = cli_path {
        return p.to_path_buf();
    }
    if let Ok(env_path) = std::env::var("CONFIG_FILE") {
        let expanded = shellexpand::tilde(&env_path);
        return PathBuf::from(expanded.as_ref());
    }
    PathBuf::from("./config.json")
}
