//! Configuration file discovery and loading for the binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub use af_core::config::Config;

/// Locations searched, in order, when no `--config` is given.
const DEFAULT_PATHS: &[&str] = &["./audioforge.toml", "~/.config/audioforge/config.toml"];

/// Load configuration from a TOML file, logging any validation warnings.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    for warning in config.validate() {
        tracing::warn!("{}: {warning}", path.display());
    }

    Ok(config)
}

/// First existing file among the default locations.
pub fn find_default_config() -> Option<PathBuf> {
    DEFAULT_PATHS.iter().find_map(|path_str| {
        let expanded = shellexpand::tilde(path_str);
        let path = PathBuf::from(expanded.as_ref());
        path.exists().then_some(path)
    })
}

/// Load config from `custom_path`, the default locations, or built-in
/// defaults, in that order.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_default_config() {
        Some(path) => {
            tracing::debug!("Using config file {}", path.display());
            load_config(&path)
        }
        None => Ok(Config::default()),
    }
}
