//! Layered configuration loading: file, then environment, then validation.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};

use crate::{ClientConfig, ConfigError};

/// Default configuration file looked up when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "rabbitdesk.toml";

/// Environment variable prefix, e.g. `RABBITDESK__CACHE__MAX_SIZE=50`.
pub const ENV_PREFIX: &str = "RABBITDESK";

/// Loads configuration from `path` (or [`DEFAULT_CONFIG_FILE`] if present),
/// applies environment overrides and validates the result.
///
/// A missing file is not an error; defaults apply.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let mut builder = Config::builder();
    let file = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if file.exists() {
        tracing::debug!(path = %file.display(), "Loading configuration file");
        builder = builder.add_source(File::from(file));
    } else if path.is_some() {
        tracing::warn!(path = %file.display(), "Configuration file not found, using defaults");
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__"),
    );
    finish(builder)
}

/// Loads configuration from a TOML string, without environment overrides.
pub fn load_config_from_str(toml: &str) -> Result<ClientConfig, ConfigError> {
    let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
    finish(builder)
}

fn finish(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<ClientConfig, ConfigError> {
    let merged: ClientConfig = builder
        .build()
        .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?
        .try_deserialize()
        .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
    merged.validate()?;
    Ok(merged)
}
