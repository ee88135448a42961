use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rabbitdesk_client::{CredentialStore, FileCredentialStore};
use serde::{Deserialize, Serialize};

use crate::cli::OutputFormat;

/// Per-profile CLI settings kept in `~/.rabbitdesk/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProfileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ProfileConfig {
    /// Applies `key = value`, rejecting unknown keys and bad formats.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server" => self.server = Some(value.to_string()),
            "format" => {
                value
                    .parse::<OutputFormat>()
                    .map_err(|e| anyhow::anyhow!("Invalid format: {e}"))?;
                self.format = Some(value.to_ascii_lowercase());
            }
            other => anyhow::bail!("Unknown config key: {other}. Valid keys: server, format"),
        }
        Ok(())
    }

    pub fn output_format(&self) -> Option<OutputFormat> {
        self.format.as_deref().and_then(|f| f.parse().ok())
    }
}

pub type ConfigFile = BTreeMap<String, ProfileConfig>;

fn config_path() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".rabbitdesk")
        .join("config.toml"))
}

pub fn load_all_from(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn save_profile_to(path: &Path, profile: &str, config: &ProfileConfig) -> Result<()> {
    let mut all = load_all_from(path)?;
    all.insert(profile.to_string(), config.clone());
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, toml::to_string_pretty(&all)?)?;
    Ok(())
}

pub fn load_profile(profile: &str) -> Result<ProfileConfig> {
    Ok(load_all_from(&config_path()?)?
        .remove(profile)
        .unwrap_or_default())
}

pub fn save_profile(profile: &str, config: &ProfileConfig) -> Result<()> {
    save_profile_to(&config_path()?, profile, config)
}

/// Server URL for `profile`: `--server` / `RABBITDESK_URL`, then the
/// profile config, then the server the stored credentials came from.
/// `None` leaves the client configuration's `api.base_url` in place.
pub fn resolve_server(cli_server: &Option<String>, profile: &str) -> Result<Option<String>> {
    if let Some(s) = cli_server {
        return Ok(Some(s.clone()));
    }
    if let Some(s) = load_profile(profile)?.server {
        return Ok(Some(s));
    }
    let stored = FileCredentialStore::for_profile(profile)?
        .load()
        .ok()
        .flatten();
    Ok(stored.map(|c| c.server))
}
