//! Configuration management for the error catcher

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Catcher configuration
///
/// Read once before load; changes take effect on the next load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Echo captured errors to the operator console (default: true)
    pub console_logging_enabled: bool,

    /// Persist captured errors to per-round files (default: false)
    pub file_logging_enabled: bool,

    /// Delete error logs older than this many days at load (default: keep forever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            console_logging_enabled: true,
            file_logging_enabled: false,
            retention_days: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a file, or return default if not found
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }
}

/// Get the base configuration directory (~/.error-catcher)
/// Falls back to ./.error-catcher if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| {
        tracing::warn!("Could not determine home directory, using current directory for config");
        PathBuf::from(".error-catcher")
    })
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".error-catcher"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Directory holding one host instance's error logs
///
/// Instances are keyed by a host-assigned id such as the server port.
pub fn instance_log_dir(root: &Path, instance_id: impl Display) -> PathBuf {
    root.join(instance_id.to_string())
}
