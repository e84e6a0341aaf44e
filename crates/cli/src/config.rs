//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Used when neither the flag, the environment nor the config file names an agent
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// API endpoint URL
    pub api_url: Option<String>,
    /// Default output format
    pub default_format: Option<OutputFormat>,
    /// Default algorithm for `sentinel detect`
    pub default_algorithm: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults when absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Agent URL: explicit value first, then the config file, then the default
    pub fn resolve_api_url(&self, explicit: Option<String>) -> String {
        explicit
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn resolve_format(&self, explicit: Option<OutputFormat>) -> OutputFormat {
        explicit.or(self.default_format).unwrap_or_default()
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("sentinel").join("config.json"))
    }
}
