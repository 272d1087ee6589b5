//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/ketabi/config.toml)
//! 3. Environment variables (KETABI_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::project;

/// Environment variable prefix
const ENV_PREFIX: &str = "KETABI";

/// Delay between the last edit and the write, in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory where new projects are created
    #[serde(default = "default_projects_dir")]
    pub projects_dir: PathBuf,

    /// Autosave debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Language code for new projects
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Author name pre-filled for new projects
    #[serde(default)]
    pub default_creator: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            projects_dir: default_projects_dir(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            default_language: default_language(),
            default_creator: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (KETABI_PROJECTS_DIR, KETABI_DEBOUNCE_MS, KETABI_LANGUAGE)
    /// 2. Config file (~/.config/ketabi/config.toml or KETABI_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // KETABI_PROJECTS_DIR
        if let Ok(val) = std::env::var(format!("{}_PROJECTS_DIR", ENV_PREFIX)) {
            self.projects_dir = PathBuf::from(val);
        }

        // KETABI_DEBOUNCE_MS; unparsable values are ignored
        if let Ok(val) = std::env::var(format!("{}_DEBOUNCE_MS", ENV_PREFIX)) {
            match val.trim().parse::<u64>() {
                Ok(ms) => self.debounce_ms = ms,
                Err(_) => tracing::warn!(value = %val, "Ignoring invalid KETABI_DEBOUNCE_MS"),
            }
        }

        // KETABI_LANGUAGE
        if let Ok(val) = std::env::var(format!("{}_LANGUAGE", ENV_PREFIX)) {
            if !val.trim().is_empty() {
                self.default_language = val.trim().to_string();
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with KETABI_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ketabi")
            .join("config.toml")
    }

    /// Autosave debounce delay
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Path of the `.ketabi` file for a project name
    pub fn project_path(&self, name: &str) -> Result<PathBuf> {
        project::project_file_path(&self.projects_dir, name)
            .with_context(|| format!("Invalid project name: {:?}", name))
    }
}

/// Get the default projects directory
fn default_projects_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Ketabi")
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_language() -> String {
    "en".to_string()
}
