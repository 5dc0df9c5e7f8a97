//! Configuration management for the application.
//!
//! This module handles loading, validating, and saving application configuration
//! in TOML format with platform-specific directory resolution.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{APP_NAME, CONFIG_DIR_ENV};

/// Generation engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Attempts allowed for a single preview combination
    #[serde(default = "default_preview_max_attempts")]
    pub preview_max_attempts: usize,
    /// Batch attempt cap is `batch size * batch_attempt_multiplier`
    #[serde(default = "default_batch_attempt_multiplier")]
    pub batch_attempt_multiplier: usize,
    /// Fixpoint passes of the constraint resolver
    #[serde(default = "default_max_resolver_passes")]
    pub max_resolver_passes: usize,
    /// Bias selection toward under-used items
    #[serde(default = "default_true")]
    pub balance_usage: bool,
    /// Attempts between cooperative yields (0 disables yielding)
    #[serde(default = "default_yield_every")]
    pub yield_every: usize,
}

const fn default_preview_max_attempts() -> usize {
    400
}

const fn default_batch_attempt_multiplier() -> usize {
    30
}

const fn default_max_resolver_passes() -> usize {
    3
}

const fn default_true() -> bool {
    true
}

const fn default_yield_every() -> usize {
    25
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            preview_max_attempts: default_preview_max_attempts(),
            batch_attempt_multiplier: default_batch_attempt_multiplier(),
            max_resolver_passes: default_max_resolver_passes(),
            balance_usage: true,
            yield_every: default_yield_every(),
        }
    }
}

/// Batch session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Saved sessions older than this are treated as absent
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// Batch size used when the CLI is not given one
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    /// Directory of the session store (defaults to `<config dir>/sessions`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,
}

const fn default_ttl_hours() -> u64 {
    24
}

const fn default_batch_size() -> usize {
    100
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            default_batch_size: default_batch_size(),
            store_dir: None,
        }
    }
}

impl SessionConfig {
    /// Staleness limit of saved sessions.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(60 * 60))
    }

    /// Resolves the session store directory.
    pub fn store_dir(&self) -> Result<PathBuf> {
        match &self.store_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Config::config_dir()?.join("sessions")),
        }
    }
}

/// Application configuration.
///
/// # File Location
///
/// - Linux: `~/.config/TraitForge/config.toml`
/// - macOS: `~/Library/Application Support/TraitForge/config.toml`
/// - Windows: `%APPDATA%\TraitForge\config.toml`
///
/// The directory can be overridden with `TRAITFORGE_CONFIG_DIR`.
///
/// # Validation
///
/// - attempt caps, resolver passes, TTL and batch size must be non-zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Generation engine tunables
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Batch session settings
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Creates a new Config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the config directory path.
    ///
    /// `TRAITFORGE_CONFIG_DIR` wins when set; otherwise:
    /// - Linux: `~/.config/TraitForge/`
    /// - macOS: `~/Library/Application Support/TraitForge/`
    /// - Windows: `%APPDATA%\TraitForge\`
    pub fn config_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join(APP_NAME);

        Ok(config_dir)
    }

    /// Gets the full path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Loads configuration from the config file.
    ///
    /// If the file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Loads configuration from an explicit path.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(config_path).context(format!(
            "Failed to read config file: {}",
            config_path.display()
        ))?;

        let config: Self = toml::from_str(&content).context(format!(
            "Failed to parse config file: {}",
            config_path.display()
        ))?;

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to the config file using atomic write.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Saves configuration to an explicit path.
    ///
    /// Uses temp file + rename pattern for atomic writes.
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(config_dir) = config_path.parent() {
            fs::create_dir_all(config_dir).context(format!(
                "Failed to create config directory: {}",
                config_dir.display()
            ))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        let temp_path = config_path.with_extension("toml.tmp");

        fs::write(&temp_path, content).context(format!(
            "Failed to write temp config file: {}",
            temp_path.display()
        ))?;

        fs::rename(&temp_path, config_path).context(format!(
            "Failed to rename temp config file to: {}",
            config_path.display()
        ))?;

        Ok(())
    }

    /// Validates configuration values.
    pub fn validate(&self) -> Result<()> {
        let generation = &self.generation;
        if generation.preview_max_attempts == 0 {
            anyhow::bail!("generation.preview_max_attempts must be greater than 0");
        }
        if generation.batch_attempt_multiplier == 0 {
            anyhow::bail!("generation.batch_attempt_multiplier must be greater than 0");
        }
        if generation.max_resolver_passes == 0 {
            anyhow::bail!("generation.max_resolver_passes must be greater than 0");
        }
        if self.session.ttl_hours == 0 {
            anyhow::bail!("session.ttl_hours must be greater than 0");
        }
        if self.session.default_batch_size == 0 {
            anyhow::bail!("session.default_batch_size must be greater than 0");
        }
        Ok(())
    }
}
