//! Configuration management
//!
//! Manages the storage root, conversation window, and optimizer schedule.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::optimizer::OptimizerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Conversation memory settings
    #[serde(default)]
    pub conversation: ConversationConfig,
    /// Background optimizer settings
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

/// Where durable state lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the learning state artifacts.
    /// Defaults to `<data_dir>/state` when unset.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
}

/// Conversation window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Turns retained before the oldest is evicted.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_max_turns() -> usize {
    10
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent().context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Resolved storage root for the learning state.
    pub fn storage_root(&self) -> Result<PathBuf> {
        match &self.storage.root_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("state")),
        }
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "kaizen", "kaizen")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "kaizen", "kaizen")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default())
        .unwrap_or_else(|_| "# Default configuration\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.conversation.max_turns, 10);
        assert_eq!(config.optimizer.interval_secs, 60);
        assert_eq!(config.optimizer.min_batch_size, 5);
        assert!(config.storage.root_dir.is_none());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [optimizer]
            min_batch_size = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.optimizer.min_batch_size, 8);
        assert_eq!(config.optimizer.interval_secs, 60);
        assert_eq!(config.conversation.max_turns, 10);
    }

    #[test]
    fn default_toml_roundtrips() {
        let rendered = default_config_toml();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.conversation.max_turns, 10);
    }
}
