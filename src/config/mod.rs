//! Configuration management for agenda-cache

pub mod schema;

pub use schema::Config;

use crate::error::{AgendaError, AgendaResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agenda-cache")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agenda-cache")
    }

    /// Get the default blob cache directory
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agenda-cache")
            .join("blobs")
    }

    /// Blob cache directory for `config`
    pub fn cache_dir(config: &Config) -> PathBuf {
        config
            .cache
            .dir
            .clone()
            .unwrap_or_else(Self::default_cache_dir)
    }

    /// Local MRU store file for `config`
    pub fn mru_store_path(config: &Config) -> PathBuf {
        config
            .mru
            .local_store
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("mru.json"))
    }

    /// Shared snapshot directory for `config`
    pub fn shared_dir(config: &Config) -> PathBuf {
        config
            .mru
            .shared_dir
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("shared"))
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> AgendaResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> AgendaResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| AgendaError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| AgendaError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::validate(path, &config)?;
        Ok(config)
    }

    fn validate(path: &Path, config: &Config) -> AgendaResult<()> {
        let invalid = |reason: &str| AgendaError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if config.download.max_concurrent <= 0 {
            return Err(invalid("download.max_concurrent must be positive"));
        }
        if config.mru.top_n == 0 {
            return Err(invalid("mru.top_n must be positive"));
        }
        if config.mru.poll_interval_ms == 0 {
            return Err(invalid("mru.poll_interval_ms must be positive"));
        }
        if !matches!(config.general.log_format.as_str(), "text" | "json") {
            return Err(invalid("general.log_format must be \"text\" or \"json\""));
        }
        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> AgendaResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            AgendaError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> AgendaResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AgendaError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
