//! Configuration schema for agenda-cache
//!
//! Configuration is stored at `~/.config/agenda-cache/config.toml`

use crate::mru::{DEFAULT_POLL_INTERVAL, DEFAULT_TOP_N};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Blob cache settings
    pub cache: CacheConfig,

    /// Download settings
    pub download: DownloadConfig,

    /// MRU sync settings
    pub mru: MruConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Blob cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (defaults to the platform cache dir)
    pub dir: Option<PathBuf>,

    /// Expire cached payloads after N hours (0 = never)
    pub expiry_hours: u32,
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum resources downloading at once
    pub max_concurrent: i64,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Named remote resources
    pub resources: Vec<ResourceConfig>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            timeout_secs: 60,
            resources: vec![],
        }
    }
}

/// A named remote resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Short name used on the command line
    pub name: String,

    /// Resource URL
    pub url: String,
}

/// MRU sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MruConfig {
    /// Records kept in views and snapshots
    pub top_n: usize,

    /// Override the host-derived machine name
    pub machine_name: Option<String>,

    /// Local visit store file (defaults to the state dir)
    pub local_store: Option<PathBuf>,

    /// Directory shared between devices (defaults to the state dir)
    pub shared_dir: Option<PathBuf>,

    /// How often to rescan the shared directory, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for MruConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            machine_name: None,
            local_store: None,
            shared_dir: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl DownloadConfig {
    /// Find a configured resource by name
    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[download]"));
        assert!(toml.contains("[mru]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.download.max_concurrent, 2);
        assert_eq!(config.mru.top_n, 20);
        assert_eq!(config.mru.poll_interval_ms, 1000);
    }

    #[test]
    fn config_deserializes_resources() {
        let toml = r#"
            [download]
            max_concurrent = 4

            [[download.resources]]
            name = "keynote"
            url = "https://example.org/keynote.pdf"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.download.max_concurrent, 4);
        assert_eq!(config.download.timeout_secs, 60); // default preserved
        assert_eq!(
            config.download.resource("keynote").unwrap().url,
            "https://example.org/keynote.pdf"
        );
        assert!(config.download.resource("missing").is_none());
    }
}
