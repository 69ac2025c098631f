//! Replicated settings container holding one snapshot per machine
//!
//! The container is eventually consistent and says nothing about what
//! changed: subscribers get a bare pulse and re-read what they need.

use crate::error::{AgendaError, AgendaResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

const CHANGE_BUFFER: usize = 32;

/// How often `DirectorySettings` rescans its directory for peer writes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Name, modification time and length of every snapshot file, sorted by name
type Fingerprint = Vec<(OsString, Option<SystemTime>, u64)>;

/// Key/value container shared between devices
#[async_trait]
pub trait SettingsContainer: Send + Sync {
    /// Serialized snapshot stored under `key`
    async fn get(&self, key: &str) -> AgendaResult<Option<String>>;

    /// Replace the value under `key`
    async fn set(&self, key: &str, value: String) -> AgendaResult<()>;

    /// Every key currently stored
    async fn keys(&self) -> AgendaResult<Vec<String>>;

    /// Change pulses, including writes made by other devices
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// In-process container, shareable between engines in one process
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<()>,
}

impl MemorySettings {
    /// Create an empty container
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            values: RwLock::new(HashMap::new()),
            changes,
        }
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsContainer for MemorySettings {
    async fn get(&self, key: &str) -> AgendaResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AgendaResult<()> {
        self.values.write().await.insert(key.to_string(), value);
        let _ = self.changes.send(());
        Ok(())
    }

    async fn keys(&self) -> AgendaResult<Vec<String>> {
        let mut keys: Vec<String> = self.values.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

/// Container stored as files in a directory synced between devices
///
/// Each key is a `<name>.json` file. Files are written to a temporary name
/// and renamed, so a syncing peer never reads half a snapshot. A background
/// task polls the directory and pulses subscribers whenever a snapshot file
/// appears, disappears or changes, whoever wrote it.
pub struct DirectorySettings {
    dir: PathBuf,
    changes: broadcast::Sender<()>,
    watcher: JoinHandle<()>,
}

impl DirectorySettings {
    /// Open (and create if needed) a container rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> AgendaResult<Self> {
        Self::open_with_poll_interval(dir, DEFAULT_POLL_INTERVAL).await
    }

    /// Open a container that rescans `dir` every `every`
    pub async fn open_with_poll_interval(
        dir: impl Into<PathBuf>,
        every: Duration,
    ) -> AgendaResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            AgendaError::io(format!("creating settings dir {}", dir.display()), e)
        })?;
        let baseline = fingerprint(&dir)
            .await
            .map_err(|e| AgendaError::io(format!("scanning {}", dir.display()), e))?;

        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        let watcher = spawn_watcher(dir.clone(), baseline, every, changes.clone());
        Ok(Self {
            dir,
            changes,
            watcher,
        })
    }

    /// Container directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn file_name(key: &str) -> String {
        let safe = key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if safe && !key.is_empty() && !key.starts_with('.') {
            format!("{}.json", key)
        } else {
            // Unusual host names map to a stable hashed file name
            format!(
                "h-{}.json",
                &hex::encode(Sha256::digest(key.as_bytes()))[..16]
            )
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }
}

impl Drop for DirectorySettings {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn fingerprint(dir: &Path) -> std::io::Result<Fingerprint> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.path().extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        // Vanished between listing and stat; the next scan sees it gone
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        files.push((entry.file_name(), meta.modified().ok(), meta.len()));
    }
    files.sort();
    Ok(files)
}

fn spawn_watcher(
    dir: PathBuf,
    mut seen: Fingerprint,
    every: Duration,
    changes: broadcast::Sender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match fingerprint(&dir).await {
                Ok(current) if current != seen => {
                    debug!("Settings directory {} changed", dir.display());
                    seen = current;
                    let _ = changes.send(());
                }
                Ok(_) => {}
                Err(e) => debug!("Failed to scan {}: {}", dir.display(), e),
            }
        }
    })
}

/// On-disk wrapper so the original key survives hashed file names
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredValue {
    key: String,
    value: String,
}

#[async_trait]
impl SettingsContainer for DirectorySettings {
    async fn get(&self, key: &str) -> AgendaResult<Option<String>> {
        let path = self.key_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AgendaError::io(
                    format!("reading setting {}", path.display()),
                    e,
                ))
            }
        };
        let stored: StoredValue = serde_json::from_str(&content)?;
        Ok(Some(stored.value))
    }

    async fn set(&self, key: &str, value: String) -> AgendaResult<()> {
        let path = self.key_path(key);
        let tmp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let content = serde_json::to_string_pretty(&StoredValue {
            key: key.to_string(),
            value,
        })?;

        fs::write(&tmp, content)
            .await
            .map_err(|e| AgendaError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| AgendaError::io(format!("renaming into {}", path.display()), e))?;

        debug!("Stored setting {} at {}", key, path.display());
        let _ = self.changes.send(());
        Ok(())
    }

    async fn keys(&self) -> AgendaResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| AgendaError::io("reading settings directory", e))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AgendaError::io("reading settings entry", e))?
        {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping unreadable setting {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<StoredValue>(&content) {
                Ok(stored) => keys.push(stored.key),
                Err(e) => warn!("Skipping malformed setting {}: {}", path.display(), e),
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}
