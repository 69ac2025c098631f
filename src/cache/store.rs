//! Key/value blob stores with creation time and expiry

use crate::error::{AgendaError, AgendaResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// A single cached blob
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cache key
    pub key: String,

    /// Raw payload
    pub payload: Vec<u8>,

    /// When the entry was written
    pub created_at: DateTime<Utc>,

    /// When the entry stops being live
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Create a new entry stamped with the current time
    pub fn new(key: &str, payload: Vec<u8>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            key: key.to_string(),
            payload,
            created_at: Utc::now(),
            expires_at,
        }
    }

    /// Check if entry is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// Key/value blob store contract
///
/// A missing or expired key is `Ok(None)`, never an error. Writing an
/// existing key replaces the entry.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Get the payload stored under `key`
    async fn get(&self, key: &str) -> AgendaResult<Option<Vec<u8>>>;

    /// Get the creation time of the entry stored under `key`
    async fn get_created_at(&self, key: &str) -> AgendaResult<Option<DateTime<Utc>>>;

    /// Store `payload` under `key`, replacing any previous entry
    async fn insert(
        &self,
        key: &str,
        payload: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AgendaResult<()>;

    /// Remove a single entry
    async fn invalidate(&self, key: &str) -> AgendaResult<()>;

    /// Remove every entry
    async fn invalidate_all(&self) -> AgendaResult<()>;
}

/// In-process blob store
#[derive(Default)]
pub struct MemoryBlobStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired())
            .count()
    }

    /// Whether the store holds no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn live(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        entries.get(key).filter(|e| !e.is_expired()).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> AgendaResult<Option<Vec<u8>>> {
        Ok(self.live(key).await.map(|e| e.payload))
    }

    async fn get_created_at(&self, key: &str) -> AgendaResult<Option<DateTime<Utc>>> {
        Ok(self.live(key).await.map(|e| e.created_at))
    }

    async fn insert(
        &self,
        key: &str,
        payload: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AgendaResult<()> {
        let entry = CacheEntry::new(key, payload, expires_at);
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> AgendaResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn invalidate_all(&self) -> AgendaResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// On-disk entry metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    size: u64,
}

/// Directory-backed blob store
///
/// Each entry is a `<sha256>.bin` payload next to a `<sha256>.json`
/// metadata file. The metadata file is written last, so an entry is live
/// only once its payload is fully on disk.
pub struct FileBlobStore {
    cache_dir: PathBuf,
}

impl FileBlobStore {
    /// Open (and create if needed) a store rooted at `cache_dir`
    pub async fn open(cache_dir: impl Into<PathBuf>) -> AgendaResult<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).await.map_err(|e| {
            AgendaError::io(format!("creating cache dir {}", cache_dir.display()), e)
        })?;
        debug!("Opened blob store at {}", cache_dir.display());
        Ok(Self { cache_dir })
    }

    /// Store directory
    pub fn path(&self) -> &Path {
        &self.cache_dir
    }

    fn stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", Self::stem(key)))
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.bin", Self::stem(key)))
    }

    async fn write_atomic(&self, path: &Path, content: &[u8]) -> AgendaResult<()> {
        let tmp = self
            .cache_dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, content)
            .await
            .map_err(|e| AgendaError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| AgendaError::io(format!("renaming into {}", path.display()), e))
    }

    async fn read_meta(&self, key: &str) -> AgendaResult<Option<EntryMeta>> {
        let path = self.meta_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AgendaError::io(
                    format!("reading cache metadata {}", path.display()),
                    e,
                ))
            }
        };

        let meta: EntryMeta =
            serde_json::from_str(&content).map_err(|e| AgendaError::CacheCorrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if meta.expires_at.is_some_and(|at| Utc::now() >= at) {
            debug!("Cache entry {} is expired", key);
            self.invalidate(key).await?;
            return Ok(None);
        }

        Ok(Some(meta))
    }

    async fn remove_if_exists(path: &Path) -> AgendaResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AgendaError::io(format!("removing {}", path.display()), e)),
        }
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> AgendaResult<Option<Vec<u8>>> {
        if self.read_meta(key).await?.is_none() {
            return Ok(None);
        }

        let path = self.payload_path(key);
        match fs::read(&path).await {
            Ok(payload) => Ok(Some(payload)),
            // Invalidated between the two reads
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgendaError::io(
                format!("reading cache payload {}", path.display()),
                e,
            )),
        }
    }

    async fn get_created_at(&self, key: &str) -> AgendaResult<Option<DateTime<Utc>>> {
        Ok(self.read_meta(key).await?.map(|m| m.created_at))
    }

    async fn insert(
        &self,
        key: &str,
        payload: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AgendaResult<()> {
        let meta = EntryMeta {
            key: key.to_string(),
            created_at: Utc::now(),
            expires_at,
            size: payload.len() as u64,
        };

        self.write_atomic(&self.payload_path(key), &payload).await?;
        self.write_atomic(&self.meta_path(key), &serde_json::to_vec_pretty(&meta)?)
            .await?;

        debug!("Cached {} ({} bytes)", key, meta.size);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> AgendaResult<()> {
        Self::remove_if_exists(&self.meta_path(key)).await?;
        Self::remove_if_exists(&self.payload_path(key)).await
    }

    async fn invalidate_all(&self) -> AgendaResult<()> {
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| AgendaError::io("reading cache directory", e))?;

        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AgendaError::io("reading cache entry", e))?
        {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext == "json" || ext == "bin" || ext == "tmp")
            {
                Self::remove_if_exists(&path).await?;
                removed += 1;
            }
        }

        debug!("Invalidated blob store ({} files removed)", removed);
        Ok(())
    }
}
