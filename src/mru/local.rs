//! This device's MRU store

use crate::error::{AgendaError, AgendaResult};
use crate::mru::record::MruRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const CHANGE_BUFFER: usize = 32;

/// Local visit store keyed by `id_ref`
#[async_trait]
pub trait LocalMruStore: Send + Sync {
    /// Record a visit, inserting or updating by `id_ref`
    async fn mark_visited(&self, record: MruRecord) -> AgendaResult<()>;

    /// The stored record for `id_ref`, if visited before
    async fn get(&self, id_ref: &str) -> AgendaResult<Option<MruRecord>>;

    /// The `n` most recently looked-at records, latest first
    async fn query_top_n(&self, n: usize) -> AgendaResult<Vec<MruRecord>>;

    /// Change notifications, one per successful write
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// In-memory store, optionally persisted to a JSON file
pub struct MemoryMruStore {
    records: RwLock<HashMap<String, MruRecord>>,
    path: Option<PathBuf>,
    changes: broadcast::Sender<()>,
}

impl MemoryMruStore {
    /// Create an empty, unpersisted store
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            records: RwLock::new(HashMap::new()),
            path: None,
            changes,
        }
    }

    /// Load records from `path` (if it exists) and persist every change there
    pub async fn open(path: impl Into<PathBuf>) -> AgendaResult<Self> {
        let path = path.into();
        let records = match fs::read_to_string(&path).await {
            Ok(content) => {
                let list: Vec<MruRecord> = serde_json::from_str(&content)?;
                list.into_iter().map(|r| (r.id_ref.clone(), r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(AgendaError::io(
                    format!("reading MRU store {}", path.display()),
                    e,
                ))
            }
        };
        debug!("Loaded {} MRU records from {}", records.len(), path.display());

        let mut store = Self::new();
        store.records = RwLock::new(records);
        store.path = Some(path);
        Ok(store)
    }

    /// Backing file, if persisted
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self, records: &HashMap<String, MruRecord>) -> AgendaResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AgendaError::io("creating MRU store directory", e))?;
        }

        let mut list: Vec<&MruRecord> = records.values().collect();
        list.sort_by(|a, b| b.last_looked_at.cmp(&a.last_looked_at));
        let content = serde_json::to_string_pretty(&list)?;
        fs::write(path, content)
            .await
            .map_err(|e| AgendaError::io(format!("writing MRU store {}", path.display()), e))
    }
}

impl Default for MemoryMruStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalMruStore for MemoryMruStore {
    async fn mark_visited(&self, record: MruRecord) -> AgendaResult<()> {
        let mut records = self.records.write().await;
        debug!("Visited {} ({})", record.id_ref, record.title);
        records.insert(record.id_ref.clone(), record);
        self.persist(&records).await?;
        drop(records);

        let _ = self.changes.send(());
        Ok(())
    }

    async fn get(&self, id_ref: &str) -> AgendaResult<Option<MruRecord>> {
        Ok(self.records.read().await.get(id_ref).cloned())
    }

    async fn query_top_n(&self, n: usize) -> AgendaResult<Vec<MruRecord>> {
        let records = self.records.read().await;
        let mut list: Vec<MruRecord> = records.values().cloned().collect();
        list.sort_by(|a, b| {
            b.last_looked_at
                .cmp(&a.last_looked_at)
                .then_with(|| a.id_ref.cmp(&b.id_ref))
        });
        list.truncate(n);
        Ok(list)
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn record(id: &str, looked_minutes_ago: i64) -> MruRecord {
        MruRecord {
            id_ref: id.to_string(),
            title: format!("Talk {}", id),
            start_time: Utc::now(),
            last_looked_at: Utc::now() - Duration::minutes(looked_minutes_ago),
        }
    }

    #[tokio::test]
    async fn repeat_visit_updates_in_place() {
        let store = MemoryMruStore::new();
        store.mark_visited(record("t1", 30)).await.unwrap();
        store.mark_visited(record("t2", 20)).await.unwrap();
        store.mark_visited(record("t1", 0)).await.unwrap();

        let top = store.query_top_n(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id_ref, "t1");
        assert_eq!(top[1].id_ref, "t2");
    }

    #[tokio::test]
    async fn get_returns_stored_record() {
        let store = MemoryMruStore::new();
        assert!(store.get("t1").await.unwrap().is_none());

        store.mark_visited(record("t1", 10)).await.unwrap();
        let found = store.get("t1").await.unwrap().unwrap();
        assert_eq!(found.title, "Talk t1");
        assert!(store.get("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_top_n_truncates() {
        let store = MemoryMruStore::new();
        for i in 0..5 {
            store.mark_visited(record(&format!("t{}", i), i)).await.unwrap();
        }
        let top = store.query_top_n(3).await.unwrap();
        let ids: Vec<&str> = top.iter().map(|r| r.id_ref.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1", "t2"]);
    }

    #[tokio::test]
    async fn writes_notify_subscribers() {
        let store = MemoryMruStore::new();
        let mut changes = store.subscribe();
        store.mark_visited(record("t1", 0)).await.unwrap();
        assert!(changes.try_recv().is_ok());
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mru").join("local.json");

        let store = MemoryMruStore::open(&path).await.unwrap();
        store.mark_visited(record("t1", 5)).await.unwrap();
        drop(store);

        let reopened = MemoryMruStore::open(&path).await.unwrap();
        let top = reopened.query_top_n(5).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].title, "Talk t1");
    }
}
