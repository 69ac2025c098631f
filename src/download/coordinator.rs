//! Per-resource download lifecycle
//!
//! A coordinator owns one resource's [`DownloadState`]. Triggering it checks
//! the cache, asks the source whether its freshness token moved, and routes
//! any download through the shared [`ConcurrencyGate`]. Failures are logged
//! and folded into state; they never reach observers as errors.

use crate::cache::CacheAsideFetcher;
use crate::download::source::{FetchedResource, ResourceSource};
use crate::error::{AgendaError, AgendaResult};
use crate::gate::ConcurrencyGate;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

const VERSION_BUFFER: usize = 16;

/// Observable download state for one resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadState {
    /// A download is admitted and running
    pub is_downloading: bool,

    /// A cached copy exists
    pub is_downloaded: bool,

    /// Message of the last failed attempt
    pub last_error: Option<String>,
}

/// Notification sent once per successful download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCached {
    /// Data key the payload was cached under
    pub key: String,

    /// Freshness token of the new version
    pub token: String,

    /// Payload size in bytes
    pub size: usize,
}

/// Result of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A new version was downloaded and cached
    Fetched,
    /// The cached copy matches the source
    UpToDate,
    /// The attempt failed; see `DownloadState::last_error`
    Failed,
}

/// Download coordinator for a single resource
pub struct ResourceDownloadCoordinator {
    key: String,
    source: Arc<dyn ResourceSource>,
    cache: CacheAsideFetcher,
    gate: ConcurrencyGate,
    expiry: Option<Duration>,
    state: watch::Sender<DownloadState>,
    versions: broadcast::Sender<VersionCached>,
    trigger_lock: Mutex<()>,
}

impl ResourceDownloadCoordinator {
    /// Create a coordinator caching `source` under `key`
    pub fn new(
        key: impl Into<String>,
        source: Arc<dyn ResourceSource>,
        cache: CacheAsideFetcher,
        gate: ConcurrencyGate,
    ) -> Self {
        let (state, _) = watch::channel(DownloadState::default());
        let (versions, _) = broadcast::channel(VERSION_BUFFER);
        Self {
            key: key.into(),
            source,
            cache,
            gate,
            expiry: None,
            state,
            versions,
            trigger_lock: Mutex::new(()),
        }
    }

    /// Expire cached payloads after `ttl`
    pub fn with_expiry(mut self, ttl: Duration) -> Self {
        self.expiry = Some(ttl);
        self
    }

    /// Resource name
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cache key of the payload
    pub fn data_key(&self) -> String {
        format!("resource:{}", self.key)
    }

    /// Cache key of the payload's freshness token
    ///
    /// Payloads and tokens live under different prefixes, so no resource
    /// name can make one collide with the other.
    pub fn token_key(&self) -> String {
        format!("token:{}", self.key)
    }

    /// Snapshot of the current state
    pub fn state(&self) -> DownloadState {
        self.state.borrow().clone()
    }

    /// Check the cache, then subscribe to state changes
    ///
    /// The check makes `is_downloaded` correct for observers arriving after
    /// a download elsewhere already populated the cache.
    pub async fn watch_state(&self) -> watch::Receiver<DownloadState> {
        if let Err(e) = self.sync_from_cache().await {
            warn!("Cache check for {} failed: {}", self.key, e);
        }
        self.state.subscribe()
    }

    /// Subscribe to "new version cached" notifications
    pub fn new_versions(&self) -> broadcast::Receiver<VersionCached> {
        self.versions.subscribe()
    }

    /// Cached payload, if any
    pub async fn cached_payload(&self) -> AgendaResult<Option<Vec<u8>>> {
        self.cache.store().get(&self.data_key()).await
    }

    /// Token of the cached payload, if any
    pub async fn cached_token(&self) -> AgendaResult<Option<String>> {
        let Some(bytes) = self.cache.store().get(&self.token_key()).await? else {
            return Ok(None);
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| AgendaError::CacheCorrupt {
                key: self.token_key(),
                reason: e.to_string(),
            })
    }

    /// When the cached payload was written
    pub async fn cached_at(&self) -> AgendaResult<Option<DateTime<Utc>>> {
        self.cache.created_at(&self.data_key()).await
    }

    /// Download the resource if it is missing or the source changed
    ///
    /// Never returns an error: failures end up in `last_error` and leave
    /// `is_downloaded` as it was. There is no automatic retry.
    pub async fn trigger_download_or_update(&self) -> DownloadOutcome {
        let _trigger = self.trigger_lock.lock().await;

        match self.download_if_needed().await {
            Ok(Some(version)) => {
                info!("Cached new version of {} ({} bytes)", self.key, version.size);
                // No receivers is fine
                let _ = self.versions.send(version);
                DownloadOutcome::Fetched
            }
            Ok(None) => {
                debug!("{} is up to date", self.key);
                DownloadOutcome::UpToDate
            }
            Err(e) => {
                warn!("Download of {} failed: {}", self.key, e);
                self.state.send_modify(|s| {
                    s.is_downloading = false;
                    s.last_error = Some(e.to_string());
                });
                DownloadOutcome::Failed
            }
        }
    }

    async fn sync_from_cache(&self) -> AgendaResult<bool> {
        let cached = self.cache.created_at(&self.data_key()).await?.is_some();
        if cached {
            self.state.send_if_modified(|s| {
                let changed = !s.is_downloaded;
                s.is_downloaded = true;
                changed
            });
        }
        Ok(cached)
    }

    async fn download_if_needed(&self) -> AgendaResult<Option<VersionCached>> {
        if self.sync_from_cache().await? && !self.source_changed().await? {
            return Ok(None);
        }

        let fetched = self.gate.run_guarded(self.download()).await?;

        Ok(Some(VersionCached {
            key: self.data_key(),
            token: fetched.token,
            size: fetched.payload.len(),
        }))
    }

    // Payload first: a token without its payload would mask a partial write
    async fn download(&self) -> AgendaResult<FetchedResource> {
        let downloading = DownloadingFlag::raise(&self.state);
        debug!("Downloading {} from {}", self.key, self.source.describe());

        let fetched = self
            .cache
            .refresh_with(
                &self.data_key(),
                || self.source.fetch(),
                |fetched: &FetchedResource| Ok(fetched.payload.clone()),
                self.expiry,
            )
            .await?;
        self.cache
            .put_raw(
                &self.token_key(),
                fetched.token.as_bytes().to_vec(),
                self.expiry,
            )
            .await?;

        downloading.complete();
        Ok(fetched)
    }

    async fn source_changed(&self) -> AgendaResult<bool> {
        let Some(cached) = self.cached_token().await? else {
            debug!("No cached token for {}, treating as changed", self.key);
            return Ok(true);
        };
        let current = self.source.freshness_token().await?;
        Ok(current.as_deref() != Some(cached.as_str()))
    }
}

/// Holds `is_downloading` high until completed or dropped
struct DownloadingFlag<'a> {
    state: &'a watch::Sender<DownloadState>,
    completed: bool,
}

impl<'a> DownloadingFlag<'a> {
    fn raise(state: &'a watch::Sender<DownloadState>) -> Self {
        state.send_modify(|s| s.is_downloading = true);
        Self {
            state,
            completed: false,
        }
    }

    /// Lower the flag and mark the resource downloaded in one update
    fn complete(mut self) {
        self.state.send_modify(|s| {
            s.is_downloading = false;
            s.is_downloaded = true;
            s.last_error = None;
        });
        self.completed = true;
    }
}

impl Drop for DownloadingFlag<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.state
                .send_if_modified(|s| std::mem::replace(&mut s.is_downloading, false));
        }
    }
}
