//! Stale-while-revalidate protocols over a [`BlobStore`]
//!
//! Both protocols return a [`FetchUpdates`] stream fed by a background task.
//! A value is always written to the store before it is sent downstream, so
//! anything a subscriber has seen can be read back from the cache.
//!
//! Check-then-fetch runs under a per-key async mutex. Two callers racing on
//! the same key are serialized, and the second one's predicate sees the
//! timestamp written by the first.

use crate::cache::store::BlobStore;
use crate::error::{AgendaError, AgendaResult};
use chrono::{DateTime, Duration, Utc};
use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Pulse channel used for retry and request signals
pub type Signal = mpsc::Receiver<()>;

const UPDATE_BUFFER: usize = 16;

/// Append-only stream of values produced by a fetch protocol
///
/// An `Err` item is terminal. Dropping the handle stops the background task.
pub struct FetchUpdates<T> {
    rx: mpsc::Receiver<AgendaResult<T>>,
    task: JoinHandle<()>,
}

impl<T> FetchUpdates<T> {
    /// Wait for the next value, `None` once the protocol has finished
    pub async fn recv(&mut self) -> Option<AgendaResult<T>> {
        self.rx.recv().await
    }
}

impl<T> Stream for FetchUpdates<T> {
    type Item = AgendaResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for FetchUpdates<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Default)]
struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Drop locks nobody holds or waits on
        locks.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

/// Cache-aside fetcher shared by everything reading through the blob store
#[derive(Clone)]
pub struct CacheAsideFetcher {
    store: Arc<dyn BlobStore>,
    locks: Arc<KeyLocks>,
}

impl CacheAsideFetcher {
    /// Create a fetcher over `store`
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyLocks::default()),
        }
    }

    /// Underlying blob store
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Hold the check-then-fetch lock for `key`
    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        self.locks.lock_for(key).lock_owned().await
    }

    /// Creation time of the entry under `key`
    pub async fn created_at(&self, key: &str) -> AgendaResult<Option<DateTime<Utc>>> {
        self.store.get_created_at(key).await
    }

    /// Decode the cached value under `key`
    pub async fn get_cached<T: DeserializeOwned>(&self, key: &str) -> AgendaResult<Option<T>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| AgendaError::CacheCorrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Store raw bytes under `key` with an optional time-to-live
    pub async fn put_raw(
        &self,
        key: &str,
        payload: Vec<u8>,
        expiry: Option<Duration>,
    ) -> AgendaResult<()> {
        let expires_at = expiry.map(|ttl| Utc::now() + ttl);
        self.store.insert(key, payload, expires_at).await
    }

    /// Fetch unconditionally and store the result
    pub async fn refresh<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        expiry: Option<Duration>,
    ) -> AgendaResult<T>
    where
        T: Serialize,
        F: Fn() -> Fut,
        Fut: Future<Output = AgendaResult<T>>,
    {
        self.refresh_with(key, fetch, encode_json, expiry).await
    }

    /// Fetch unconditionally and store `encode(&value)` under the key lock
    ///
    /// For values that are not cached as JSON, such as downloaded files.
    pub async fn refresh_with<T, F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
        encode: E,
        expiry: Option<Duration>,
    ) -> AgendaResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AgendaResult<T>>,
        E: FnOnce(&T) -> AgendaResult<Vec<u8>>,
    {
        let _guard = self.lock_key(key).await;
        self.fetch_and_store_with(key, &fetch, encode, expiry).await
    }

    /// Drop every cached entry
    pub async fn invalidate_all(&self) -> AgendaResult<()> {
        self.store.invalidate_all().await
    }

    /// Serve the cached value, then refetch when `should_refetch` says so
    ///
    /// A miss fetches once and emits once. A hit emits the cached value and
    /// then, if `should_refetch(created_at)` holds, the refetched one. Every
    /// pulse on `retry` repeats the check without re-emitting the cached
    /// value. Fetch errors are sent as the final item.
    pub fn get_and_fetch_latest<T, F, Fut, P>(
        &self,
        key: impl Into<String>,
        fetch: F,
        should_refetch: P,
        retry: Option<Signal>,
        expiry: Option<Duration>,
    ) -> FetchUpdates<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgendaResult<T>> + Send + 'static,
        P: Fn(DateTime<Utc>) -> bool + Send + Sync + 'static,
    {
        let this = self.clone();
        let key = key.into();
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);

        let task = tokio::spawn(async move {
            let first = this
                .latest_cycle(&key, &fetch, &should_refetch, expiry, &tx, true)
                .await;
            if let Err(e) = first {
                let _ = tx.send(Err(e)).await;
                return;
            }

            let Some(mut retry) = retry else {
                return;
            };
            while wait_for_pulse(&mut retry, &tx).await {
                debug!("Retry signal for {}", key);
                let cycle = this
                    .latest_cycle(&key, &fetch, &should_refetch, expiry, &tx, false)
                    .await;
                if let Err(e) = cycle {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        });

        FetchUpdates { rx, task }
    }

    /// Serve the cached value and refetch only when asked to
    ///
    /// Emits the cached value if there is one and never fetches on its own.
    /// Each pulse on `requests` calls `should_refetch` with the current
    /// creation time (or `None`) and fetches, stores and emits when it holds.
    pub fn get_and_request_fetch<T, F, Fut, P>(
        &self,
        key: impl Into<String>,
        fetch: F,
        should_refetch: P,
        mut requests: Signal,
        expiry: Option<Duration>,
    ) -> FetchUpdates<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgendaResult<T>> + Send + 'static,
        P: Fn(Option<DateTime<Utc>>) -> bool + Send + Sync + 'static,
    {
        let this = self.clone();
        let key = key.into();
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);

        let task = tokio::spawn(async move {
            match this.get_cached::<T>(&key).await {
                Ok(Some(value)) => {
                    if tx.send(Ok(value)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => debug!("No cached value for {}, waiting for requests", key),
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }

            while wait_for_pulse(&mut requests, &tx).await {
                match this
                    .request_cycle(&key, &fetch, &should_refetch, expiry)
                    .await
                {
                    Ok(Some(value)) => {
                        if tx.send(Ok(value)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        FetchUpdates { rx, task }
    }

    async fn request_cycle<T, F, Fut, P>(
        &self,
        key: &str,
        fetch: &F,
        should_refetch: &P,
        expiry: Option<Duration>,
    ) -> AgendaResult<Option<T>>
    where
        T: Serialize,
        F: Fn() -> Fut,
        Fut: Future<Output = AgendaResult<T>>,
        P: Fn(Option<DateTime<Utc>>) -> bool,
    {
        let _guard = self.lock_key(key).await;
        let created_at = self.store.get_created_at(key).await?;
        if !should_refetch(created_at) {
            return Ok(None);
        }
        self.fetch_and_store(key, fetch, expiry).await.map(Some)
    }

    async fn latest_cycle<T, F, Fut, P>(
        &self,
        key: &str,
        fetch: &F,
        should_refetch: &P,
        expiry: Option<Duration>,
        tx: &mpsc::Sender<AgendaResult<T>>,
        emit_cached: bool,
    ) -> AgendaResult<()>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = AgendaResult<T>>,
        P: Fn(DateTime<Utc>) -> bool,
    {
        let _guard = self.lock_key(key).await;

        let Some(created_at) = self.store.get_created_at(key).await? else {
            debug!("Cache miss for {}", key);
            let value = self.fetch_and_store(key, fetch, expiry).await?;
            let _ = tx.send(Ok(value)).await;
            return Ok(());
        };

        if emit_cached {
            match self.get_cached::<T>(key).await? {
                Some(value) => {
                    if tx.send(Ok(value)).await.is_err() {
                        return Ok(());
                    }
                }
                None => {
                    // Expired between the two lookups
                    let value = self.fetch_and_store(key, fetch, expiry).await?;
                    let _ = tx.send(Ok(value)).await;
                    return Ok(());
                }
            }
        }

        if should_refetch(created_at) {
            debug!("Refetching {} (cached at {})", key, created_at);
            let value = self.fetch_and_store(key, fetch, expiry).await?;
            let _ = tx.send(Ok(value)).await;
        }

        Ok(())
    }

    async fn fetch_and_store<T, F, Fut>(
        &self,
        key: &str,
        fetch: &F,
        expiry: Option<Duration>,
    ) -> AgendaResult<T>
    where
        T: Serialize,
        F: Fn() -> Fut,
        Fut: Future<Output = AgendaResult<T>>,
    {
        self.fetch_and_store_with(key, fetch, encode_json, expiry).await
    }

    async fn fetch_and_store_with<T, F, Fut, E>(
        &self,
        key: &str,
        fetch: &F,
        encode: E,
        expiry: Option<Duration>,
    ) -> AgendaResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AgendaResult<T>>,
        E: FnOnce(&T) -> AgendaResult<Vec<u8>>,
    {
        let value = match fetch().await {
            Ok(value) => value,
            Err(e) => {
                warn!("Fetch for {} failed: {}", key, e);
                return Err(e);
            }
        };
        self.put_raw(key, encode(&value)?, expiry).await?;
        Ok(value)
    }
}

fn encode_json<T: Serialize>(value: &T) -> AgendaResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Wait for the next pulse, `false` once the signal or the subscriber is gone
async fn wait_for_pulse<T>(signal: &mut Signal, tx: &mpsc::Sender<T>) -> bool {
    tokio::select! {
        pulse = signal.recv() => pulse.is_some(),
        _ = tx.closed() => false,
    }
}
