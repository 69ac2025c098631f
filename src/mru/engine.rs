//! Multi-device MRU merge engine
//!
//! Combines this device's local store with every other device's snapshot in
//! the shared settings container, and keeps this device's own snapshot up to
//! date whenever the local store changes.

use crate::error::{AgendaError, AgendaResult};
use crate::mru::local::LocalMruStore;
use crate::mru::record::{merge, MachineSnapshot, MergedMruView, DEFAULT_TOP_N};
use crate::mru::settings::SettingsContainer;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Environment override for the machine name
pub const MACHINE_NAME_ENV: &str = "AGENDA_MACHINE_NAME";

const VIEW_BUFFER: usize = 8;

/// Stream of merged views; dropping it stops the engine's observer task
pub struct MergedMruStream {
    rx: mpsc::Receiver<MergedMruView>,
    task: JoinHandle<()>,
}

impl MergedMruStream {
    /// Wait for the next distinct view
    pub async fn recv(&mut self) -> Option<MergedMruView> {
        self.rx.recv().await
    }
}

impl Stream for MergedMruStream {
    type Item = MergedMruView;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for MergedMruStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Merge engine over a local store and a replicated settings container
pub struct MruMergeEngine {
    local: Arc<dyn LocalMruStore>,
    settings: Arc<dyn SettingsContainer>,
    top_n: usize,
    machine_name: RwLock<String>,
    started: AtomicBool,
    publish_lock: AsyncMutex<()>,
}

impl MruMergeEngine {
    /// Create an engine named after this host
    pub fn new(local: Arc<dyn LocalMruStore>, settings: Arc<dyn SettingsContainer>) -> Self {
        Self {
            local,
            settings,
            top_n: DEFAULT_TOP_N,
            machine_name: RwLock::new(resolve_machine_name()),
            started: AtomicBool::new(false),
            publish_lock: AsyncMutex::new(()),
        }
    }

    /// Keep `top_n` records in views and snapshots
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Records kept per view
    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Name this device publishes its snapshot under
    pub fn machine_name(&self) -> String {
        self.machine_name
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Rename this device; only allowed before the engine starts observing
    pub fn set_machine_name(&self, name: impl Into<String>) -> AgendaResult<()> {
        let name = name.into();
        if self.started.load(Ordering::SeqCst) {
            return Err(AgendaError::InvalidOperation(format!(
                "cannot rename machine to {} after the MRU engine started",
                name
            )));
        }
        if name.trim().is_empty() {
            return Err(AgendaError::InvalidOperation(
                "machine name must not be empty".to_string(),
            ));
        }
        *self.machine_name.write().unwrap_or_else(|e| e.into_inner()) = name;
        Ok(())
    }

    /// Merge the current local records with every other device's snapshot
    pub async fn current_view(&self) -> AgendaResult<MergedMruView> {
        let machine = self.machine_name();
        let local = self.local.query_top_n(self.top_n).await?;
        let remote = self.remote_snapshots(&machine).await;

        let sources = std::iter::once(local.as_slice())
            .chain(remote.iter().map(|s| s.records.as_slice()));
        Ok(merge(sources, self.top_n))
    }

    /// Write this device's top-N local records to its snapshot slot
    pub async fn publish_local(&self) -> AgendaResult<MachineSnapshot> {
        // Serialized so an older read never lands after a newer one
        let _publishing = self.publish_lock.lock().await;
        let snapshot = MachineSnapshot::new(
            self.machine_name(),
            self.local.query_top_n(self.top_n).await?,
        );
        let serialized = serde_json::to_string(&snapshot)?;
        self.settings.set(&snapshot.machine_name, serialized).await?;
        debug!(
            "Published {} MRU records for {}",
            snapshot.records.len(),
            snapshot.machine_name
        );
        Ok(snapshot)
    }

    /// Observe both sources and emit a view whenever its order changes
    ///
    /// The machine name is frozen from here on.
    pub fn subscribe(self: &Arc<Self>) -> MergedMruStream {
        self.started.store(true, Ordering::SeqCst);
        info!("MRU engine observing as {}", self.machine_name());

        let engine = Arc::clone(self);
        let mut local_changes = engine.local.subscribe();
        let mut remote_changes = engine.settings.subscribe();
        let (tx, rx) = mpsc::channel(VIEW_BUFFER);

        let task = tokio::spawn(async move {
            engine.spawn_publish();
            let mut last: Option<MergedMruView> = None;

            loop {
                match engine.current_view().await {
                    Ok(view) if last.as_ref().is_some_and(|prev| prev.same_order(&view)) => {
                        debug!("MRU order unchanged, not emitting");
                    }
                    Ok(view) => {
                        if tx.send(view.clone()).await.is_err() {
                            break;
                        }
                        last = Some(view);
                    }
                    Err(e) => warn!("Failed to merge MRU view: {}", e),
                }

                tokio::select! {
                    changed = local_changes.recv() => match changed {
                        Ok(()) | Err(RecvError::Lagged(_)) => engine.spawn_publish(),
                        Err(RecvError::Closed) => break,
                    },
                    changed = remote_changes.recv() => match changed {
                        Ok(()) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                    _ = tx.closed() => break,
                }
            }
            debug!("MRU engine observer stopped");
        });

        MergedMruStream { rx, task }
    }

    fn spawn_publish(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.publish_local().await {
                warn!("Failed to publish MRU snapshot: {}", e);
            }
        });
    }

    /// Snapshots of every other machine; unreadable ones are skipped
    async fn remote_snapshots(&self, machine: &str) -> Vec<MachineSnapshot> {
        let keys = match self.settings.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list MRU snapshots: {}", e);
                return Vec::new();
            }
        };

        let mut snapshots = Vec::new();
        for key in keys.into_iter().filter(|k| k != machine) {
            match self.settings.get(&key).await {
                Ok(Some(raw)) => match serde_json::from_str::<MachineSnapshot>(&raw) {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(e) => warn!("Ignoring malformed MRU snapshot from {}: {}", key, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Failed to read MRU snapshot from {}: {}", key, e),
            }
        }
        snapshots
    }
}

/// Resolve this device's name from the environment or the host name
pub fn resolve_machine_name() -> String {
    std::env::var(MACHINE_NAME_ENV)
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(host_name)
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn host_name() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is writable for its full length; gethostname NUL-terminates
    // on success when the name fits
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    (!name.is_empty()).then_some(name)
}

#[cfg(not(unix))]
fn host_name() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
