//! Change listeners shared by the backends

use crate::BackendError;
use chatsync_core::{tree, Path, RawValue};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::trace;

/// One delivery to a listener: the full snapshot at the watched path
/// (`null` when absent), or a backend error
pub type WatchEvent = Result<RawValue, BackendError>;

struct Watcher {
    path: Path,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

/// Registry of active listeners
///
/// Backends call [`WatchRegistry::notify`] after each mutation while still
/// holding their data lock, so listeners see snapshots in mutation order.
pub struct WatchRegistry {
    watchers: DashMap<u64, Watcher>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            watchers: DashMap::new(),
            next_id: AtomicU64::new(0),
        })
    }

    /// Register a listener at `path`
    ///
    /// If data exists there it is queued immediately, so a listener that
    /// registers after a read still converges on the current state.
    pub fn register(self: &Arc<Self>, path: Path, root: &RawValue) -> Watch {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(current) = tree::get(root, &path) {
            let _ = tx.send(Ok(current.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(id, path = %path, "Watcher registered");
        self.watchers.insert(id, Watcher { path: path.clone(), tx });

        Watch {
            id,
            path,
            registry: Arc::downgrade(self),
            rx,
        }
    }

    /// Push the new snapshot to every listener whose path overlaps `changed`
    pub fn notify(&self, changed: &Path, root: &RawValue) {
        let mut closed = Vec::new();

        for entry in self.watchers.iter() {
            let watcher = entry.value();
            if !watcher.path.overlaps(changed) {
                continue;
            }
            let snapshot = tree::get(root, &watcher.path)
                .cloned()
                .unwrap_or(RawValue::Null);
            if watcher.tx.send(Ok(snapshot)).is_err() {
                closed.push(*entry.key());
            }
        }

        for id in closed {
            self.watchers.remove(&id);
        }
    }

    /// Deliver an error to every listener
    pub fn fail_all(&self, error: BackendError) {
        for entry in self.watchers.iter() {
            let _ = entry.value().tx.send(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    fn unregister(&self, id: u64) {
        if self.watchers.remove(&id).is_some() {
            trace!(id, "Watcher unregistered");
        }
    }
}

/// Handle to a registered listener; dropping it unregisters
pub struct Watch {
    id: u64,
    path: Path,
    registry: Weak<WatchRegistry>,
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl Watch {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next event; `None` once the backend is gone
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Take an already queued event without waiting
    pub fn try_next(&mut self) -> Option<WatchEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}
