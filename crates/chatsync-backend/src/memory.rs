//! In-memory backend

use crate::watch::{Watch, WatchRegistry};
use crate::{Backend, BackendError, BackendStats};
use async_trait::async_trait;
use chatsync_core::{tree, KeyGenerator, MessageKey, Path, RawValue};
use parking_lot::RwLock;
use serde_json::Map;
use std::sync::Arc;
use tracing::debug;

/// In-memory backend
///
/// Fast, volatile storage suitable for development, tests and several sync
/// cores sharing one process. Data is lost when the process exits.
pub struct MemoryBackend {
    /// Whole data tree
    root: RwLock<RawValue>,
    watchers: Arc<WatchRegistry>,
    keys: KeyGenerator,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(RawValue::Null),
            watchers: WatchRegistry::new(),
            keys: KeyGenerator::new(),
        }
    }

    /// Start from an existing tree
    pub fn with_data(root: RawValue) -> Self {
        let backend = Self::new();
        tree::set(&mut backend.root.write(), &Path::root(), root);
        backend
    }

    /// Copy of the whole tree
    pub fn dump(&self) -> RawValue {
        self.root.read().clone()
    }

    /// Deliver a connection error to every listener
    pub fn disconnect_watchers(&self, reason: &str) {
        self.watchers
            .fail_all(BackendError::Connection(reason.to_string()));
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read(&self, path: &Path) -> Result<Option<RawValue>, BackendError> {
        Ok(tree::get(&self.root.read(), path).cloned())
    }

    async fn write(&self, path: &Path, value: RawValue) -> Result<(), BackendError> {
        let mut root = self.root.write();
        tree::set(&mut root, path, value);
        self.watchers.notify(path, &root);
        debug!(path = %path, "Wrote value");
        Ok(())
    }

    async fn update(&self, path: &Path, fields: Map<String, RawValue>) -> Result<(), BackendError> {
        let mut root = self.root.write();
        tree::update(&mut root, path, fields)?;
        self.watchers.notify(path, &root);
        debug!(path = %path, "Updated fields");
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), BackendError> {
        let mut root = self.root.write();
        if tree::remove(&mut root, path) {
            self.watchers.notify(path, &root);
            debug!(path = %path, "Removed subtree");
        }
        Ok(())
    }

    fn watch(&self, path: &Path) -> Result<Watch, BackendError> {
        let root = self.root.read();
        Ok(self.watchers.register(path.clone(), &root))
    }

    fn new_key(&self, _path: &Path) -> MessageKey {
        self.keys.generate()
    }

    async fn stats(&self) -> Result<BackendStats, BackendError> {
        let root = self.root.read();
        let size_bytes = serde_json::to_vec(&*root)
            .map_err(|e| BackendError::Serialization(e.to_string()))?
            .len();
        Ok(BackendStats {
            node_count: tree::leaf_count(&root),
            watcher_count: self.watchers.len(),
            size_bytes,
        })
    }
}
