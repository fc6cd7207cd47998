//! chatsync Data Backends
//!
//! Provides the remote store the sync core talks to:
//! - Memory (default): Fast, volatile storage
//! - SQLite: Embedded persistence
//!
//! Every backend exposes the same path-addressed JSON tree with change
//! notifications through [`Watch`] handles.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod watch;

use async_trait::async_trait;
use chatsync_core::{MessageKey, Path, RawValue};
use serde_json::Map;

/// Backend trait
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read the subtree at `path`; `None` when nothing is stored there
    async fn read(&self, path: &Path) -> Result<Option<RawValue>, BackendError>;

    /// Replace the subtree at `path`
    async fn write(&self, path: &Path, value: RawValue) -> Result<(), BackendError>;

    /// Merge named fields into the subtree at `path`
    async fn update(&self, path: &Path, fields: Map<String, RawValue>) -> Result<(), BackendError>;

    /// Delete the subtree at `path`
    async fn remove(&self, path: &Path) -> Result<(), BackendError>;

    /// Register a change listener at `path`
    fn watch(&self, path: &Path) -> Result<Watch, BackendError>;

    /// Mint a new key for a child of `path`
    fn new_key(&self, path: &Path) -> MessageKey;

    /// Get backend statistics
    async fn stats(&self) -> Result<BackendStats, BackendError>;
}

/// Backend error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl From<chatsync_core::Error> for BackendError {
    fn from(e: chatsync_core::Error) -> Self {
        BackendError::Serialization(e.to_string())
    }
}

/// Backend statistics
#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    pub node_count: usize,
    pub watcher_count: usize,
    pub size_bytes: usize,
}

pub use memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use watch::{Watch, WatchEvent, WatchRegistry};
