//! SQLite backend

use crate::watch::{Watch, WatchRegistry};
use crate::{Backend, BackendError, BackendStats};
use async_trait::async_trait;
use chatsync_core::{tree, KeyGenerator, MessageKey, Path, RawValue};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Map;
use std::sync::Arc;
use tracing::debug;

const ROOT_ID: &str = "root";

/// SQLite backend
///
/// Embedded persistence for a single node. The tree is stored as one JSON
/// document; every mutation is a load-modify-store transaction.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    watchers: Arc<WatchRegistry>,
    keys: KeyGenerator,
}

impl SqliteBackend {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, BackendError> {
        let conn = Connection::open(path)
            .map_err(|e| BackendError::Database(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BackendError::Database(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, BackendError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tree (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
            );
            "#,
        )
        .map_err(|e| BackendError::Database(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            watchers: WatchRegistry::new(),
            keys: KeyGenerator::new(),
        })
    }

    /// Apply `op` to the stored tree inside one transaction and notify
    /// listeners of `path` with the committed result
    fn mutate<F>(&self, path: &Path, op: F) -> Result<(), BackendError>
    where
        F: FnOnce(&mut RawValue) -> Result<bool, BackendError>,
    {
        let mut conn = self.conn.lock();
        let txn = conn
            .transaction()
            .map_err(|e| BackendError::Database(e.to_string()))?;

        let mut root = load_root(&txn)?;
        if !op(&mut root)? {
            return Ok(());
        }

        let data = serde_json::to_string(&root)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        txn.execute(
            r#"
            INSERT INTO tree (id, data, updated_at)
            VALUES (?1, ?2, strftime('%s', 'now') * 1000)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![ROOT_ID, data],
        )
        .map_err(|e| BackendError::Database(e.to_string()))?;
        txn.commit()
            .map_err(|e| BackendError::Database(e.to_string()))?;

        self.watchers.notify(path, &root);
        Ok(())
    }

    fn snapshot(&self) -> Result<RawValue, BackendError> {
        let conn = self.conn.lock();
        load_root(&conn)
    }
}

fn load_root(conn: &Connection) -> Result<RawValue, BackendError> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM tree WHERE id = ?1",
            params![ROOT_ID],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| BackendError::Database(e.to_string()))?;

    match data {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| BackendError::Serialization(e.to_string())),
        None => Ok(RawValue::Null),
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn read(&self, path: &Path) -> Result<Option<RawValue>, BackendError> {
        let root = self.snapshot()?;
        Ok(tree::get(&root, path).cloned())
    }

    async fn write(&self, path: &Path, value: RawValue) -> Result<(), BackendError> {
        self.mutate(path, |root| {
            tree::set(root, path, value);
            Ok(true)
        })?;
        debug!(path = %path, "Wrote value");
        Ok(())
    }

    async fn update(&self, path: &Path, fields: Map<String, RawValue>) -> Result<(), BackendError> {
        self.mutate(path, |root| {
            tree::update(root, path, fields)?;
            Ok(true)
        })?;
        debug!(path = %path, "Updated fields");
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), BackendError> {
        self.mutate(path, |root| Ok(tree::remove(root, path)))
    }

    fn watch(&self, path: &Path) -> Result<Watch, BackendError> {
        // Hold the connection so no mutation slips between load and register
        let conn = self.conn.lock();
        let root = load_root(&conn)?;
        Ok(self.watchers.register(path.clone(), &root))
    }

    fn new_key(&self, _path: &Path) -> MessageKey {
        self.keys.generate()
    }

    async fn stats(&self) -> Result<BackendStats, BackendError> {
        let conn = self.conn.lock();
        let size_bytes: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM tree",
                [],
                |row| row.get(0),
            )
            .map_err(|e| BackendError::Database(e.to_string()))?;
        let root = load_root(&conn)?;

        Ok(BackendStats {
            node_count: tree::leaf_count(&root),
            watcher_count: self.watchers.len(),
            size_bytes: size_bytes as usize,
        })
    }
}
