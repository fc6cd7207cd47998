//! Connecting a sync core to its backend

use crate::config::SyncConfig;
use async_trait::async_trait;
use chatsync_backend::{Backend, BackendError, MemoryBackend};
use std::sync::Arc;
use tracing::info;

/// Establishes the backend connection for a sync core
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &SyncConfig) -> Result<Arc<dyn Backend>, BackendError>;
}

/// Resolves the endpoint URL to a backend
///
/// - `memory://` - fresh in-memory backend
/// - `sqlite://<file>` - SQLite database file (feature `sqlite`)
/// - `sqlite::memory:` - in-memory SQLite database (feature `sqlite`)
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointConnector;

#[async_trait]
impl Connector for EndpointConnector {
    async fn connect(&self, config: &SyncConfig) -> Result<Arc<dyn Backend>, BackendError> {
        let endpoint = config.endpoint_url.trim();
        if endpoint.is_empty() {
            return Err(BackendError::Connection("endpoint URL is empty".into()));
        }

        if endpoint == "sqlite::memory:" {
            return open_sqlite(None);
        }

        let (scheme, rest) = endpoint.split_once("://").ok_or_else(|| {
            BackendError::Connection(format!("endpoint {:?} has no scheme", endpoint))
        })?;

        match scheme.to_ascii_lowercase().as_str() {
            "memory" => {
                info!("Using in-memory backend");
                Ok(Arc::new(MemoryBackend::new()))
            }
            "sqlite" => {
                if rest.is_empty() {
                    return Err(BackendError::Connection(
                        "sqlite endpoint needs a database path".into(),
                    ));
                }
                open_sqlite(Some(rest))
            }
            other => Err(BackendError::Unsupported(format!(
                "unknown endpoint scheme {:?}",
                other
            ))),
        }
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(file: Option<&str>) -> Result<Arc<dyn Backend>, BackendError> {
    use chatsync_backend::SqliteBackend;

    let backend = match file {
        Some(file) => {
            info!(path = %file, "Opening SQLite backend");
            SqliteBackend::open(file)?
        }
        None => {
            info!("Opening in-memory SQLite backend");
            SqliteBackend::in_memory()?
        }
    };
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_file: Option<&str>) -> Result<Arc<dyn Backend>, BackendError> {
    Err(BackendError::Unsupported(
        "sqlite support was not compiled in".into(),
    ))
}

/// Hands out an existing backend, so several cores can share one store
#[derive(Clone)]
pub struct SharedBackend(pub Arc<dyn Backend>);

impl SharedBackend {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self(backend)
    }
}

#[async_trait]
impl Connector for SharedBackend {
    async fn connect(&self, _config: &SyncConfig) -> Result<Arc<dyn Backend>, BackendError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_endpoint() {
        let backend = EndpointConnector
            .connect(&SyncConfig::new("memory://"))
            .await
            .unwrap();
        assert_eq!(backend.stats().await.unwrap().node_count, 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_endpoints() {
        for endpoint in ["", "   ", "no-scheme", "ftp://host", "sqlite://"] {
            let result = EndpointConnector.connect(&SyncConfig::new(endpoint)).await;
            assert!(result.is_err(), "endpoint {:?} should fail", endpoint);
        }
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_memory_endpoint() {
        let backend = EndpointConnector
            .connect(&SyncConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        assert_eq!(backend.stats().await.unwrap().node_count, 0);
    }

    #[cfg(not(feature = "sqlite"))]
    #[tokio::test]
    async fn test_sqlite_unavailable_without_feature() {
        let result = EndpointConnector
            .connect(&SyncConfig::new("sqlite::memory:"))
            .await;
        assert!(matches!(result, Err(BackendError::Unsupported(_))));
    }
}
