//! Sync Core - bridges a backend and local consumers
//!
//! All backend failures are converted to [`chatsync_core::Error`] here and
//! logged; nothing from the backend reaches callers untyped.

use crate::config::SyncConfig;
use crate::connector::{Connector, EndpointConnector};
use chatsync_backend::{Backend, BackendStats, Watch};
use chatsync_core::{
    format_timestamp, Clock, Error, MessageCollection, MessageKey, MessageRecord, Path, RawValue,
    Result, SystemClock,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Map;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sample messages written to an empty collection on first start
pub const DEFAULT_SEED_MESSAGES: [&str; 3] = [
    "Hello! Welcome to our chat app!",
    "This is a sample message",
    "Feel free to add your own messages!",
];

/// Spacing between seed record timestamps
const SEED_SPACING_MINUTES: i64 = 1;

enum State {
    NotReady,
    Ready(Arc<dyn Backend>),
}

/// Owns the backend connection and readiness of one client
///
/// Until [`SyncCore::initialize`] succeeds every operation fails with
/// [`Error::NotInitialized`] without touching the backend.
pub struct SyncCore {
    config: SyncConfig,
    connector: Arc<dyn Connector>,
    state: RwLock<State>,
    /// Serializes concurrent `initialize` calls
    init_lock: Mutex<()>,
    /// Bumped on shutdown; ends every stream opened before it
    epoch: watch::Sender<u64>,
}

impl SyncCore {
    /// Create a core that resolves `config.endpoint_url` on initialize
    pub fn new(config: SyncConfig) -> Self {
        Self::with_connector(config, Arc::new(EndpointConnector))
    }

    pub fn with_connector(config: SyncConfig, connector: Arc<dyn Connector>) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            config,
            connector,
            state: RwLock::new(State::NotReady),
            init_lock: Mutex::new(()),
            epoch,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), State::Ready(_))
    }

    /// Connect to the backend
    ///
    /// Reuses the existing connection when already initialized. On failure the
    /// core stays not ready; call again to retry.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;

        if self.is_ready() {
            debug!("Sync core already initialized, reusing connection");
            return Ok(());
        }

        Path::new(&self.config.collection_path).map_err(|e| {
            error!(error = %e, "Invalid collection path");
            Error::init(e.to_string())
        })?;

        let backend = self.connector.connect(&self.config).await.map_err(|e| {
            error!(endpoint = %self.config.endpoint_url, error = %e, "Could not connect to backend");
            Error::init(e.to_string())
        })?;

        *self.state.write() = State::Ready(backend);
        info!(endpoint = %self.config.endpoint_url, "Sync core initialized");

        if self.config.seed_on_startup {
            if let Err(e) = self
                .seed_if_empty(&self.config.collection_path, &DEFAULT_SEED_MESSAGES, &SystemClock)
                .await
            {
                warn!(error = %e, "Error adding sample data");
            }
        }

        Ok(())
    }

    /// Drop the connection and end every stream and subscription
    pub fn shutdown(&self) {
        let was_ready = matches!(
            std::mem::replace(&mut *self.state.write(), State::NotReady),
            State::Ready(_)
        );
        self.epoch.send_modify(|epoch| *epoch += 1);

        if was_ready {
            info!("Sync core shut down");
        }
    }

    fn backend(&self) -> Result<Arc<dyn Backend>> {
        match &*self.state.read() {
            State::Ready(backend) => Ok(backend.clone()),
            State::NotReady => {
                error!("Sync core is not initialized yet");
                Err(Error::NotInitialized)
            }
        }
    }

    /// Write the seed records if and only if nothing exists at `collection`
    ///
    /// Record `i` is stamped `clock.now() + i minutes`. Writes are awaited one
    /// after another so keys and timestamps follow the seed order. Returns the
    /// number of records written.
    pub async fn seed_if_empty<S: AsRef<str>>(
        &self,
        collection: &str,
        seeds: &[S],
        clock: &dyn Clock,
    ) -> Result<usize> {
        let backend = self.backend()?;
        let collection = Path::new(collection)?;

        let existing = backend
            .read(&collection)
            .await
            .map_err(|e| Error::read(e.to_string()))?;
        if existing.is_some() {
            debug!(path = %collection, "Collection already has data, skipping seed");
            return Ok(0);
        }

        let start = clock.now();
        for (i, text) in seeds.iter().enumerate() {
            let record = MessageRecord {
                text: text.as_ref().to_string(),
                timestamp: format_timestamp(
                    start + chrono::Duration::minutes(i as i64 * SEED_SPACING_MINUTES),
                ),
            };
            self.write_record(&backend, &collection, &record).await?;
        }

        info!(path = %collection, count = seeds.len(), "Sample messages added");
        Ok(seeds.len())
    }

    /// Serialize `value` and write it at `path`, replacing what was there
    pub async fn create<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<()> {
        let backend = self.backend()?;
        let path = Path::new(path)?;
        let raw = serde_json::to_value(value).map_err(|e| Error::write(e.to_string()))?;

        backend.write(&path, raw).await.map_err(|e| {
            warn!(path = %path, error = %e, "Error creating data");
            Error::write(e.to_string())
        })?;

        debug!(path = %path, "Data created");
        Ok(())
    }

    /// Raw value at `path`; `Ok(None)` when nothing exists there
    pub async fn read(&self, path: &str) -> Result<Option<RawValue>> {
        let backend = self.backend()?;
        let path = Path::new(path)?;

        let value = backend.read(&path).await.map_err(|e| {
            warn!(path = %path, error = %e, "Error reading data");
            Error::read(e.to_string())
        })?;

        if value.is_none() {
            debug!(path = %path, "No data exists");
        }
        Ok(value)
    }

    /// Read and deserialize the value at `path`
    pub async fn read_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.read(path).await? {
            Some(raw) => serde_json::from_value(raw)
                .map(Some)
                .map_err(|e| Error::parse(e.to_string())),
            None => Ok(None),
        }
    }

    /// Read a message collection; an absent collection is empty
    pub async fn read_collection(&self, path: &str) -> Result<MessageCollection> {
        let raw = self.read(path).await?.unwrap_or(RawValue::Null);
        MessageCollection::from_raw(&raw)
    }

    /// Merge `fields` into the data at `path` without touching siblings
    pub async fn update(&self, path: &str, fields: Map<String, RawValue>) -> Result<()> {
        let backend = self.backend()?;
        let path = Path::new(path)?;

        backend.update(&path, fields).await.map_err(|e| {
            warn!(path = %path, error = %e, "Error updating data");
            Error::update(e.to_string())
        })?;

        debug!(path = %path, "Data updated");
        Ok(())
    }

    /// Remove the subtree at `path`
    pub async fn delete(&self, path: &str) -> Result<()> {
        let backend = self.backend()?;
        let path = Path::new(path)?;

        backend.remove(&path).await.map_err(|e| {
            warn!(path = %path, error = %e, "Error deleting data");
            Error::delete(e.to_string())
        })?;

        debug!(path = %path, "Data deleted");
        Ok(())
    }

    /// Append a message under `collection` and return its new key
    pub async fn append_message(
        &self,
        collection: &str,
        text: &str,
        clock: &dyn Clock,
    ) -> Result<MessageKey> {
        let backend = self.backend()?;
        let collection = Path::new(collection)?;
        let record = MessageRecord::now(text, clock);

        let key = self.write_record(&backend, &collection, &record).await?;
        info!(key = %key, "Message added");
        Ok(key)
    }

    async fn write_record(
        &self,
        backend: &Arc<dyn Backend>,
        collection: &Path,
        record: &MessageRecord,
    ) -> Result<MessageKey> {
        let key = backend.new_key(collection);
        let path = collection.child(key.as_str())?;
        let raw = serde_json::to_value(record).map_err(|e| Error::write(e.to_string()))?;

        backend.write(&path, raw).await.map_err(|e| {
            warn!(path = %path, error = %e, "Error adding message");
            Error::write(e.to_string())
        })?;
        Ok(key)
    }

    /// Stream of full snapshots at `path`
    ///
    /// The first item is the current value when data exists. The stream ends
    /// when the core shuts down.
    pub fn watch(&self, path: &str) -> Result<ChangeStream> {
        let backend = self.backend()?;
        let path = Path::new(path)?;

        let watch = backend.watch(&path).map_err(|e| {
            warn!(path = %path, error = %e, "Error listening to data");
            Error::read(e.to_string())
        })?;

        let closed = self.epoch.subscribe();
        let epoch = *closed.borrow();
        Ok(ChangeStream {
            watch,
            closed,
            epoch,
        })
    }

    /// Call `on_change` with every snapshot at `path`
    ///
    /// Must be called from within a Tokio runtime. Listener errors are logged
    /// and skipped. Dropping the returned handle stops delivery.
    pub fn subscribe_to_changes<F>(&self, path: &str, mut on_change: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(RawValue) + Send + 'static,
    {
        let mut stream = self.watch(path)?;
        let path = stream.path().clone();

        let task = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                match event {
                    Ok(raw) => on_change(raw),
                    Err(e) => error!(path = %path, error = %e, "Error listening to data"),
                }
            }
            debug!(path = %path, "Subscription ended");
        });

        Ok(SubscriptionHandle { task })
    }

    pub async fn stats(&self) -> Result<BackendStats> {
        let backend = self.backend()?;
        backend.stats().await.map_err(|e| Error::read(e.to_string()))
    }
}

impl std::fmt::Debug for SyncCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCore")
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Snapshots at one path, ending when the owning core shuts down
pub struct ChangeStream {
    watch: Watch,
    closed: watch::Receiver<u64>,
    epoch: u64,
}

impl ChangeStream {
    pub fn path(&self) -> &Path {
        self.watch.path()
    }

    /// Wait for the next snapshot; `None` once the stream has ended
    pub async fn next(&mut self) -> Option<Result<RawValue>> {
        loop {
            if *self.closed.borrow() != self.epoch {
                return None;
            }

            tokio::select! {
                event = self.watch.next() => {
                    return event.map(|e| e.map_err(|e| Error::read(e.to_string())));
                }
                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }
}

/// Running subscription; dropping it stops delivery and unregisters
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Stop delivery now; same as dropping the handle
    pub fn cancel(self) {}

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
