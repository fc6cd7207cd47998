//! End-to-end flows: several sessions sharing one backend

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatsync_backend::{Backend, BackendError, BackendStats, MemoryBackend, Watch};
use chatsync_client::{ChatSession, Error, Message, SharedBackend, SyncConfig, SyncCore};
use chatsync_core::{FixedClock, MessageKey, MessageRecord, Path, RawValue, SystemClock};
use chrono::{TimeZone, Utc};
use serde_json::{json, Map};
use tokio::sync::{mpsc, Notify};

/// Memory backend with switchable failures and a call counter
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    calls: AtomicUsize,
    /// Hold the next read's result until `release_read` fires
    stall_next_read: AtomicBool,
    read_stalled: Notify,
    release_read: Notify,
}

impl FlakyBackend {
    fn call(&self, fail: &AtomicBool) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if fail.load(Ordering::SeqCst) {
            Err(BackendError::Connection("simulated outage".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    async fn read(&self, path: &Path) -> Result<Option<RawValue>, BackendError> {
        self.call(&self.fail_reads)?;
        let value = self.inner.read(path).await;
        if self.stall_next_read.swap(false, Ordering::SeqCst) {
            self.read_stalled.notify_one();
            self.release_read.notified().await;
        }
        value
    }

    async fn write(&self, path: &Path, value: RawValue) -> Result<(), BackendError> {
        self.call(&self.fail_writes)?;
        self.inner.write(path, value).await
    }

    async fn update(&self, path: &Path, fields: Map<String, RawValue>) -> Result<(), BackendError> {
        self.call(&self.fail_writes)?;
        self.inner.update(path, fields).await
    }

    async fn remove(&self, path: &Path) -> Result<(), BackendError> {
        self.call(&self.fail_writes)?;
        self.inner.remove(path).await
    }

    fn watch(&self, path: &Path) -> Result<Watch, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.watch(path)
    }

    fn new_key(&self, path: &Path) -> MessageKey {
        self.inner.new_key(path)
    }

    async fn stats(&self) -> Result<BackendStats, BackendError> {
        self.inner.stats().await
    }
}

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2025, 3, 5, 6, 7, 9).unwrap())
}

async fn core_on(backend: Arc<dyn Backend>) -> Arc<SyncCore> {
    let core = SyncCore::with_connector(
        SyncConfig::default().with_seed(false),
        Arc::new(SharedBackend::new(backend)),
    );
    core.initialize().await.unwrap();
    Arc::new(core)
}

async fn start_session(core: Arc<SyncCore>) -> (ChatSession, mpsc::UnboundedReceiver<Vec<Message>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = ChatSession::start(core, move |messages: &[Message]| {
        let _ = tx.send(messages.to_vec());
    })
    .await
    .unwrap();
    (session, rx)
}

/// Wait until a rendered list satisfies `pred`
async fn rendered_until<F>(rx: &mut mpsc::UnboundedReceiver<Vec<Message>>, pred: F) -> Vec<Message>
where
    F: Fn(&[Message]) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let messages = rx.recv().await.expect("session stopped rendering");
            if pred(&messages) {
                return messages;
            }
        }
    })
    .await
    .expect("timed out waiting for view")
}

fn texts(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.text.as_str()).collect()
}

#[tokio::test]
async fn test_sequential_appends_render_in_order_everywhere() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let (alice, mut alice_rx) = start_session(core_on(backend.clone()).await).await;
    let (_bob, mut bob_rx) = start_session(core_on(backend.clone()).await).await;

    let k1 = alice.submit("a", &clock()).await.unwrap().unwrap();
    let k2 = alice.submit("b", &clock()).await.unwrap().unwrap();
    assert!(k1 < k2);

    let seen = rendered_until(&mut bob_rx, |m| m.len() == 2).await;
    assert_eq!(texts(&seen), vec!["a", "b"]);
    assert_eq!(seen[0].key, k1);

    let own = rendered_until(&mut alice_rx, |m| m.len() == 2).await;
    assert_eq!(own, seen);
}

#[tokio::test]
async fn test_existing_messages_are_rendered_once() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let core = core_on(backend).await;
    core.seed_if_empty("messages", &["one", "two"], &clock())
        .await
        .unwrap();

    let (session, mut rx) = start_session(core.clone()).await;
    assert_eq!(texts(&session.messages()), vec!["one", "two"]);

    // The replayed snapshot on subscription must not duplicate entries
    core.append_message("messages", "three", &clock()).await.unwrap();
    let seen = rendered_until(&mut rx, |m| m.len() == 3).await;
    assert_eq!(texts(&seen), vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_append_keys_are_unique() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let core = core_on(backend).await;

    let mut keys = Vec::new();
    for i in 0..200 {
        keys.push(
            core.append_message("messages", &format!("m{}", i), &SystemClock)
                .await
                .unwrap(),
        );
    }

    let mut deduped = keys.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), keys.len());
    assert_eq!(deduped, keys);
    assert_eq!(core.read_collection("messages").await.unwrap().len(), 200);
}

#[tokio::test]
async fn test_create_read_round_trip() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let core = core_on(backend).await;
    let record = MessageRecord {
        text: "hello".into(),
        timestamp: "March 5, 2025 at 2:07:09 PM UTC+8".into(),
    };

    core.create("messages/custom", &record).await.unwrap();

    let loaded: MessageRecord = core.read_as("messages/custom").await.unwrap().unwrap();
    assert_eq!(loaded, record);
}

#[tokio::test]
async fn test_failed_write_leaves_view_and_allows_retry() {
    let backend = Arc::new(FlakyBackend::default());
    let (session, mut rx) = start_session(core_on(backend.clone()).await).await;

    backend.fail_writes.store(true, Ordering::SeqCst);
    let result = session.submit("retry me", &clock()).await;
    assert!(matches!(result, Err(Error::Write { .. })));
    assert!(session.messages().is_empty());

    backend.fail_writes.store(false, Ordering::SeqCst);
    session.submit("retry me", &clock()).await.unwrap();
    let seen = rendered_until(&mut rx, |m| m.len() == 1).await;
    assert_eq!(texts(&seen), vec!["retry me"]);
}

#[tokio::test]
async fn test_failed_read_keeps_previous_view() {
    let backend = Arc::new(FlakyBackend::default());
    let core = core_on(backend.clone()).await;
    core.append_message("messages", "kept", &clock()).await.unwrap();
    let (session, _rx) = start_session(core.clone()).await;

    backend.fail_reads.store(true, Ordering::SeqCst);
    assert!(matches!(session.refresh().await, Err(Error::Read { .. })));
    assert_eq!(texts(&session.messages()), vec!["kept"]);
}

#[tokio::test]
async fn test_refresh_overtaken_by_change_event_keeps_newer_view() {
    let backend = Arc::new(FlakyBackend::default());
    let core = core_on(backend.clone()).await;
    let (session, mut rx) = start_session(core.clone()).await;

    backend.stall_next_read.store(true, Ordering::SeqCst);
    let writer = async {
        backend.read_stalled.notified().await;
        core.append_message("messages", "new", &clock()).await.unwrap();
        rendered_until(&mut rx, |m| m.len() == 1).await;
        backend.release_read.notify_one();
    };
    let (refreshed, ()) = tokio::join!(session.refresh(), writer);
    refreshed.unwrap();

    assert_eq!(texts(&session.messages()), vec!["new"]);
}

#[tokio::test]
async fn test_malformed_entry_is_dropped_until_fixed() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let core = core_on(backend).await;
    let (_session, mut rx) = start_session(core.clone()).await;

    core.append_message("messages", "good", &clock()).await.unwrap();
    rendered_until(&mut rx, |m| m.len() == 1).await;

    core.create("messages/bad", &json!({"unexpected": true}))
        .await
        .unwrap();
    core.append_message("messages", "after", &clock()).await.unwrap();
    core.delete("messages/bad").await.unwrap();

    // Nothing with the malformed entry is ever rendered
    let seen = rendered_until(&mut rx, |m| m.len() == 2).await;
    assert_eq!(texts(&seen), vec!["good", "after"]);
}

#[tokio::test]
async fn test_listener_errors_do_not_end_subscription() {
    let backend = Arc::new(MemoryBackend::new());
    let core = core_on(backend.clone()).await;
    let (session, mut rx) = start_session(core.clone()).await;

    backend.disconnect_watchers("blip");
    core.append_message("messages", "still here", &clock())
        .await
        .unwrap();

    let seen = rendered_until(&mut rx, |m| m.len() == 1).await;
    assert_eq!(texts(&seen), vec!["still here"]);
    assert!(session.is_listening());
}

#[tokio::test]
async fn test_blank_submit_is_ignored() {
    let backend = Arc::new(FlakyBackend::default());
    let (session, _rx) = start_session(core_on(backend.clone()).await).await;
    let before = backend.calls.load(Ordering::SeqCst);

    assert_eq!(session.submit("   ", &clock()).await.unwrap(), None);
    assert_eq!(backend.calls.load(Ordering::SeqCst), before);
}

#[tokio::test]
async fn test_session_requires_initialized_core() {
    let backend = Arc::new(FlakyBackend::default());
    let core = Arc::new(SyncCore::with_connector(
        SyncConfig::default(),
        Arc::new(SharedBackend::new(backend.clone())),
    ));

    let result = ChatSession::start(core, |_: &[Message]| {}).await;
    assert!(matches!(result, Err(Error::NotInitialized)));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_stops_listening() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let core = core_on(backend.clone()).await;
    let (session, _rx) = start_session(core.clone()).await;
    assert!(session.is_listening());

    core.shutdown();

    tokio::time::timeout(Duration::from_secs(5), async {
        while session.is_listening() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscription did not stop");
    assert_eq!(backend.stats().await.unwrap().watcher_count, 0);
}
