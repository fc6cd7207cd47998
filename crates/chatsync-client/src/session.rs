//! Chat session - keeps a [`ChatView`] in step with the backend
//!
//! Startup is one bulk read followed by a subscription. Both paths feed full
//! snapshots into the view, which replaces itself wholesale, so a write that
//! lands between the read and the subscription is neither lost nor doubled.
//! A bulk read that completes after a change event was applied is discarded,
//! since the event carried state at least as new as the read.

use crate::sync::{SubscriptionHandle, SyncCore};
use chatsync_core::{ChatView, Clock, Error, Message, MessageKey, RawValue, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

type ChangeCallback = dyn Fn(&[Message]) + Send + Sync;

/// A consumer of one message collection
pub struct ChatSession {
    core: Arc<SyncCore>,
    collection: String,
    view: Arc<ChatView>,
    on_changed: Arc<ChangeCallback>,
    /// Number of change events applied so far
    events: Arc<Mutex<u64>>,
    subscription: Option<SubscriptionHandle>,
}

impl ChatSession {
    /// Load the configured collection and start listening for changes
    ///
    /// `on_changed` receives the ordered message list every time the visible
    /// list changes. A failed initial read is logged; the subscription
    /// delivers the current state once it registers.
    pub async fn start<F>(core: Arc<SyncCore>, on_changed: F) -> Result<Self>
    where
        F: Fn(&[Message]) + Send + Sync + 'static,
    {
        let collection = core.config().collection_path.clone();
        let mut session = Self {
            core,
            collection,
            view: Arc::new(ChatView::new()),
            on_changed: Arc::new(on_changed),
            events: Arc::new(Mutex::new(0)),
            subscription: None,
        };

        match session.refresh().await {
            Ok(()) | Err(Error::Read { .. }) | Err(Error::Parse { .. }) => {}
            Err(e) => return Err(e),
        }

        let view = session.view.clone();
        let on_changed = session.on_changed.clone();
        let events = session.events.clone();
        session.subscription = Some(session.core.subscribe_to_changes(
            &session.collection,
            move |raw| {
                let mut applied = events.lock();
                *applied += 1;
                apply_snapshot(&view, &raw, on_changed.as_ref());
            },
        )?);

        info!(collection = %session.collection, messages = session.view.len(), "Chat session started");
        Ok(session)
    }

    /// Re-read the whole collection and apply it
    ///
    /// The result is dropped if a change event was applied while the read was
    /// in flight.
    pub async fn refresh(&self) -> Result<()> {
        let seen = *self.events.lock();
        let raw = match self.core.read(&self.collection).await {
            Ok(raw) => raw.unwrap_or(RawValue::Null),
            Err(e) => {
                warn!(error = %e, "Could not load messages");
                return Err(e);
            }
        };

        let applied = self.events.lock();
        if *applied != seen {
            debug!(collection = %self.collection, "Discarding bulk read superseded by a change event");
            return Ok(());
        }
        if apply_snapshot(&self.view, &raw, self.on_changed.as_ref()) {
            Ok(())
        } else {
            Err(Error::parse("malformed collection snapshot"))
        }
    }

    /// Append `text` as a new message
    ///
    /// Blank input is ignored and yields `Ok(None)`. On error nothing was
    /// written, so the caller should keep the input for a retry.
    pub async fn submit(&self, text: &str, clock: &dyn Clock) -> Result<Option<MessageKey>> {
        if text.trim().is_empty() {
            debug!("Ignoring blank message");
            return Ok(None);
        }

        let key = self
            .core
            .append_message(&self.collection, text, clock)
            .await?;
        Ok(Some(key))
    }

    /// Ordered copy of the visible messages
    pub fn messages(&self) -> Vec<Message> {
        self.view.messages()
    }

    pub fn view(&self) -> &Arc<ChatView> {
        &self.view
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_listening(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(SubscriptionHandle::is_active)
    }

    /// Stop listening; the view keeps its last state
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
            debug!(collection = %self.collection, "Chat session closed");
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Apply a snapshot and notify on change; false if the snapshot was dropped
fn apply_snapshot(view: &ChatView, raw: &RawValue, on_changed: &ChangeCallback) -> bool {
    match view.apply(raw) {
        Ok(true) => {
            on_changed(&view.messages());
            true
        }
        Ok(false) => true,
        Err(e) => {
            warn!(error = %e, "Error parsing messages, keeping previous view");
            false
        }
    }
}
