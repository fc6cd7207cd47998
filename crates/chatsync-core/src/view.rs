//! Reconciled chat view
//!
//! Every snapshot, whether from the initial read or a later change event, is
//! the whole collection. Applying one replaces the view outright, so replays
//! and out-of-order events cannot leave duplicates or gaps behind.

use crate::error::Result;
use crate::message::{Message, MessageCollection};
use crate::RawValue;
use parking_lot::RwLock;
use tracing::debug;

/// The message list as presented to a consumer
#[derive(Debug, Default)]
pub struct ChatView {
    messages: RwLock<MessageCollection>,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the view with a full raw snapshot
    ///
    /// The snapshot is parsed before the lock is taken; a malformed snapshot
    /// leaves the current view in place. Returns whether the visible list
    /// changed.
    pub fn apply(&self, raw: &RawValue) -> Result<bool> {
        let incoming = MessageCollection::from_raw(raw).map_err(|e| {
            debug!(error = %e, "Dropping malformed snapshot");
            e
        })?;

        let mut current = self.messages.write();
        if *current == incoming {
            return Ok(false);
        }

        debug!(before = current.len(), after = incoming.len(), "View replaced");
        *current = incoming;
        Ok(true)
    }

    /// Ordered copy of the current messages
    pub fn messages(&self) -> Vec<Message> {
        self.messages.read().iter().cloned().collect()
    }

    pub fn collection(&self) -> MessageCollection {
        self.messages.read().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    pub fn clear(&self) {
        *self.messages.write() = MessageCollection::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> RawValue {
        json!({
            "k1": {"msgText": "a", "msgTimeStamp": "t1"},
            "k2": {"msgText": "b", "msgTimeStamp": "t2"},
        })
    }

    #[test]
    fn test_apply_is_idempotent() {
        let view = ChatView::new();

        assert!(view.apply(&snapshot()).unwrap());
        let first = view.messages();

        assert!(!view.apply(&snapshot()).unwrap());
        assert_eq!(view.messages(), first);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_apply_replaces_rather_than_merges() {
        let view = ChatView::new();
        view.apply(&snapshot()).unwrap();

        view.apply(&json!({"k3": {"msgText": "c", "msgTimeStamp": "t3"}}))
            .unwrap();

        let texts: Vec<_> = view.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["c"]);
    }

    #[test]
    fn test_malformed_snapshot_keeps_previous_view() {
        let view = ChatView::new();
        view.apply(&snapshot()).unwrap();

        assert!(view.apply(&json!("garbage")).is_err());
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_null_snapshot_empties_view() {
        let view = ChatView::new();
        view.apply(&snapshot()).unwrap();

        assert!(view.apply(&RawValue::Null).unwrap());
        assert!(view.is_empty());
    }
}
