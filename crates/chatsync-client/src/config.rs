//! Sync core configuration

use chatsync_core::MESSAGES_PATH;
use serde::{Deserialize, Serialize};

/// Default endpoint: a volatile in-process store
pub const DEFAULT_ENDPOINT: &str = "memory://";

/// Configuration for a [`SyncCore`](crate::SyncCore)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Backend endpoint, e.g. `memory://` or `sqlite:///var/lib/chatsync/chat.db`
    pub endpoint_url: String,
    /// Collection root holding the messages
    pub collection_path: String,
    /// Write the sample messages when the collection is empty
    pub seed_on_startup: bool,
}

impl SyncConfig {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            ..Self::default()
        }
    }

    pub fn with_collection(mut self, path: impl Into<String>) -> Self {
        self.collection_path = path.into();
        self
    }

    pub fn with_seed(mut self, seed: bool) -> Self {
        self.seed_on_startup = seed;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT.to_string(),
            collection_path: MESSAGES_PATH.to_string(),
            seed_on_startup: true,
        }
    }
}
