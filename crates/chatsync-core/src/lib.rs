//! chatsync Core - message model and reconciliation
//!
//! This crate provides the building blocks shared by backends and clients:
//! - Validated slash-separated paths and JSON tree operations
//! - Push-style message keys that sort in creation order
//! - Message records, collections and the reconciled chat view

pub mod error;
pub mod key;
pub mod message;
pub mod path;
pub mod time;
pub mod tree;
pub mod view;

pub use error::{Error, Result};
pub use key::{KeyGenerator, MessageKey};
pub use message::{Message, MessageCollection, MessageRecord};
pub use path::Path;
pub use time::{format_timestamp, Clock, FixedClock, SystemClock};
pub use view::ChatView;

/// Raw JSON value as stored by a backend
pub type RawValue = serde_json::Value;

/// Default collection root for chat messages
pub const MESSAGES_PATH: &str = "messages";
