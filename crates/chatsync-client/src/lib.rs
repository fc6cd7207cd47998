//! chatsync Client - the sync core and chat session
//!
//! - [`SyncCore`]: one coherent view of a backend, with explicit
//!   initialize/shutdown and typed errors at the backend boundary
//! - [`ChatSession`]: initial read plus live subscription feeding a
//!   [`ChatView`](chatsync_core::ChatView)

pub mod config;
pub mod connector;
pub mod session;
pub mod sync;

pub use chatsync_core::{Error, Message, MessageKey, Path, RawValue, Result};
pub use config::SyncConfig;
pub use connector::{Connector, EndpointConnector, SharedBackend};
pub use session::ChatSession;
pub use sync::{ChangeStream, SubscriptionHandle, SyncCore, DEFAULT_SEED_MESSAGES};
