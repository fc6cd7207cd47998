//! Error types for chatsync Core

use thiserror::Error;

/// Core error types
///
/// Every failure surfaced by the sync layer maps to one of these variants.
/// None of them is fatal to the process; the caller decides whether to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Sync core is not initialized")]
    NotInitialized,

    #[error("Initialization failed: {reason}")]
    Init { reason: String },

    #[error("Read failed: {reason}")]
    Read { reason: String },

    #[error("Write failed: {reason}")]
    Write { reason: String },

    #[error("Update failed: {reason}")]
    Update { reason: String },

    #[error("Delete failed: {reason}")]
    Delete { reason: String },

    #[error("Parse error: {reason}")]
    Parse { reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl Error {
    pub fn init(reason: impl Into<String>) -> Self {
        Self::Init { reason: reason.into() }
    }

    pub fn read(reason: impl Into<String>) -> Self {
        Self::Read { reason: reason.into() }
    }

    pub fn write(reason: impl Into<String>) -> Self {
        Self::Write { reason: reason.into() }
    }

    pub fn update(reason: impl Into<String>) -> Self {
        Self::Update { reason: reason.into() }
    }

    pub fn delete(reason: impl Into<String>) -> Self {
        Self::Delete { reason: reason.into() }
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse { reason: reason.into() }
    }

    /// Whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Read { .. } | Error::Write { .. } | Error::Update { .. } | Error::Delete { .. }
        )
    }
}

/// Result type alias for chatsync Core operations
pub type Result<T> = std::result::Result<T, Error>;
