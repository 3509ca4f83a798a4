//! Error types for lima-dashboard
//!
//! Errors are contained at the narrowest scope that can absorb them:
//! malformed documents are skipped per document, profile lookup failures
//! degrade to a fallback name, and only subscription setup failures reach
//! the user as a banner.

use crate::store::StoreError;
use thiserror::Error;

/// Synchronization engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The store cannot serve the live query as configured (e.g. missing index)
    ///
    /// Not retried automatically.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The live subscription could not be established
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// A single document failed normalization
    #[error("Malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },

    /// A profile lookup failed; callers fall back to an id-based name
    #[error("Profile lookup failed for {id}: {reason}")]
    ProfileLookup { id: String, reason: String },

    /// A write request was rejected by the store
    #[error("Write rejected: {0}")]
    Write(String),

    /// Record not present in the live view or store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation needs an authenticated session
    #[error("No active session")]
    NoSession,

    /// Invalid request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience Result type using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error text the document store uses when an ordered query lacks its index
const INDEX_ERROR_MARKERS: [&str; 2] = ["requires an index", "needs an index"];

impl SyncError {
    /// Map a failure from opening a subscription or running a query
    pub fn from_query(err: StoreError) -> Self {
        match err {
            StoreError::MissingIndex(msg) => SyncError::Configuration(msg),
            StoreError::Unavailable(msg) if is_index_message(&msg) => SyncError::Configuration(msg),
            StoreError::NotFound(msg) => SyncError::NotFound(msg),
            other => SyncError::Subscription(other.to_string()),
        }
    }

    /// Map a failure from a write request
    pub fn from_write(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => SyncError::NotFound(msg),
            StoreError::Rejected(msg) => SyncError::InvalidInput(msg),
            other => SyncError::Write(other.to_string()),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SyncError::Configuration(_))
    }

    pub(crate) fn malformed(id: &str, reason: impl Into<String>) -> Self {
        SyncError::Malformed {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

fn is_index_message(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    INDEX_ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
}
