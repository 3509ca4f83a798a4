//! External boundaries of the synchronization engine
//!
//! The engine consumes three collaborators it does not own:
//! - [`RecordStore`]: the live (non-archived) change stream and the one-shot
//!   archived query
//! - [`ProfileSource`]: point lookups of submitter profiles
//! - [`RecordWriter`]: fire-and-forget writes whose effects come back only
//!   through the change stream
//!
//! [`MemoryStore`] implements all three in-process.

mod memory;

pub use memory::{MemoryStore, SeedFile};

use serde_json::Value;
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::{NewRecord, UserProfile};

/// Failures reported by a store implementation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The ordered query needs a server-side index that does not exist
    #[error("query requires an index: {0}")]
    MissingIndex(String),

    /// Store unreachable or request failed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document not found: {0}")]
    NotFound(String),

    /// Store refused the request
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// A document exactly as the store delivered it
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub data: Value,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self { id: id.into(), data }
    }
}

/// Store-side change tag attached to one document in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: RawDocument,
}

/// One delivery from the live query
///
/// `documents` is the full current result set in query order (newest
/// first); `changes` lists what differs from the previous delivery. The
/// first snapshot of a subscription tags every document as added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<RawDocument>,
    pub changes: Vec<DocumentChange>,
}

/// Receiving end of an open live query
///
/// Dropping it closes the subscription on the store side.
#[derive(Debug)]
pub struct LiveSubscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

impl LiveSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Snapshot>) -> Self {
        Self { rx }
    }

    /// Wait for the next snapshot; `None` once the store ends the stream
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Stop receiving; pending snapshots are discarded
    pub fn close(mut self) {
        self.rx.close();
    }
}

/// Source of the record collection
pub trait RecordStore: Send + Sync + 'static {
    /// Open the live query: non-archived records ordered by creation time,
    /// newest first.
    fn subscribe_live(&self) -> impl Future<Output = Result<LiveSubscription, StoreError>> + Send;

    /// One-shot query of the archived partition, newest first
    fn fetch_archived(&self) -> impl Future<Output = Result<Vec<RawDocument>, StoreError>> + Send;
}

/// Point lookup of submitter profiles
pub trait ProfileSource: Send + Sync + 'static {
    /// `Ok(None)` means the profile does not exist
    fn get_profile(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send;
}

/// Write requests; effects are observed only via the live query
pub trait RecordWriter: Send + Sync + 'static {
    /// Store a new record and return its assigned id
    fn create_record(&self, draft: NewRecord) -> impl Future<Output = Result<String, StoreError>> + Send;

    fn mark_viewed(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn archive(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}
