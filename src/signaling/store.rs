//! Store trait and subscription types

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::Result;

/// What happened to a document within a watched collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Document appeared (includes the initial snapshot of existing docs)
    Added,
    /// Document contents changed
    Modified,
    /// Document was deleted
    Removed,
}

/// A single document change delivered to a collection subscriber
#[derive(Debug, Clone)]
pub struct DocChange {
    /// What happened
    pub kind: ChangeKind,

    /// Document ID (last path segment)
    pub doc_id: String,

    /// Document contents at the time of the change (last known value for
    /// removals)
    pub data: Value,
}

/// Handle that cancels a subscription
///
/// Cancellation is synchronous and idempotent; no events are delivered after
/// `cancel()` returns. Dropping the handle cancels as well.
#[derive(Debug)]
pub struct Unsubscribe {
    cancelled: Arc<AtomicBool>,
}

impl Unsubscribe {
    /// Create a handle around a shared cancellation flag
    pub fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self { cancelled }
    }

    /// Cancel the subscription
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether the subscription has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Receiver for collection subscriptions (batches of changes)
pub type CollectionRx = mpsc::UnboundedReceiver<Vec<DocChange>>;

/// Receiver for single-document subscriptions (full value or None when
/// missing/deleted)
pub type DocRx = mpsc::UnboundedReceiver<Option<Value>>;

/// Hierarchical document store used for call signaling
///
/// Paths alternate collection and document segments, so a document path has
/// an even number of `/`-separated segments and a collection path an odd
/// number. Subscriptions deliver a snapshot of existing documents as `Added`
/// changes before streaming live updates.
#[async_trait]
pub trait SignalingStore: Send + Sync {
    /// Create a document with a store-assigned ID, returning the ID
    async fn create_doc(&self, collection: &str, data: Value) -> Result<String>;

    /// Write a document at an explicit path
    ///
    /// With `merge`, top-level fields are merged into any existing document;
    /// otherwise the document is replaced.
    async fn set_doc(&self, path: &str, data: Value, merge: bool) -> Result<()>;

    /// Read a document, returning `None` if it does not exist
    async fn get_doc(&self, path: &str) -> Result<Option<Value>>;

    /// Merge fields into an existing document; fails if the document is
    /// missing
    async fn update_doc(&self, path: &str, data: Value) -> Result<()>;

    /// Delete a document (succeeds if already absent)
    async fn delete_doc(&self, path: &str) -> Result<()>;

    /// List the documents directly under a collection as (id, data) pairs
    async fn list_docs(&self, collection: &str) -> Result<Vec<(String, Value)>>;

    /// Watch a collection for document changes
    async fn subscribe_collection(&self, collection: &str) -> Result<(Unsubscribe, CollectionRx)>;

    /// Watch a single document for changes to its value
    async fn subscribe_doc(&self, path: &str) -> Result<(Unsubscribe, DocRx)>;
}
