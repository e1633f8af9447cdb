//! In-process signaling store
//!
//! Backs local multi-party sessions and tests. All handles cloned from one
//! `MemoryStore` share the same document tree, so several `CallManager`s can
//! signal through it the way separate clients would through a hosted store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::store::{
    ChangeKind, CollectionRx, DocChange, DocRx, SignalingStore, Unsubscribe,
};
use crate::{Error, Result};

struct CollectionWatcher {
    cancelled: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Vec<DocChange>>,
}

struct DocWatcher {
    cancelled: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Value>,
    collection_watchers: HashMap<String, Vec<CollectionWatcher>>,
    doc_watchers: HashMap<String, Vec<DocWatcher>>,
    next_id: u64,
}

/// Shared in-memory document store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored (test helper)
    pub fn doc_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).docs.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn segment_count(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

fn ensure_doc_path(path: &str) -> Result<()> {
    let n = segment_count(path);
    if n < 2 || n % 2 != 0 {
        return Err(Error::Signaling(format!("not a document path: {path}")));
    }
    Ok(())
}

fn ensure_collection_path(path: &str) -> Result<()> {
    let n = segment_count(path);
    if n == 0 || n % 2 == 0 {
        return Err(Error::Signaling(format!("not a collection path: {path}")));
    }
    Ok(())
}

fn split_doc_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((collection, id)) => (collection, id),
        None => ("", path),
    }
}

impl Inner {
    fn notify(&mut self, path: &str, change: DocChange, doc_value: Option<Value>) {
        let (collection, _) = split_doc_path(path);

        if let Some(watchers) = self.collection_watchers.get_mut(collection) {
            watchers.retain(|w| {
                !w.cancelled.load(Ordering::SeqCst) && w.tx.send(vec![change.clone()]).is_ok()
            });
        }
        if let Some(watchers) = self.doc_watchers.get_mut(path) {
            watchers.retain(|w| {
                !w.cancelled.load(Ordering::SeqCst) && w.tx.send(doc_value.clone()).is_ok()
            });
        }
    }

    fn write(&mut self, path: &str, data: Value, merge: bool) {
        let existed = self.docs.contains_key(path);
        let value = if merge {
            match (self.docs.get(path), &data) {
                (Some(Value::Object(old)), Value::Object(new)) => {
                    let mut merged = old.clone();
                    for (k, v) in new {
                        merged.insert(k.clone(), v.clone());
                    }
                    Value::Object(merged)
                }
                _ => data,
            }
        } else {
            data
        };
        self.docs.insert(path.to_string(), value.clone());

        let (_, doc_id) = split_doc_path(path);
        let kind = if existed {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        self.notify(
            path,
            DocChange {
                kind,
                doc_id: doc_id.to_string(),
                data: value.clone(),
            },
            Some(value),
        );
    }
}

#[async_trait]
impl SignalingStore for MemoryStore {
    async fn create_doc(&self, collection: &str, data: Value) -> Result<String> {
        ensure_collection_path(collection)?;
        let mut inner = self.lock();
        inner.next_id += 1;
        // Zero-padded so BTreeMap iteration replays creation order.
        let id = format!("{:08}", inner.next_id);
        let path = format!("{collection}/{id}");
        inner.write(&path, data, false);
        Ok(id)
    }

    async fn set_doc(&self, path: &str, data: Value, merge: bool) -> Result<()> {
        ensure_doc_path(path)?;
        self.lock().write(path, data, merge);
        Ok(())
    }

    async fn get_doc(&self, path: &str) -> Result<Option<Value>> {
        ensure_doc_path(path)?;
        Ok(self.lock().docs.get(path).cloned())
    }

    async fn update_doc(&self, path: &str, data: Value) -> Result<()> {
        ensure_doc_path(path)?;
        let mut inner = self.lock();
        if !inner.docs.contains_key(path) {
            return Err(Error::Signaling(format!("no document at {path}")));
        }
        inner.write(path, data, true);
        Ok(())
    }

    async fn delete_doc(&self, path: &str) -> Result<()> {
        ensure_doc_path(path)?;
        let mut inner = self.lock();
        if let Some(last) = inner.docs.remove(path) {
            let (_, doc_id) = split_doc_path(path);
            inner.notify(
                path,
                DocChange {
                    kind: ChangeKind::Removed,
                    doc_id: doc_id.to_string(),
                    data: last,
                },
                None,
            );
        }
        Ok(())
    }

    async fn list_docs(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        ensure_collection_path(collection)?;
        let inner = self.lock();
        Ok(inner
            .docs
            .iter()
            .filter(|(path, _)| split_doc_path(path).0 == collection)
            .map(|(path, value)| (split_doc_path(path).1.to_string(), value.clone()))
            .collect())
    }

    async fn subscribe_collection(&self, collection: &str) -> Result<(Unsubscribe, CollectionRx)> {
        ensure_collection_path(collection)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut inner = self.lock();
        let snapshot: Vec<DocChange> = inner
            .docs
            .iter()
            .filter(|(path, _)| split_doc_path(path).0 == collection)
            .map(|(path, value)| DocChange {
                kind: ChangeKind::Added,
                doc_id: split_doc_path(path).1.to_string(),
                data: value.clone(),
            })
            .collect();
        debug!(collection, docs = snapshot.len(), "collection subscribed");
        let _ = tx.send(snapshot);
        inner
            .collection_watchers
            .entry(collection.to_string())
            .or_default()
            .push(CollectionWatcher {
                cancelled: cancelled.clone(),
                tx,
            });
        Ok((Unsubscribe::new(cancelled), rx))
    }

    async fn subscribe_doc(&self, path: &str) -> Result<(Unsubscribe, DocRx)> {
        ensure_doc_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut inner = self.lock();
        let _ = tx.send(inner.docs.get(path).cloned());
        inner
            .doc_watchers
            .entry(path.to_string())
            .or_default()
            .push(DocWatcher {
                cancelled: cancelled.clone(),
                tx,
            });
        Ok((Unsubscribe::new(cancelled), rx))
    }
}
