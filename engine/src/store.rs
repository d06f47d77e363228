//! Local store - the reactive document store the application works against.
//!
//! [`LocalStore`] is the contract the replication engine depends on. Documents
//! are JSON objects in local (camelCase) form keyed by their `id` field.
//! [`MemoryStore`] is the in-process implementation; every mutation is
//! validated through the typed model before it is committed and announced on
//! the collection's change stream.

use crate::{
    error::Result,
    record::{normalize_document, Document},
    Collection, Error, RecordId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;

/// Field-equality filter for [`LocalStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Match every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match documents whose `field` equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    /// Add another equality clause.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// Documents not yet confirmed by the remote.
    pub fn unsynced() -> Self {
        Self::eq("isSynced", false)
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

/// Kind of committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
}

/// Notification delivered after every committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub id: RecordId,
}

/// Receiving end of a collection's change notifications.
///
/// Dropping the stream unsubscribes it.
#[derive(Debug)]
pub struct ChangeStream {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeStream {
    pub fn new(rx: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next change. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Take a change if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

/// The document store contract consumed by the engine.
///
/// Mutations to the same id are serialized by the store; callers never
/// coordinate among themselves.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// All documents in `collection` matching `filter`.
    async fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>>;

    async fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Value>>;

    /// Insert a new document. Fails with `AlreadyExists` on a duplicate id.
    async fn insert(&self, collection: Collection, doc: Value) -> Result<()>;

    /// Insert or fully replace a document.
    async fn upsert(&self, collection: Collection, doc: Value) -> Result<()>;

    /// Merge `fields` into an existing document and return the result.
    async fn update_fields(&self, collection: Collection, id: &str, fields: Value)
        -> Result<Value>;

    /// Remove a document. Returns whether it existed.
    async fn remove(&self, collection: Collection, id: &str) -> Result<bool>;

    /// Subscribe to committed mutations of `collection`.
    fn subscribe(&self, collection: Collection) -> ChangeStream;
}

/// Typed access on top of any [`LocalStore`].
#[async_trait]
pub trait TypedStore: LocalStore {
    async fn get<D: Document>(&self, id: &str) -> Result<Option<D>> {
        match self.find_by_id(D::COLLECTION, id).await? {
            Some(doc) => D::from_document(&doc).map(Some),
            None => Ok(None),
        }
    }

    async fn query<D: Document>(&self, filter: &Filter) -> Result<Vec<D>> {
        self.find(D::COLLECTION, filter)
            .await?
            .iter()
            .map(D::from_document)
            .collect()
    }

    async fn all<D: Document>(&self) -> Result<Vec<D>> {
        self.query(&Filter::all()).await
    }

    async fn unsynced<D: Document>(&self) -> Result<Vec<D>> {
        self.query(&Filter::unsynced()).await
    }

    async fn put<D: Document>(&self, record: &D) -> Result<()> {
        self.upsert(D::COLLECTION, record.to_document()?).await
    }
}

impl<S: LocalStore + ?Sized> TypedStore for S {}

fn document_id(collection: Collection, doc: &Value) -> Result<RecordId> {
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::validation("id", format!("{collection} document has no string id")))
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<Collection, BTreeMap<RecordId, Value>>,
    listeners: HashMap<Collection, Vec<mpsc::UnboundedSender<ChangeEvent>>>,
}

impl Inner {
    fn collection(&mut self, collection: Collection) -> &mut BTreeMap<RecordId, Value> {
        self.collections.entry(collection).or_default()
    }

    fn notify(&mut self, event: ChangeEvent) {
        if let Some(listeners) = self.listeners.get_mut(&event.collection) {
            listeners.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

/// In-memory [`LocalStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.inner
            .lock()
            .collections
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    fn commit(&self, collection: Collection, doc: Value, allow_replace: bool) -> Result<()> {
        let doc = normalize_document(collection, &doc)?;
        let id = document_id(collection, &doc)?;

        let mut inner = self.inner.lock();
        let records = inner.collection(collection);
        let kind = if records.contains_key(&id) {
            if !allow_replace {
                return Err(Error::AlreadyExists { collection, id });
            }
            ChangeKind::Updated
        } else {
            ChangeKind::Inserted
        };
        records.insert(id.clone(), doc);
        inner.notify(ChangeEvent {
            collection,
            kind,
            id,
        });
        Ok(())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>> {
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .get(&collection)
            .map(|records| {
                records
                    .values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .get(&collection)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn insert(&self, collection: Collection, doc: Value) -> Result<()> {
        self.commit(collection, doc, false)
    }

    async fn upsert(&self, collection: Collection, doc: Value) -> Result<()> {
        self.commit(collection, doc, true)
    }

    async fn update_fields(
        &self,
        collection: Collection,
        id: &str,
        fields: Value,
    ) -> Result<Value> {
        let Value::Object(fields) = fields else {
            return Err(Error::validation("fields", "partial update must be an object"));
        };

        let mut inner = self.inner.lock();
        let records = inner.collection(collection);
        let current = records
            .get(id)
            .ok_or_else(|| Error::not_found(collection, id))?;

        let mut merged = current.clone();
        if let Value::Object(target) = &mut merged {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        let merged = normalize_document(collection, &merged)?;
        if document_id(collection, &merged)? != id {
            return Err(Error::validation("id", "primary key cannot be changed"));
        }

        records.insert(id.to_string(), merged.clone());
        inner.notify(ChangeEvent {
            collection,
            kind: ChangeKind::Updated,
            id: id.to_string(),
        });
        Ok(merged)
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let existed = inner.collection(collection).remove(id).is_some();
        if existed {
            inner.notify(ChangeEvent {
                collection,
                kind: ChangeKind::Removed,
                id: id.to_string(),
            });
        }
        Ok(existed)
    }

    fn subscribe(&self, collection: Collection) -> ChangeStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .listeners
            .entry(collection)
            .or_default()
            .push(tx);
        ChangeStream::new(rx)
    }
}
