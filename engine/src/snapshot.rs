//! Fallback cache - a JSON file mirroring the local store.
//!
//! The cache is only a warm-start aid: it is read once at startup and
//! rewritten after every committed change. Snapshots use `BTreeMap` so the
//! same store contents always serialize to the same bytes.
//!
//! Older files hold a flat array per collection under `businesses` and
//! `articles`, with items keyed by `qty` and `businessId`. Those still load.

use crate::{
    error::Result,
    record::Document,
    store::{ChangeStream, Filter, LocalStore},
    Collection, Container, Error, Item, RecordId,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Version of the cache file format.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// The full contents of the local store at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    /// Files written before versioning carry no version and read as 0.
    #[serde(default)]
    pub format_version: u32,
    #[serde(default, alias = "businesses", deserialize_with = "entries")]
    pub containers: BTreeMap<RecordId, Value>,
    #[serde(default, alias = "articles", deserialize_with = "entries")]
    pub items: BTreeMap<RecordId, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Entries {
    Keyed(BTreeMap<RecordId, Value>),
    Flat(Vec<Value>),
}

/// Accept either an id-keyed object or a flat array. Array entries without
/// an id are kept under their position so restore can report them.
fn entries<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<RecordId, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Entries::deserialize(deserializer)? {
        Entries::Keyed(map) => map,
        Entries::Flat(docs) => docs
            .into_iter()
            .enumerate()
            .map(|(position, doc)| {
                let key = doc
                    .get("id")
                    .and_then(Value::as_str)
                    .map_or_else(|| format!("#{position}"), str::to_string);
                (key, doc)
            })
            .collect(),
    })
}

/// Item field names used before the current schema.
const LEGACY_ITEM_FIELDS: [(&str, &str); 2] = [("qty", "quantity"), ("businessId", "containerId")];

fn upgrade(collection: Collection, doc: &Value) -> Value {
    let mut doc = doc.clone();
    if let (Collection::Items, Some(fields)) = (collection, doc.as_object_mut()) {
        for (old, new) in LEGACY_ITEM_FIELDS {
            if !fields.contains_key(new) {
                if let Some(value) = fields.remove(old) {
                    fields.insert(new.to_string(), value);
                }
            }
        }
    }
    doc
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            containers: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }
}

impl CacheSnapshot {
    /// Capture every document currently in `store`.
    pub async fn capture(store: &dyn LocalStore) -> Result<Self> {
        let mut snapshot = Self::default();
        for collection in Collection::ALL {
            let docs = store.find(collection, &Filter::all()).await?;
            let target = snapshot.collection_mut(collection);
            for doc in docs {
                if let Some(id) = doc.get("id").and_then(Value::as_str) {
                    target.insert(id.to_string(), doc.clone());
                }
            }
        }
        Ok(snapshot)
    }

    pub fn collection(&self, collection: Collection) -> &BTreeMap<RecordId, Value> {
        match collection {
            Collection::Containers => &self.containers,
            Collection::Items => &self.items,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut BTreeMap<RecordId, Value> {
        match collection {
            Collection::Containers => &mut self.containers,
            Collection::Items => &mut self.items,
        }
    }

    pub fn record_count(&self) -> usize {
        self.containers.len() + self.items.len()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Cache(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json).map_err(|e| Error::Cache(e.to_string()))?;
        if snapshot.format_version > CACHE_FORMAT_VERSION {
            return Err(Error::Cache(format!(
                "unsupported cache format version: {} (max supported: {})",
                snapshot.format_version, CACHE_FORMAT_VERSION
            )));
        }
        Ok(snapshot)
    }
}

/// Counts from [`FallbackCache::restore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub skipped: usize,
}

/// Reads and writes the cache file at one path.
#[derive(Debug, Clone)]
pub struct FallbackCache {
    path: PathBuf,
}

impl FallbackCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file is an empty snapshot.
    pub async fn load(&self) -> Result<CacheSnapshot> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => CacheSnapshot::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheSnapshot::default()),
            Err(e) => Err(Error::Cache(format!("{}: {e}", self.path.display()))),
        }
    }

    /// Write the snapshot through a temp file and rename it into place.
    pub async fn save(&self, snapshot: &CacheSnapshot) -> Result<()> {
        let json = snapshot.to_json()?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::Cache(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Cache(format!("{}: {e}", self.path.display())))
    }

    /// Upsert every cached record into `store`. Records that fail validation
    /// are skipped.
    pub async fn restore(&self, store: &dyn LocalStore) -> Result<RestoreSummary> {
        let snapshot = self.load().await?;
        let mut summary = RestoreSummary::default();

        for collection in Collection::ALL {
            for (id, doc) in snapshot.collection(collection) {
                let doc = upgrade(collection, doc);
                let checked = match collection {
                    Collection::Containers => Container::from_document(&doc).map(|_| ()),
                    Collection::Items => Item::from_document(&doc).map(|_| ()),
                };
                let result = match checked {
                    Ok(()) => store.upsert(collection, doc).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => summary.restored += 1,
                    Err(e) => {
                        tracing::warn!(%collection, %id, error = %e, "Skipping cached record");
                        summary.skipped += 1;
                    }
                }
            }
        }

        tracing::info!(
            path = %self.path.display(),
            restored = summary.restored,
            skipped = summary.skipped,
            "Restored fallback cache"
        );
        Ok(summary)
    }

    /// Spawn a task that rewrites the cache after every change to `store`.
    /// Runs until the handle is aborted.
    pub fn spawn_writer(&self, store: Arc<dyn LocalStore>) -> JoinHandle<()> {
        let cache = self.clone();
        let mut containers = store.subscribe(Collection::Containers);
        let mut items = store.subscribe(Collection::Items);

        tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    event = containers.recv() => event.is_some(),
                    event = items.recv() => event.is_some(),
                };
                if !changed {
                    break;
                }
                // Fold a burst of changes into one write.
                drain(&mut containers);
                drain(&mut items);

                let result = match CacheSnapshot::capture(store.as_ref()).await {
                    Ok(snapshot) => cache.save(&snapshot).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to write fallback cache");
                }
            }
            tracing::debug!("Fallback cache writer stopped");
        })
    }
}

fn drain(stream: &mut ChangeStream) {
    while stream.try_recv().is_some() {}
}
