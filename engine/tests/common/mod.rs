//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stockroom_engine::{
    error::Result, ChangeStream, Collection, EngineConfig, Error, Filter, LocalStore, MemoryStore,
    RemoteService,
};
use tokio::sync::watch;

/// A remote call as observed by [`FakeRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe,
    FetchAll(Collection),
    Exists(Collection, String),
    Create(Collection, String),
    Update(Collection, String),
    Delete(Collection, String),
}

#[derive(Default)]
struct State {
    docs: HashMap<Collection, BTreeMap<String, Value>>,
    offline: bool,
    failing_fetches: HashSet<Collection>,
    /// Writes to these ids always fail with the given status.
    rejected: HashMap<String, u16>,
    /// Writes to these ids fail with 503 this many more times.
    flaky: HashMap<String, u32>,
    calls: Vec<Call>,
}

/// In-memory remote with failure injection, call recording and a write gate.
pub struct FakeRemote {
    state: Mutex<State>,
    latency: Mutex<Duration>,
    writes_open: watch::Sender<bool>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        let (writes_open, _) = watch::channel(true);
        Arc::new(Self {
            state: Mutex::new(State::default()),
            latency: Mutex::new(Duration::ZERO),
            writes_open,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    /// Seed a document in remote (wire) form.
    pub fn seed(&self, collection: Collection, doc: Value) {
        let id = doc["_id"].as_str().unwrap_or_default().to_string();
        self.state
            .lock()
            .docs
            .entry(collection)
            .or_default()
            .insert(id, doc);
    }

    pub fn doc(&self, collection: Collection, id: &str) -> Option<Value> {
        self.state.lock().docs.get(&collection)?.get(id).cloned()
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.state.lock().docs.get(&collection).map_or(0, BTreeMap::len)
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn fail_fetch(&self, collection: Collection) {
        self.state.lock().failing_fetches.insert(collection);
    }

    pub fn reject_writes(&self, id: &str, status: u16) {
        self.state.lock().rejected.insert(id.to_string(), status);
    }

    pub fn flaky_writes(&self, id: &str, failures: u32) {
        self.state.lock().flaky.insert(id.to_string(), failures);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Hold every create/update until [`FakeRemote::resume_writes`].
    pub fn pause_writes(&self) {
        self.writes_open.send_replace(false);
    }

    pub fn resume_writes(&self) {
        self.writes_open.send_replace(true);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Highest number of remote calls ever in progress at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: Call) -> Result<ActiveGuard<'_>> {
        let guard = ActiveGuard::new(&self.active, &self.max_active);
        let offline = {
            let mut state = self.state.lock();
            state.calls.push(call);
            state.offline
        };
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(Error::Transport("connection refused".to_string()));
        }
        Ok(guard)
    }

    async fn wait_for_writes(&self) {
        let mut open = self.writes_open.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }

    fn check_write(&self, method: &str, collection: Collection, id: &str) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let status = if let Some(status) = state.rejected.get(id) {
            Some(*status)
        } else if let Some(remaining) = state.flaky.get_mut(id).filter(|n| **n > 0) {
            *remaining -= 1;
            Some(503)
        } else {
            None
        };
        match status {
            Some(status) => Err(Error::RemoteRejected {
                method: method.to_string(),
                path: format!("/{collection}/{id}"),
                status,
            }),
            None => Ok(()),
        }
    }
}

struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn new(active: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn probe(&self) -> Result<()> {
        self.enter(Call::Probe).await.map(|_| ())
    }

    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Value>> {
        let _guard = self.enter(Call::FetchAll(collection)).await?;
        let state = self.state.lock();
        if state.failing_fetches.contains(&collection) {
            return Err(Error::RemoteRejected {
                method: "GET".to_string(),
                path: format!("/{collection}"),
                status: 500,
            });
        }
        Ok(state
            .docs
            .get(&collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn exists(&self, collection: Collection, id: &str) -> Result<bool> {
        let _guard = self.enter(Call::Exists(collection, id.to_string())).await?;
        Ok(self.doc(collection, id).is_some())
    }

    async fn create(&self, collection: Collection, body: Value) -> Result<()> {
        let id = body["_id"].as_str().unwrap_or_default().to_string();
        let _guard = self.enter(Call::Create(collection, id.clone())).await?;
        self.wait_for_writes().await;
        self.check_write("POST", collection, &id)?;
        if self.doc(collection, &id).is_some() {
            return Err(Error::RemoteRejected {
                method: "POST".to_string(),
                path: format!("/{collection}"),
                status: 409,
            });
        }
        self.seed(collection, body);
        Ok(())
    }

    async fn update(&self, collection: Collection, id: &str, body: Value) -> Result<()> {
        let _guard = self.enter(Call::Update(collection, id.to_string())).await?;
        self.wait_for_writes().await;
        self.check_write("PUT", collection, id)?;
        if self.doc(collection, id).is_none() {
            return Err(Error::RemoteRejected {
                method: "PUT".to_string(),
                path: format!("/{collection}/{id}"),
                status: 404,
            });
        }
        self.seed(collection, body);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let _guard = self.enter(Call::Delete(collection, id.to_string())).await?;
        let removed = self
            .state
            .lock()
            .docs
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(Error::RemoteRejected {
                method: "DELETE".to_string(),
                path: format!("/{collection}/{id}"),
                status: 404,
            }),
        }
    }

    async fn fetch_items_for_container(&self, container_id: &str) -> Result<Vec<Value>> {
        let _guard = self.enter(Call::FetchAll(Collection::Items)).await?;
        Ok(self
            .state
            .lock()
            .docs
            .get(&Collection::Items)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc["container_id"] == container_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// [`LocalStore`] wrapper that records how many writes ever overlapped.
pub struct InstrumentedStore {
    inner: MemoryStore,
    writing: AtomicUsize,
    max_writing: AtomicUsize,
}

impl InstrumentedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            writing: AtomicUsize::new(0),
            max_writing: AtomicUsize::new(0),
        })
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.max_writing.load(Ordering::SeqCst)
    }

    async fn write<T>(&self, op: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let _guard = ActiveGuard::new(&self.writing, &self.max_writing);
        // Widen the window so overlapping writers would be caught.
        tokio::task::yield_now().await;
        op.await
    }
}

#[async_trait]
impl LocalStore for InstrumentedStore {
    async fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>> {
        self.inner.find(collection, filter).await
    }

    async fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        self.inner.find_by_id(collection, id).await
    }

    async fn insert(&self, collection: Collection, doc: Value) -> Result<()> {
        self.write(self.inner.insert(collection, doc)).await
    }

    async fn upsert(&self, collection: Collection, doc: Value) -> Result<()> {
        self.write(self.inner.upsert(collection, doc)).await
    }

    async fn update_fields(
        &self,
        collection: Collection,
        id: &str,
        fields: Value,
    ) -> Result<Value> {
        self.write(self.inner.update_fields(collection, id, fields))
            .await
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool> {
        self.write(self.inner.remove(collection, id)).await
    }

    fn subscribe(&self, collection: Collection) -> ChangeStream {
        self.inner.subscribe(collection)
    }
}

/// Configuration with the startup cycle pushed out of the way and a tiny
/// retry backoff.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        initial_sync_delay: Duration::from_secs(3600),
        retry_backoff: Duration::from_millis(1),
        ..EngineConfig::default()
    }
}

/// Poll `cond` until it holds or a few seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
