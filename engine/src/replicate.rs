//! Replication engine - moves data between the local store and the remote.
//!
//! # Cycle
//!
//! 1. Probe the remote. If the probe fails the cycle is aborted.
//! 2. Pull (full cycles only): for containers then items, fetch every remote
//!    record and overwrite or insert the local copy, marked synced. The
//!    remote always wins, so an unsynced local edit to a record that exists
//!    remotely is discarded.
//! 3. Push: for containers then items, send every unsynced record (update if
//!    the remote has it, create otherwise) and mark it synced once the remote
//!    answered with success.
//!
//! Failures on one record are logged and counted; they never stop the rest of
//! the phase. Nothing from a cycle is surfaced to interactive callers apart
//! from the [`CycleReport`] returned by explicit requests.
//!
//! # Triggers
//!
//! A delayed startup cycle, every Offline -> Online transition seen on the
//! [`ConnectivityMonitor`], and explicit requests. All of them go through one
//! [`SingleFlight`] gate.

use crate::{
    config::EngineConfig,
    connectivity::{Connectivity, ConnectivityMonitor},
    error::Result,
    flight::{Admission, Coalesce, SingleFlight},
    record::Document,
    remote::{decode, encode, remote_id, RemoteService},
    store::{Filter, LocalStore},
    wire::{RemoteContainer, RemoteItem},
    Collection, Container, Item,
};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// What a cycle does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Probe, pull, push.
    Full,
    /// Probe, push. Used after local writes so pending edits are not
    /// overwritten by a pull.
    PushOnly,
}

impl Coalesce for CycleKind {
    fn coalesce(self, other: Self) -> Self {
        if self == CycleKind::Full || other == CycleKind::Full {
            CycleKind::Full
        } else {
            CycleKind::PushOnly
        }
    }
}

/// Why a cycle was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Reconnected,
    Explicit,
    LocalWrite,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// The connectivity probe failed; nothing was pulled or pushed.
    Aborted(String),
    /// The cycle task died or the engine went away before reporting.
    Failed(String),
}

/// Per-collection counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseStats {
    /// Remote records applied locally
    pub pulled: usize,
    /// Local records confirmed by the remote and marked synced
    pub pushed: usize,
    /// Records edited or removed locally while their push was in flight
    pub deferred: usize,
    /// Records that failed to pull or push
    pub failed: usize,
    /// Set when a whole phase could not run (remote fetch or local query)
    pub error: Option<String>,
}

impl PhaseStats {
    fn merge(&mut self, other: PhaseStats) {
        self.pulled += other.pulled;
        self.pushed += other.pushed;
        self.deferred += other.deferred;
        self.failed += other.failed;
        if self.error.is_none() {
            self.error = other.error;
        }
    }
}

/// Summary of one replication cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub kind: CycleKind,
    pub outcome: CycleOutcome,
    pub containers: PhaseStats,
    pub items: PhaseStats,
}

impl CycleReport {
    fn new(kind: CycleKind, outcome: CycleOutcome) -> Self {
        Self {
            kind,
            outcome,
            containers: PhaseStats::default(),
            items: PhaseStats::default(),
        }
    }

    pub fn stats(&self, collection: Collection) -> &PhaseStats {
        match collection {
            Collection::Containers => &self.containers,
            Collection::Items => &self.items,
        }
    }

    fn stats_mut(&mut self, collection: Collection) -> &mut PhaseStats {
        match collection {
            Collection::Containers => &mut self.containers,
            Collection::Items => &mut self.items,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == CycleOutcome::Completed
    }

    pub fn pulled(&self) -> usize {
        self.containers.pulled + self.items.pulled
    }

    pub fn pushed(&self) -> usize {
        self.containers.pushed + self.items.pushed
    }

    pub fn failed(&self) -> usize {
        self.containers.failed + self.items.failed
    }

    fn log(&self, trigger: Trigger) {
        match &self.outcome {
            CycleOutcome::Completed => tracing::info!(
                ?trigger,
                kind = ?self.kind,
                pulled = self.pulled(),
                pushed = self.pushed(),
                failed = self.failed(),
                "Replication cycle completed"
            ),
            CycleOutcome::Aborted(reason) => {
                tracing::warn!(?trigger, %reason, "Replication cycle aborted")
            }
            CycleOutcome::Failed(reason) => {
                tracing::error!(?trigger, %reason, "Replication cycle failed")
            }
        }
    }
}

/// Result of pushing one record.
enum PushOutcome {
    Synced,
    /// The local copy changed or vanished while the push was in flight.
    Deferred,
}

/// Orchestrates replication cycles between a [`LocalStore`] and a
/// [`RemoteService`].
pub struct ReplicationEngine {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteService>,
    config: EngineConfig,
    flight: SingleFlight<CycleKind, CycleReport>,
    reports: broadcast::Sender<CycleReport>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ReplicationEngine {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteService>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (reports, _) = broadcast::channel(64);
        Arc::new(Self {
            store,
            remote,
            config,
            flight: SingleFlight::new(),
            reports,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a cycle is currently running.
    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    /// Receive the report of every cycle run from now on.
    pub fn reports(&self) -> broadcast::Receiver<CycleReport> {
        self.reports.subscribe()
    }

    /// Spawn the startup trigger and the connectivity listener.
    pub fn start(self: &Arc<Self>, monitor: &ConnectivityMonitor) {
        let startup = {
            let this = Arc::clone(self);
            let delay = self.config.initial_sync_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                tracing::info!("Attempting initial sync");
                this.request(CycleKind::Full, Trigger::Startup).await;
            })
        };

        let listener = {
            let this = Arc::clone(self);
            let mut subscription = monitor.subscribe();
            tokio::spawn(async move {
                let mut previous: Option<Connectivity> = None;
                while let Some(state) = subscription.recv().await {
                    match state {
                        Connectivity::Online if previous == Some(Connectivity::Offline) => {
                            tracing::info!("Network is available, starting sync");
                            this.trigger(CycleKind::Full, Trigger::Reconnected);
                        }
                        Connectivity::Online => {}
                        Connectivity::Offline => {
                            tracing::info!("Network unavailable, working offline");
                        }
                    }
                    previous = Some(state);
                }
            })
        };

        self.tasks.lock().extend([startup, listener]);
    }

    /// Stop the trigger tasks. A cycle already running finishes on its own.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Run a full cycle (or join the follow-up of the running one) and wait
    /// for its report.
    pub async fn sync_now(self: &Arc<Self>) -> CycleReport {
        self.request(CycleKind::Full, Trigger::Explicit).await
    }

    /// Run a push-only cycle and wait for its report.
    pub async fn push_now(self: &Arc<Self>) -> CycleReport {
        self.request(CycleKind::PushOnly, Trigger::Explicit).await
    }

    /// Request a cycle without waiting for it.
    pub fn trigger(self: &Arc<Self>, kind: CycleKind, trigger: Trigger) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.request(kind, trigger).await;
        });
    }

    async fn request(self: &Arc<Self>, kind: CycleKind, trigger: Trigger) -> CycleReport {
        let report = match self.flight.admit(kind) {
            Admission::Lead => {
                let (tx, rx) = oneshot::channel();
                let this = Arc::clone(self);
                // The owner runs detached so that dropping the caller cannot
                // leave the flight marked as running.
                tokio::spawn(async move {
                    let report = this.execute(kind).await;
                    let _ = tx.send(report);
                    while let Some(follow_up) = this.flight.finish() {
                        tracing::debug!(kind = ?follow_up.request, waiters = follow_up.waiters.len(), "Running coalesced follow-up cycle");
                        let report = this.execute(follow_up.request).await;
                        follow_up.complete(&report);
                    }
                });
                rx.await
            }
            Admission::Follow(rx) => {
                tracing::debug!(?trigger, "Cycle in progress, queued for follow-up");
                rx.await
            }
        };

        let report = report.unwrap_or_else(|_| {
            CycleReport::new(kind, CycleOutcome::Failed("cycle owner went away".to_string()))
        });
        report.log(trigger);
        report
    }

    /// Run one cycle in its own task so a panic cannot wedge the flight.
    async fn execute(self: &Arc<Self>, kind: CycleKind) -> CycleReport {
        let this = Arc::clone(self);
        let report = match tokio::spawn(async move { this.run_cycle(kind).await }).await {
            Ok(report) => report,
            Err(e) => CycleReport::new(kind, CycleOutcome::Failed(e.to_string())),
        };
        let _ = self.reports.send(report.clone());
        report
    }

    async fn run_cycle(&self, kind: CycleKind) -> CycleReport {
        tracing::info!(?kind, "Starting replication cycle");

        if let Err(e) = self.remote.probe().await {
            tracing::warn!(error = %e, "Connection test failed, aborting sync");
            return CycleReport::new(kind, CycleOutcome::Aborted(e.to_string()));
        }

        let mut report = CycleReport::new(kind, CycleOutcome::Completed);
        if kind == CycleKind::Full {
            for collection in Collection::ALL {
                let stats = self.pull(collection).await;
                report.stats_mut(collection).merge(stats);
            }
        }
        for collection in Collection::ALL {
            let stats = self.push(collection).await;
            report.stats_mut(collection).merge(stats);
        }
        report
    }

    /// Pull phase for one collection.
    pub async fn pull(&self, collection: Collection) -> PhaseStats {
        match collection {
            Collection::Containers => self.pull_collection::<RemoteContainer, Container>().await,
            Collection::Items => self.pull_collection::<RemoteItem, Item>().await,
        }
    }

    /// Push phase for one collection.
    pub async fn push(&self, collection: Collection) -> PhaseStats {
        match collection {
            Collection::Containers => self.push_collection::<Container, RemoteContainer>().await,
            Collection::Items => self.push_collection::<Item, RemoteItem>().await,
        }
    }

    async fn pull_collection<W, D>(&self) -> PhaseStats
    where
        W: DeserializeOwned + Into<D>,
        D: Document,
    {
        let collection = D::COLLECTION;
        let mut stats = PhaseStats::default();

        let docs = match self.remote.fetch_all(collection).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(%collection, error = %e, "Failed to fetch from server");
                stats.error = Some(e.to_string());
                return stats;
            }
        };

        for doc in docs {
            let id = remote_id(&doc).unwrap_or_default();
            match self.apply_remote::<W, D>(doc).await {
                Ok(true) => stats.pulled += 1,
                Ok(false) => {
                    tracing::warn!(%collection, %id, "Parent record not present locally, skipping");
                    stats.deferred += 1;
                }
                Err(e) => {
                    tracing::warn!(%collection, %id, error = %e, "Failed to apply remote record");
                    stats.failed += 1;
                }
            }
        }

        tracing::debug!(%collection, pulled = stats.pulled, failed = stats.failed, "Pull finished");
        stats
    }

    /// Write one remote record locally. Returns `false` when its parent is
    /// missing from the store, in which case nothing is written.
    async fn apply_remote<W, D>(&self, doc: Value) -> Result<bool>
    where
        W: DeserializeOwned + Into<D>,
        D: Document,
    {
        let collection = D::COLLECTION;
        let record: D = decode::<W>(collection, doc)?.into();
        if let Some((parent, parent_id)) = record.parent() {
            if self.store.find_by_id(parent, parent_id).await?.is_none() {
                return Ok(false);
            }
        }
        let local = record.to_document()?;

        if self.store.find_by_id(collection, record.id()).await?.is_some() {
            self.store
                .update_fields(collection, record.id(), local)
                .await?;
        } else {
            self.store.insert(collection, local).await?;
        }
        Ok(true)
    }

    async fn push_collection<D, W>(&self) -> PhaseStats
    where
        D: Document,
        W: Serialize + for<'a> From<&'a D>,
    {
        let collection = D::COLLECTION;
        let mut stats = PhaseStats::default();

        let pending = match self.store.find(collection, &Filter::unsynced()).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::error!(%collection, error = %e, "Failed to list unsynced records");
                stats.error = Some(e.to_string());
                return stats;
            }
        };
        tracing::debug!(%collection, count = pending.len(), "Found unsynced records");

        for snapshot in pending {
            let record = match D::from_document(&snapshot) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(%collection, error = %e, "Skipping malformed local record");
                    stats.failed += 1;
                    continue;
                }
            };

            if let Some((parent, parent_id)) = record.parent() {
                if !self.parent_on_remote(parent, parent_id).await {
                    tracing::debug!(%collection, id = record.id(), %parent, parent_id, "Parent not on server yet, deferring");
                    stats.deferred += 1;
                    continue;
                }
            }

            match self.push_record::<D, W>(&record, &snapshot).await {
                Ok(PushOutcome::Synced) => {
                    tracing::debug!(%collection, id = record.id(), "Synced record to server");
                    stats.pushed += 1;
                }
                Ok(PushOutcome::Deferred) => {
                    tracing::debug!(%collection, id = record.id(), "Record changed during push, leaving unsynced");
                    stats.deferred += 1;
                }
                Err(e) => {
                    tracing::warn!(%collection, id = record.id(), error = %e, "Failed to sync record");
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    /// Whether `id` is known to exist remotely: synced locally, or confirmed
    /// by the server. Lookup failures count as absent.
    async fn parent_on_remote(&self, collection: Collection, id: &str) -> bool {
        let synced = match self.store.find_by_id(collection, id).await {
            Ok(Some(doc)) => doc.get("isSynced").and_then(Value::as_bool) == Some(true),
            _ => false,
        };
        synced || matches!(self.remote.exists(collection, id).await, Ok(true))
    }

    async fn push_record<D, W>(&self, record: &D, snapshot: &Value) -> Result<PushOutcome>
    where
        D: Document,
        W: Serialize + for<'a> From<&'a D>,
    {
        let collection = D::COLLECTION;
        let body = encode(&W::from(record))?;

        let mut attempt = 1;
        loop {
            match self.send_record(collection, record.id(), body.clone()).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < self.config.push_attempts => {
                    tracing::debug!(%collection, id = record.id(), attempt, error = %e, "Push attempt failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.mark_synced(collection, record.id(), snapshot).await
    }

    async fn send_record(&self, collection: Collection, id: &str, body: Value) -> Result<()> {
        if self.remote.exists(collection, id).await? {
            self.remote.update(collection, id, body).await
        } else {
            self.remote.create(collection, body).await
        }
    }

    /// Flip `isSynced` only if the stored document is still the one pushed.
    async fn mark_synced(
        &self,
        collection: Collection,
        id: &str,
        snapshot: &Value,
    ) -> Result<PushOutcome> {
        match self.store.find_by_id(collection, id).await? {
            Some(current) if current == *snapshot => {
                self.store
                    .update_fields(collection, id, json!({ "isSynced": true }))
                    .await?;
                Ok(PushOutcome::Synced)
            }
            _ => Ok(PushOutcome::Deferred),
        }
    }
}
