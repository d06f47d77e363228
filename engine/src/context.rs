//! Application context wiring the store, remote, monitor and engine together.

use crate::{
    config::EngineConfig,
    connectivity::{Connectivity, ConnectivityMonitor},
    error::Result,
    inventory::Inventory,
    remote::{HttpRemote, RemoteService},
    replicate::ReplicationEngine,
    snapshot::FallbackCache,
    store::{LocalStore, MemoryStore},
    Error,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One running replica: local store, replication engine and write path.
pub struct Stockroom {
    store: Arc<dyn LocalStore>,
    monitor: ConnectivityMonitor,
    engine: Arc<ReplicationEngine>,
    inventory: Inventory,
    tasks: Vec<JoinHandle<()>>,
}

impl Stockroom {
    /// Wire the given components together and start the engine triggers.
    ///
    /// When a cache path is configured the cache is restored into `store`
    /// first and then kept up to date. A cache that cannot be read is logged
    /// and ignored.
    pub async fn open(
        config: EngineConfig,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteService>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        let mut tasks = Vec::new();
        if let Some(path) = &config.cache_path {
            let cache = FallbackCache::new(path);
            if let Err(e) = cache.restore(store.as_ref()).await {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable fallback cache");
            }
            tasks.push(cache.spawn_writer(Arc::clone(&store)));
        }

        let engine = ReplicationEngine::new(Arc::clone(&store), Arc::clone(&remote), config);
        engine.start(&monitor);
        let inventory = Inventory::new(
            Arc::clone(&store),
            remote,
            Arc::clone(&engine),
            monitor.clone(),
        );

        Self {
            store,
            monitor,
            engine,
            inventory,
            tasks,
        }
    }

    /// In-memory store, HTTP remote and a probing monitor, all from `config`.
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        reqwest::Url::parse(&config.remote_url).map_err(|e| Error::Config {
            key: "STOCKROOM_REMOTE_URL".to_string(),
            reason: e.to_string(),
        })?;
        let remote: Arc<dyn RemoteService> = Arc::new(HttpRemote::new(config.remote_url.clone()));
        let initial = Connectivity::from_online(remote.probe().await.is_ok());
        tracing::info!(remote = %config.remote_url, state = ?initial, "Connecting replica");

        let monitor = ConnectivityMonitor::new(initial);
        let probe = monitor.spawn_probe(Arc::clone(&remote), config.probe_interval);

        let mut stockroom = Self::open(config, Arc::new(MemoryStore::new()), remote, monitor).await;
        stockroom.tasks.push(probe);
        Ok(stockroom)
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn engine(&self) -> &Arc<ReplicationEngine> {
        &self.engine
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Stop background tasks. A running cycle is left to finish.
    pub fn shutdown(&mut self) {
        self.engine.shutdown();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        tracing::info!("Replica shut down");
    }
}

impl Drop for Stockroom {
    fn drop(&mut self) {
        self.engine.shutdown();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
