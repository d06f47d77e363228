//! User-facing write path over the local store.
//!
//! Every write lands locally with `isSynced = false` and returns immediately.
//! When the host is online a push-only cycle is requested in the background;
//! its outcome never reaches the caller.

use crate::{
    connectivity::ConnectivityMonitor,
    error::Result,
    record::Document,
    remote::RemoteService,
    replicate::{CycleKind, ReplicationEngine, Trigger},
    store::{Filter, LocalStore, TypedStore},
    Collection, Container, Error, Item, RecordId,
};
use serde_json::json;
use std::sync::Arc;

/// Fields of an item supplied by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub name: String,
    pub quantity: u32,
    pub selling_price: f64,
    pub container_id: RecordId,
}

impl ItemDraft {
    pub fn new(
        name: impl Into<String>,
        quantity: u32,
        selling_price: f64,
        container_id: impl Into<RecordId>,
    ) -> Self {
        Self {
            name: name.into(),
            quantity,
            selling_price,
            container_id: container_id.into(),
        }
    }

    fn into_item(self, id: RecordId) -> Item {
        Item::new(id, self.name, self.quantity, self.selling_price, self.container_id)
    }
}

/// Containers and items as the application sees them.
pub struct Inventory {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteService>,
    engine: Arc<ReplicationEngine>,
    monitor: ConnectivityMonitor,
}

impl Inventory {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteService>,
        engine: Arc<ReplicationEngine>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        Self {
            store,
            remote,
            engine,
            monitor,
        }
    }

    pub async fn list_containers(&self) -> Result<Vec<Container>> {
        self.store.all::<Container>().await
    }

    pub async fn get_container(&self, id: &str) -> Result<Option<Container>> {
        self.store.get::<Container>(id).await
    }

    /// Items whose `containerId` is `container_id`.
    pub async fn list_items(&self, container_id: &str) -> Result<Vec<Item>> {
        self.store
            .query::<Item>(&Filter::eq("containerId", container_id))
            .await
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        self.store.get::<Item>(id).await
    }

    /// Create a container with a fresh id.
    pub async fn create_container(&self, name: impl Into<String>) -> Result<Container> {
        let container = Container::new(new_id(), name);
        self.store
            .insert(Collection::Containers, checked(&container)?)
            .await?;
        tracing::debug!(id = %container.id, "Container created locally");
        self.request_push();
        Ok(container)
    }

    pub async fn update_container(&self, id: &str, name: impl Into<String>) -> Result<Container> {
        let updated = self
            .store
            .update_fields(
                Collection::Containers,
                id,
                json!({ "name": name.into(), "isSynced": false }),
            )
            .await?;
        self.request_push();
        Container::from_document(&updated)
    }

    /// Remove a container and, first, every item it owns. Returns the number
    /// of items removed.
    pub async fn delete_container(&self, id: &str) -> Result<usize> {
        if self.store.find_by_id(Collection::Containers, id).await?.is_none() {
            return Err(Error::not_found(Collection::Containers, id));
        }

        let mut removed = 0;
        for item in self.list_items(id).await? {
            if self.store.remove(Collection::Items, &item.id).await? {
                removed += 1;
            }
        }
        self.store.remove(Collection::Containers, id).await?;
        tracing::debug!(%id, items = removed, "Container deleted locally");

        if self.engine.config().propagate_container_deletes {
            self.delete_remote(Collection::Containers, id).await;
        }
        Ok(removed)
    }

    /// Create an item with a fresh id in an existing container.
    pub async fn create_item(&self, draft: ItemDraft) -> Result<Item> {
        self.require_container(&draft.container_id).await?;
        let item = draft.into_item(new_id());
        self.store
            .insert(Collection::Items, checked(&item)?)
            .await?;
        tracing::debug!(id = %item.id, container = %item.container_id, "Item created locally");
        self.request_push();
        Ok(item)
    }

    /// Replace every user field of an item.
    pub async fn update_item(&self, id: &str, draft: ItemDraft) -> Result<Item> {
        if self.store.find_by_id(Collection::Items, id).await?.is_none() {
            return Err(Error::not_found(Collection::Items, id));
        }
        self.require_container(&draft.container_id).await?;

        let item = draft.into_item(id.to_string());
        self.store
            .upsert(Collection::Items, checked(&item)?)
            .await?;
        self.request_push();
        Ok(item)
    }

    /// Remove an item locally, then try the remote delete if online.
    pub async fn delete_item(&self, id: &str) -> Result<()> {
        if !self.store.remove(Collection::Items, id).await? {
            return Err(Error::not_found(Collection::Items, id));
        }
        tracing::debug!(%id, "Item deleted locally");
        self.delete_remote(Collection::Items, id).await;
        Ok(())
    }

    async fn require_container(&self, id: &str) -> Result<()> {
        match self.store.find_by_id(Collection::Containers, id).await? {
            Some(_) => Ok(()),
            None => Err(Error::not_found(Collection::Containers, id)),
        }
    }

    /// Best effort; the local removal already happened.
    async fn delete_remote(&self, collection: Collection, id: &str) {
        if !self.monitor.is_online() {
            return;
        }
        if let Err(e) = self.remote.delete(collection, id).await {
            tracing::warn!(%collection, %id, error = %e, "Remote delete failed");
        }
    }

    fn request_push(&self) {
        if self.monitor.is_online() {
            self.engine.trigger(CycleKind::PushOnly, Trigger::LocalWrite);
        }
    }
}

fn new_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

/// Validate before serializing so callers get a field-level error.
fn checked<D: Document>(record: &D) -> Result<serde_json::Value> {
    record.validate()?;
    record.to_document()
}
