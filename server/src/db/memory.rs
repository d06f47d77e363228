//! In-process [`Repository`] backed by `DashMap`.

use super::{ContainerFields, ContainerRecord, ItemFields, ItemRecord, Repository};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};

#[derive(Debug, Default)]
pub struct MemoryRepository {
    containers: DashMap<String, ContainerRecord>,
    items: DashMap<String, ItemRecord>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted<T: Clone>(iter: impl Iterator<Item = T>, key: impl Fn(&T) -> (i64, String)) -> Vec<T> {
    let mut rows: Vec<T> = iter.collect();
    rows.sort_by_key(key);
    rows
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        Ok(sorted(
            self.containers.iter().map(|r| r.value().clone()),
            |c| (c.created_at.timestamp_micros(), c.id.clone()),
        ))
    }

    async fn get_container(&self, id: &str) -> Result<Option<ContainerRecord>> {
        Ok(self.containers.get(id).map(|r| r.value().clone()))
    }

    async fn insert_container(&self, record: ContainerRecord) -> Result<ContainerRecord> {
        match self.containers.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!("container {}", record.id))),
            Entry::Vacant(slot) => Ok(slot.insert(record).value().clone()),
        }
    }

    async fn update_container(
        &self,
        id: &str,
        fields: ContainerFields,
    ) -> Result<Option<ContainerRecord>> {
        Ok(self.containers.get_mut(id).map(|mut record| {
            record.name = fields.name;
            record.updated_at = Utc::now();
            record.value().clone()
        }))
    }

    async fn delete_container(&self, id: &str) -> Result<Option<u64>> {
        if self.containers.remove(id).is_none() {
            return Ok(None);
        }
        let before = self.items.len();
        self.items.retain(|_, item| item.container_id != id);
        Ok(Some((before - self.items.len()) as u64))
    }

    async fn list_items(&self) -> Result<Vec<ItemRecord>> {
        Ok(sorted(
            self.items.iter().map(|r| r.value().clone()),
            |i| (i.created_at.timestamp_micros(), i.id.clone()),
        ))
    }

    async fn list_items_for_container(&self, container_id: &str) -> Result<Vec<ItemRecord>> {
        Ok(sorted(
            self.items
                .iter()
                .filter(|r| r.container_id == container_id)
                .map(|r| r.value().clone()),
            |i| (i.created_at.timestamp_micros(), i.id.clone()),
        ))
    }

    async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>> {
        Ok(self.items.get(id).map(|r| r.value().clone()))
    }

    async fn insert_item(&self, record: ItemRecord) -> Result<ItemRecord> {
        match self.items.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!("item {}", record.id))),
            Entry::Vacant(slot) => Ok(slot.insert(record).value().clone()),
        }
    }

    async fn update_item(&self, id: &str, fields: ItemFields) -> Result<Option<ItemRecord>> {
        Ok(self.items.get_mut(id).map(|mut record| {
            record.name = fields.name;
            record.qty = fields.qty;
            record.selling_price = fields.selling_price;
            record.container_id = fields.container_id;
            record.updated_at = Utc::now();
            record.value().clone()
        }))
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
        Ok(self.items.remove(id).is_some())
    }
}
