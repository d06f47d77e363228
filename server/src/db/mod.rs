//! Persistence for containers and items.
//!
//! Handlers talk to a [`Repository`]. [`PgRepository`] keeps data in
//! PostgreSQL; [`MemoryRepository`] keeps it in process for tests and for
//! running without a database.

mod memory;
mod pool;
mod records;

pub use memory::MemoryRepository;
pub use pool::{create_pool, run_migrations, PgRepository, Pool};
pub use records::*;

use crate::error::Result;
use async_trait::async_trait;

/// Storage operations behind the REST routes.
///
/// Inserts fail with [`crate::error::AppError::Conflict`] when the id is
/// taken. Updates and deletes report a missing id through their return value.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Cheap round trip used by the health check.
    async fn ping(&self) -> Result<()>;

    async fn list_containers(&self) -> Result<Vec<ContainerRecord>>;

    async fn get_container(&self, id: &str) -> Result<Option<ContainerRecord>>;

    async fn insert_container(&self, record: ContainerRecord) -> Result<ContainerRecord>;

    async fn update_container(
        &self,
        id: &str,
        fields: ContainerFields,
    ) -> Result<Option<ContainerRecord>>;

    /// Delete a container and its items. Returns the number of items removed,
    /// or `None` if the container did not exist.
    async fn delete_container(&self, id: &str) -> Result<Option<u64>>;

    async fn list_items(&self) -> Result<Vec<ItemRecord>>;

    async fn list_items_for_container(&self, container_id: &str) -> Result<Vec<ItemRecord>>;

    async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>>;

    async fn insert_item(&self, record: ItemRecord) -> Result<ItemRecord>;

    async fn update_item(&self, id: &str, fields: ItemFields) -> Result<Option<ItemRecord>>;

    async fn delete_item(&self, id: &str) -> Result<bool>;
}
