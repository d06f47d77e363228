//! PostgreSQL pool management and the [`PgRepository`].

use super::{ContainerFields, ContainerRecord, ItemFields, ItemRecord, Repository};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Type alias for the database pool.
pub type Pool = PgPool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> std::result::Result<Pool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations.
pub async fn run_migrations(pool: &Pool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

const CONTAINER_COLUMNS: &str = "id, name, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, name, qty, selling_price, container_id, created_at, updated_at";

/// [`Repository`] over PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: Pool,
}

impl PgRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let pool = create_pool(database_url).await?;
        tracing::info!("Running database migrations...");
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        let rows = sqlx::query_as::<_, ContainerRecord>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_container(&self, id: &str) -> Result<Option<ContainerRecord>> {
        let row = sqlx::query_as::<_, ContainerRecord>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_container(&self, record: ContainerRecord) -> Result<ContainerRecord> {
        sqlx::query_as::<_, ContainerRecord>(&format!(
            r#"
            INSERT INTO containers (id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            RETURNING {CONTAINER_COLUMNS}
            "#
        ))
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Conflict(format!("container {}", record.id)))
    }

    async fn update_container(
        &self,
        id: &str,
        fields: ContainerFields,
    ) -> Result<Option<ContainerRecord>> {
        let row = sqlx::query_as::<_, ContainerRecord>(&format!(
            r#"
            UPDATE containers SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {CONTAINER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&fields.name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_container(&self, id: &str) -> Result<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let items = sqlx::query("DELETE FROM items WHERE container_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let containers = sqlx::query("DELETE FROM containers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if containers == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(items))
    }

    async fn list_items(&self) -> Result<Vec<ItemRecord>> {
        let rows = sqlx::query_as::<_, ItemRecord>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_items_for_container(&self, container_id: &str) -> Result<Vec<ItemRecord>> {
        let rows = sqlx::query_as::<_, ItemRecord>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE container_id = $1 ORDER BY created_at, id"
        ))
        .bind(container_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>> {
        let row = sqlx::query_as::<_, ItemRecord>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_item(&self, record: ItemRecord) -> Result<ItemRecord> {
        sqlx::query_as::<_, ItemRecord>(&format!(
            r#"
            INSERT INTO items (id, name, qty, selling_price, container_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(&record.id)
        .bind(&record.name)
        .bind(i64::from(record.qty))
        .bind(record.selling_price)
        .bind(&record.container_id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Conflict(format!("item {}", record.id)))
    }

    async fn update_item(&self, id: &str, fields: ItemFields) -> Result<Option<ItemRecord>> {
        let row = sqlx::query_as::<_, ItemRecord>(&format!(
            r#"
            UPDATE items
            SET name = $2, qty = $3, selling_price = $4, container_id = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&fields.name)
        .bind(i64::from(fields.qty))
        .bind(fields.selling_price)
        .bind(&fields.container_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }
}
