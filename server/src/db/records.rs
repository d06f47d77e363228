//! Stored rows and request payloads for containers and items.
//!
//! Field names follow the wire format the replication engine speaks:
//! `_id`, `qty`, `selling_price`, `container_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use stockroom_engine::{Container, Document, Item};

/// A container row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ContainerRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ContainerRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl ContainerRecord {
    pub fn new(id: String, fields: ContainerFields) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: fields.name,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An item row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub qty: u32,
    pub selling_price: f64,
    pub container_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ItemRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        let qty: i64 = row.try_get("qty")?;
        Ok(ItemRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            qty: u32::try_from(qty).map_err(|e| sqlx::Error::ColumnDecode {
                index: "qty".to_string(),
                source: Box::new(e),
            })?,
            selling_price: row.try_get("selling_price")?,
            container_id: row.try_get("container_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl ItemRecord {
    pub fn new(id: String, fields: ItemFields) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: fields.name,
            qty: fields.qty,
            selling_price: fields.selling_price,
            container_id: fields.container_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Writable container fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContainerFields {
    pub name: String,
}

impl ContainerFields {
    /// Apply the same rules the client store enforces.
    pub fn validate(&self, id: &str) -> Result<(), stockroom_engine::Error> {
        Container::new(id, self.name.clone()).validate()
    }
}

/// Writable item fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ItemFields {
    pub name: String,
    pub qty: u32,
    pub selling_price: f64,
    #[serde(alias = "business_id")]
    pub container_id: String,
}

impl ItemFields {
    /// Apply the same rules the client store enforces.
    pub fn validate(&self, id: &str) -> Result<(), stockroom_engine::Error> {
        Item::new(
            id,
            self.name.clone(),
            self.qty,
            self.selling_price,
            self.container_id.clone(),
        )
        .validate()
    }
}

/// Request body for creating or replacing a container.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerPayload {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: ContainerFields,
}

/// Request body for creating or replacing an item.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemPayload {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: ItemFields,
}
