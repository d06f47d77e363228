//! Record types held in the local store.
//!
//! Local documents use camelCase field names (`isSynced`, `sellingPrice`,
//! `containerId`). The remote schema is translated in [`crate::wire`].

use crate::{error::Result, Error, RecordId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Longest accepted `id` or `name`, in characters.
pub const MAX_TEXT_LEN: usize = 100;

/// The two collections replicated by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Containers,
    Items,
}

impl Collection {
    /// Processing order for every phase. Containers come first so items
    /// never reference a container the other side has not seen yet.
    pub const ALL: [Collection; 2] = [Collection::Containers, Collection::Items];

    /// Collection name, also the remote path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Containers => "containers",
            Collection::Items => "items",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed record stored in one of the collections.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The collection this record type lives in.
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    fn is_synced(&self) -> bool;

    /// Check the record against the local schema.
    fn validate(&self) -> Result<()>;

    /// The record this one references, if any.
    fn parent(&self) -> Option<(Collection, &str)> {
        None
    }

    /// Convert to a local JSON document.
    fn to_document(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::validation("document", e.to_string()))
    }

    /// Parse and validate a local JSON document.
    fn from_document(doc: &serde_json::Value) -> Result<Self> {
        let record: Self = serde_json::from_value(doc.clone())
            .map_err(|e| Error::validation(Self::COLLECTION.as_str(), e.to_string()))?;
        record.validate()?;
        Ok(record)
    }
}

/// A container (business) owning zero or more items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub is_synced: bool,
}

impl Container {
    /// Create a locally-authored container (not yet synced).
    pub fn new(id: impl Into<RecordId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_synced: false,
        }
    }
}

impl Document for Container {
    const COLLECTION: Collection = Collection::Containers;

    fn id(&self) -> &str {
        &self.id
    }

    fn is_synced(&self) -> bool {
        self.is_synced
    }

    fn validate(&self) -> Result<()> {
        validate_text("id", &self.id)?;
        validate_text("name", &self.name)
    }
}

/// A line item (article) belonging to a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: RecordId,
    pub name: String,
    pub quantity: u32,
    pub selling_price: f64,
    pub container_id: RecordId,
    #[serde(default)]
    pub is_synced: bool,
}

impl Item {
    /// Create a locally-authored item (not yet synced).
    pub fn new(
        id: impl Into<RecordId>,
        name: impl Into<String>,
        quantity: u32,
        selling_price: f64,
        container_id: impl Into<RecordId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quantity,
            selling_price,
            container_id: container_id.into(),
            is_synced: false,
        }
    }
}

impl Document for Item {
    const COLLECTION: Collection = Collection::Items;

    fn id(&self) -> &str {
        &self.id
    }

    fn parent(&self) -> Option<(Collection, &str)> {
        Some((Collection::Containers, &self.container_id))
    }

    fn is_synced(&self) -> bool {
        self.is_synced
    }

    fn validate(&self) -> Result<()> {
        validate_text("id", &self.id)?;
        validate_text("name", &self.name)?;
        validate_text("containerId", &self.container_id)?;
        if !self.selling_price.is_finite() || self.selling_price < 0.0 {
            return Err(Error::validation(
                "sellingPrice",
                format!("must be a non-negative number, got {}", self.selling_price),
            ));
        }
        Ok(())
    }
}

fn validate_text(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    let len = value.chars().count();
    if len > MAX_TEXT_LEN {
        return Err(Error::validation(
            field,
            format!("at most {MAX_TEXT_LEN} characters, got {len}"),
        ));
    }
    Ok(())
}

/// Validate a raw document for `collection` through its typed model and
/// return it with defaults filled in and unknown fields dropped.
pub fn normalize_document(
    collection: Collection,
    doc: &serde_json::Value,
) -> Result<serde_json::Value> {
    match collection {
        Collection::Containers => Container::from_document(doc)?.to_document(),
        Collection::Items => Item::from_document(doc)?.to_document(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn container_serializes_camel_case() {
        let container = Container::new("c1", "Corner Shop");
        let doc = container.to_document().unwrap();
        assert_eq!(doc, json!({"id": "c1", "name": "Corner Shop", "isSynced": false}));
    }

    #[test]
    fn item_serializes_camel_case() {
        let item = Item::new("i1", "Widget", 3, 9.99, "c1");
        let doc = item.to_document().unwrap();
        assert_eq!(doc["sellingPrice"], json!(9.99));
        assert_eq!(doc["containerId"], json!("c1"));
        assert_eq!(doc["quantity"], json!(3));
        assert_eq!(doc["isSynced"], json!(false));
    }

    #[test]
    fn missing_sync_flag_defaults_to_false() {
        let container = Container::from_document(&json!({"id": "c1", "name": "Shop"})).unwrap();
        assert!(!container.is_synced);
    }

    #[test]
    fn negative_price_rejected() {
        let item = Item::new("i1", "Widget", 1, -0.5, "c1");
        assert!(matches!(
            item.validate(),
            Err(Error::Validation { ref field, .. }) if field == "sellingPrice"
        ));
    }

    #[test]
    fn negative_quantity_rejected_by_type() {
        let doc = json!({
            "id": "i1", "name": "Widget", "quantity": -1,
            "sellingPrice": 1.0, "containerId": "c1"
        });
        assert!(matches!(
            Item::from_document(&doc),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn long_name_rejected() {
        let container = Container::new("c1", "x".repeat(MAX_TEXT_LEN + 1));
        assert!(container.validate().is_err());

        let container = Container::new("c1", "x".repeat(MAX_TEXT_LEN));
        assert!(container.validate().is_ok());
    }

    #[test]
    fn empty_id_rejected() {
        assert!(Container::new("", "Shop").validate().is_err());
    }

    #[test]
    fn normalize_fills_defaults_and_drops_unknown_fields() {
        let doc = normalize_document(
            Collection::Containers,
            &json!({"id": "c1", "name": "Shop", "color": "red"}),
        )
        .unwrap();
        assert_eq!(doc, json!({"id": "c1", "name": "Shop", "isSynced": false}));
    }

    #[test]
    fn collection_order_and_names() {
        assert_eq!(Collection::ALL, [Collection::Containers, Collection::Items]);
        assert_eq!(Collection::Containers.to_string(), "containers");
        assert_eq!(Collection::Items.as_str(), "items");
    }
}
