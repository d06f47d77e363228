//! Remote wire format and field-name translation.
//!
//! The remote service stores Mongo-style documents:
//!
//! | local          | remote          |
//! |----------------|-----------------|
//! | `id`           | `_id`           |
//! | `quantity`     | `qty`           |
//! | `sellingPrice` | `selling_price` |
//! | `containerId`  | `container_id`  |
//!
//! `isSynced` never crosses the wire. Anything pulled from the remote is
//! materialized as synced.

use crate::{Container, Item, RecordId};
use serde::{Deserialize, Serialize};

/// A container as stored by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContainer {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub name: String,
}

/// An item as stored by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub name: String,
    pub qty: u32,
    pub selling_price: f64,
    /// Older deployments still send `business_id`.
    #[serde(alias = "business_id")]
    pub container_id: RecordId,
}

impl From<&Container> for RemoteContainer {
    fn from(c: &Container) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
        }
    }
}

impl From<RemoteContainer> for Container {
    fn from(r: RemoteContainer) -> Self {
        Self {
            id: r.id,
            name: r.name,
            is_synced: true,
        }
    }
}

impl From<&Item> for RemoteItem {
    fn from(i: &Item) -> Self {
        Self {
            id: i.id.clone(),
            name: i.name.clone(),
            qty: i.quantity,
            selling_price: i.selling_price,
            container_id: i.container_id.clone(),
        }
    }
}

impl From<RemoteItem> for Item {
    fn from(r: RemoteItem) -> Self {
        Self {
            id: r.id,
            name: r.name,
            quantity: r.qty,
            selling_price: r.selling_price,
            container_id: r.container_id,
            is_synced: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_outbound_field_names() {
        let item = Item::new("i1", "Widget", 3, 9.99, "C1");
        let body = serde_json::to_value(RemoteItem::from(&item)).unwrap();
        assert_eq!(
            body,
            json!({
                "_id": "i1",
                "name": "Widget",
                "qty": 3,
                "selling_price": 9.99,
                "container_id": "C1"
            })
        );
        assert!(body.get("isSynced").is_none());
    }

    #[test]
    fn container_outbound_field_names() {
        let body = serde_json::to_value(RemoteContainer::from(&Container::new("c1", "Shop")))
            .unwrap();
        assert_eq!(body, json!({"_id": "c1", "name": "Shop"}));
    }

    #[test]
    fn inbound_item_is_marked_synced() {
        let remote: RemoteItem = serde_json::from_value(json!({
            "_id": "i1",
            "name": "Widget",
            "qty": 3,
            "selling_price": 9.99,
            "container_id": "C1",
            "__v": 0
        }))
        .unwrap();
        let item = Item::from(remote);
        assert_eq!(item.quantity, 3);
        assert_eq!(item.selling_price, 9.99);
        assert_eq!(item.container_id, "C1");
        assert!(item.is_synced);
    }

    #[test]
    fn inbound_item_accepts_legacy_business_id() {
        let remote: RemoteItem = serde_json::from_value(json!({
            "_id": "i1",
            "name": "Widget",
            "qty": 1,
            "selling_price": 2.5,
            "business_id": "B7"
        }))
        .unwrap();
        assert_eq!(remote.container_id, "B7");
    }

    #[test]
    fn round_trip_preserves_local_fields() {
        let original = Item::new("i1", "Widget", 3, 9.99, "C1");
        let wire = serde_json::to_string(&RemoteItem::from(&original)).unwrap();
        let back = Item::from(serde_json::from_str::<RemoteItem>(&wire).unwrap());

        assert_eq!(back.id, original.id);
        assert_eq!(back.name, original.name);
        assert_eq!(back.quantity, original.quantity);
        assert_eq!(back.selling_price, original.selling_price);
        assert_eq!(back.container_id, original.container_id);
    }
}
