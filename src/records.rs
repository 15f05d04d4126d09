//! Records that reference items: collections, compositions and owner records.
//!
//! Collections and compositions never own their items; they hold weak
//! references by id (and, for word-books, by reference text). Deleting an item
//! leaves dangling ids behind, which the inverted indices filter out on rebuild.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::ItemId;

/// Unique identifier for a collection.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(Uuid);

impl CollectionId {
    /// Create a new random collection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a composition.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositionId(Uuid);

impl CompositionId {
    /// Create a new random composition id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CompositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CompositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named grouping such as a reading unit or a word-book.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: CollectionId,
    pub owner_id: String,
    pub name: String,
    /// Referenced items, in display order when `ordered` is set.
    #[serde(default)]
    pub item_ids: Vec<ItemId>,
    /// Reference texts, matched case-insensitively against item text.
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub ordered: bool,
}

impl Collection {
    /// Creates an empty, unordered collection.
    #[must_use]
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: CollectionId::new(),
            owner_id: owner_id.into(),
            name: name.into(),
            item_ids: Vec::new(),
            words: Vec::new(),
            ordered: false,
        }
    }
}

/// A usage record (e.g. an essay) that links back to the items it uses.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    pub id: CompositionId,
    pub owner_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub item_ids: Vec<ItemId>,
}

impl Composition {
    /// Creates a composition referencing `item_ids`.
    #[must_use]
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>, item_ids: Vec<ItemId>) -> Self {
        Self {
            id: CompositionId::new(),
            owner_id: owner_id.into(),
            title: title.into(),
            item_ids,
        }
    }
}

/// Per-owner record persisted atomically with an item by compound saves.
///
/// `progress` is opaque to this crate; gamification owns its shape.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRecord {
    pub owner_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub progress: serde_json::Value,
}

impl OwnerRecord {
    /// Creates an owner record with empty progress.
    #[must_use]
    pub fn new(owner_id: impl Into<String>, last_active_at: DateTime<Utc>) -> Self {
        Self {
            owner_id: owner_id.into(),
            last_active_at,
            progress: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_serializes_camel_case() {
        let mut c = Collection::new("u1", "Unit 3");
        c.words.push("Ubiquitous".to_string());
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["ownerId"], "u1");
        assert_eq!(json["itemIds"], serde_json::json!([]));
        assert_eq!(json["words"][0], "Ubiquitous");
    }

    #[test]
    fn test_owner_record_roundtrip_keeps_progress() {
        let mut rec = OwnerRecord::new("u1", Utc::now());
        rec.progress = serde_json::json!({ "xp": 120, "level": 3 });
        let back: OwnerRecord = serde_json::from_value(serde_json::to_value(&rec).unwrap()).unwrap();
        assert_eq!(back.progress["level"], 3);
        assert_eq!(back.owner_id, "u1");
    }
}
