//! The vocabulary schema and its migration ladder.

use serde_json::Value;

use super::catalog::IndexDef;
use super::migration::Migration;

/// Item documents, keyed by `id`.
pub const ITEMS: &str = "items";
/// Collection documents, keyed by `id`.
pub const COLLECTIONS: &str = "collections";
/// Composition documents, keyed by `id`.
pub const COMPOSITIONS: &str = "compositions";
/// Owner records, keyed by `ownerId`.
pub const OWNERS: &str = "owners";

/// Superseded by `items.schedule`; dropped in v4.
const REVIEW_LOG: &str = "review_log";

/// Documents by owner. Declared on items, collections and compositions.
#[must_use]
pub fn by_owner() -> IndexDef {
    IndexDef::new("by_owner", &["ownerId"])
}

/// Items by owner (exact) and case-folded text.
#[must_use]
pub fn by_owner_text() -> IndexDef {
    IndexDef::new("by_owner_text", &["ownerId", "text"]).fold_paths(&["text"])
}

/// Items by owner and next review timestamp (ms).
#[must_use]
pub fn by_next_review() -> IndexDef {
    IndexDef::new("by_next_review", &["ownerId", "schedule.nextReview"])
}

/// Schema version produced by [`migrations`].
pub const SCHEMA_VERSION: u32 = 4;

// Documents written before v2 carried the owner under `userId`.
fn rename_user_id(doc: &mut Value) -> Result<bool, String> {
    let obj = doc.as_object_mut().ok_or("document is not an object")?;
    if obj.contains_key("ownerId") {
        return Ok(obj.remove("userId").is_some());
    }
    match obj.remove("userId") {
        Some(owner) => {
            obj.insert("ownerId".to_string(), owner);
            Ok(true)
        }
        None => Err("document has neither ownerId nor userId".to_string()),
    }
}

/// The full ladder, oldest first.
#[must_use]
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration::new(1, "initial")
            .create_collection(ITEMS, "id")
            .create_index(ITEMS, by_owner())
            .create_collection(REVIEW_LOG, "id"),
        Migration::new(2, "owners and records")
            .create_collection(COLLECTIONS, "id")
            .create_index(COLLECTIONS, by_owner())
            .create_collection(COMPOSITIONS, "id")
            .create_index(COMPOSITIONS, by_owner())
            .create_collection(OWNERS, "ownerId")
            .backfill(ITEMS, "userId to ownerId", rename_user_id),
        Migration::new(3, "text lookup")
            .create_index(ITEMS, by_owner_text()),
        Migration::new(4, "review scheduling index")
            .create_index(ITEMS, by_next_review())
            .delete_collection(REVIEW_LOG),
    ]
}
