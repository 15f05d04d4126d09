//! Abstract storage seam for lexiq.
//!
//! The cache only ever talks to a [`VocabStore`]. Two backends ship with the
//! crate: [`crate::storage::MemoryVocabStore`] for embedded use and tests, and
//! the durable `PersistentVocabStore` behind the `persistent` feature.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::item::{Item, ItemId};
use crate::records::{Collection, CollectionId, Composition, CompositionId, OwnerRecord};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be opened or is closed.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A commit did not become durable. Nothing was applied.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// The stored schema is newer than this build understands, or another
    /// session upgraded it while this connection was open.
    #[error("Schema version conflict: stored v{stored}, supported v{supported}")]
    SchemaVersionConflict {
        #[allow(missing_docs)]
        stored: u32,
        #[allow(missing_docs)]
        supported: u32,
    },

    /// A named collection is not in the catalog.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// A transaction touched a collection outside its declared scope.
    #[error("Collection '{0}' is outside the transaction scope")]
    OutOfScope(String),

    /// A document is missing its primary key or is not an object.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Typed repository over the vocabulary schema.
///
/// All writes are atomic per call. `put_*` is an upsert. Deleting an id that
/// does not exist is not an error.
pub trait VocabStore: Send + Sync {
    /// Every item owned by `owner_id`, archived ones included.
    fn load_items(&self, owner_id: &str) -> Result<Vec<Item>, StorageError>;

    #[allow(missing_docs)]
    fn load_collections(&self, owner_id: &str) -> Result<Vec<Collection>, StorageError>;

    #[allow(missing_docs)]
    fn load_compositions(&self, owner_id: &str) -> Result<Vec<Composition>, StorageError>;

    /// Insert or replace a single item.
    fn put_item(&self, item: &Item) -> Result<(), StorageError>;

    /// Insert or replace many items in one commit.
    fn put_items(&self, items: &[Item]) -> Result<(), StorageError>;

    #[allow(missing_docs)]
    fn delete_item(&self, id: ItemId) -> Result<(), StorageError>;

    /// Delete many items in one commit.
    fn delete_items(&self, ids: &[ItemId]) -> Result<(), StorageError>;

    /// Persist an item and its owner record atomically.
    fn put_item_with_owner(&self, item: &Item, owner: &OwnerRecord) -> Result<(), StorageError>;

    #[allow(missing_docs)]
    fn get_owner(&self, owner_id: &str) -> Result<Option<OwnerRecord>, StorageError>;

    #[allow(missing_docs)]
    fn put_owner(&self, owner: &OwnerRecord) -> Result<(), StorageError>;

    /// Case-insensitive text lookup within one owner.
    fn find_by_text(&self, owner_id: &str, text: &str) -> Result<Option<Item>, StorageError>;

    /// Items whose next review is at or before `now`, earliest first.
    ///
    /// Applies no quality filter; callers pick the due predicate they need.
    fn find_due(&self, owner_id: &str, now: DateTime<Utc>) -> Result<Vec<Item>, StorageError>;

    #[allow(missing_docs)]
    fn put_collection(&self, collection: &Collection) -> Result<(), StorageError>;

    #[allow(missing_docs)]
    fn delete_collection(&self, id: CollectionId) -> Result<(), StorageError>;

    #[allow(missing_docs)]
    fn put_composition(&self, composition: &Composition) -> Result<(), StorageError>;

    #[allow(missing_docs)]
    fn delete_composition(&self, id: CompositionId) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_vocab_store_object_safe(_: &dyn VocabStore) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::SchemaVersionConflict {
            stored: 5,
            supported: 4,
        };
        assert!(err.to_string().contains("v5"));

        let err = StorageError::Unavailable("locked".to_string());
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(StorageError::from(err), StorageError::Serialization(_)));
    }
}
