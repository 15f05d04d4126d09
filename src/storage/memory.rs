//! In-memory storage backend.
//!
//! Thread-safe, non-durable implementation of [`VocabStore`]. Intended for
//! embedded usage, tests, and as a reference for the persistent backend's
//! semantics.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::item::{normalize_text, Item, ItemId};
use crate::records::{Collection, CollectionId, Composition, CompositionId, OwnerRecord};
use crate::storage::traits::{StorageError, VocabStore};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Unavailable(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct MemoryState {
    items: HashMap<ItemId, Item>,
    collections: HashMap<CollectionId, Collection>,
    compositions: HashMap<CompositionId, Composition>,
    owners: HashMap<String, OwnerRecord>,
}

/// In-memory vocabulary store.
#[derive(Debug, Default)]
pub struct MemoryVocabStore {
    state: RwLock<MemoryState>,
}

impl MemoryVocabStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored items across all owners.
    ///
    /// # Errors
    ///
    /// Fails only if the internal lock is poisoned.
    pub fn item_count(&self) -> Result<usize, StorageError> {
        Ok(self.state.read().map_err(|_| lock_err("items.count"))?.items.len())
    }
}

impl VocabStore for MemoryVocabStore {
    fn load_items(&self, owner_id: &str) -> Result<Vec<Item>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("items.load"))?;
        Ok(state
            .items
            .values()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn load_collections(&self, owner_id: &str) -> Result<Vec<Collection>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("collections.load"))?;
        Ok(state
            .collections
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn load_compositions(&self, owner_id: &str) -> Result<Vec<Composition>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("compositions.load"))?;
        Ok(state
            .compositions
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn put_item(&self, item: &Item) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("items.put"))?;
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    fn put_items(&self, items: &[Item]) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("items.put_many"))?;
        for item in items {
            state.items.insert(item.id, item.clone());
        }
        Ok(())
    }

    fn delete_item(&self, id: ItemId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("items.delete"))?;
        state.items.remove(&id);
        Ok(())
    }

    fn delete_items(&self, ids: &[ItemId]) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("items.delete_many"))?;
        for id in ids {
            state.items.remove(id);
        }
        Ok(())
    }

    fn put_item_with_owner(&self, item: &Item, owner: &OwnerRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("items.put_with_owner"))?;
        state.items.insert(item.id, item.clone());
        state.owners.insert(owner.owner_id.clone(), owner.clone());
        Ok(())
    }

    fn get_owner(&self, owner_id: &str) -> Result<Option<OwnerRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("owners.get"))?;
        Ok(state.owners.get(owner_id).cloned())
    }

    fn put_owner(&self, owner: &OwnerRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("owners.put"))?;
        state.owners.insert(owner.owner_id.clone(), owner.clone());
        Ok(())
    }

    fn find_by_text(&self, owner_id: &str, text: &str) -> Result<Option<Item>, StorageError> {
        let key = normalize_text(text);
        let state = self.state.read().map_err(|_| lock_err("items.find_by_text"))?;
        Ok(state
            .items
            .values()
            .filter(|i| i.owner_id == owner_id && i.text_key() == key)
            .min_by_key(|i| i.created_at)
            .cloned())
    }

    fn find_due(&self, owner_id: &str, now: DateTime<Utc>) -> Result<Vec<Item>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("items.find_due"))?;
        let mut due: Vec<Item> = state
            .items
            .values()
            .filter(|i| i.owner_id == owner_id)
            .filter(|i| i.schedule.next_review.is_some_and(|n| n <= now))
            .cloned()
            .collect();
        due.sort_by_key(|i| (i.schedule.next_review, i.id));
        Ok(due)
    }

    fn put_collection(&self, collection: &Collection) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("collections.put"))?;
        state.collections.insert(collection.id, collection.clone());
        Ok(())
    }

    fn delete_collection(&self, id: CollectionId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("collections.delete"))?;
        state.collections.remove(&id);
        Ok(())
    }

    fn put_composition(&self, composition: &Composition) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("compositions.put"))?;
        state.compositions.insert(composition.id, composition.clone());
        Ok(())
    }

    fn delete_composition(&self, id: CompositionId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("compositions.delete"))?;
        state.compositions.remove(&id);
        Ok(())
    }
}
