//! [`VocabStore`] over the document database.

use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::item::{Item, ItemId};
use crate::records::{Collection, CollectionId, Composition, CompositionId, OwnerRecord};
use crate::storage::traits::{StorageError, VocabStore};

use super::catalog::KeyPart;
use super::connector::DatabaseConnector;
use super::database::{CompactionResult, Database};
use super::schema::{self, COLLECTIONS, COMPOSITIONS, ITEMS, OWNERS};

fn decode_all<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>, StorageError> {
    docs.into_iter()
        .map(|d| serde_json::from_value(d).map_err(StorageError::from))
        .collect()
}

fn encode<T: Serialize>(value: &T) -> Result<Value, StorageError> {
    Ok(serde_json::to_value(value)?)
}

/// Durable vocabulary store.
#[derive(Debug)]
pub struct PersistentVocabStore {
    connector: DatabaseConnector,
}

impl PersistentVocabStore {
    /// Wraps a connector. The database opens lazily on first use.
    #[must_use]
    pub const fn new(connector: DatabaseConnector) -> Self {
        Self { connector }
    }

    /// The underlying database, opened if needed.
    ///
    /// # Errors
    ///
    /// See [`DatabaseConnector::open`].
    pub fn database(&self) -> Result<Arc<Database>, StorageError> {
        self.connector.open()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn connector(&self) -> &DatabaseConnector {
        &self.connector
    }

    /// Compacts the WAL into a segment.
    ///
    /// # Errors
    ///
    /// See [`Database::compact`].
    pub fn compact(&self) -> Result<CompactionResult, StorageError> {
        self.database()?.compact()
    }

    fn by_owner<T: DeserializeOwned>(&self, collection: &str, owner_id: &str) -> Result<Vec<T>, StorageError> {
        let docs = self
            .database()?
            .query_by_index(collection, &schema::by_owner(), &[json!(owner_id)])?;
        decode_all(docs)
    }
}

impl VocabStore for PersistentVocabStore {
    fn load_items(&self, owner_id: &str) -> Result<Vec<Item>, StorageError> {
        self.by_owner(ITEMS, owner_id)
    }

    fn load_collections(&self, owner_id: &str) -> Result<Vec<Collection>, StorageError> {
        self.by_owner(COLLECTIONS, owner_id)
    }

    fn load_compositions(&self, owner_id: &str) -> Result<Vec<Composition>, StorageError> {
        self.by_owner(COMPOSITIONS, owner_id)
    }

    fn put_item(&self, item: &Item) -> Result<(), StorageError> {
        self.database()?.put(ITEMS, encode(item)?)
    }

    fn put_items(&self, items: &[Item]) -> Result<(), StorageError> {
        if items.is_empty() {
            return Ok(());
        }
        let docs = items.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        self.database()?.bulk_put(ITEMS, docs)
    }

    fn delete_item(&self, id: ItemId) -> Result<(), StorageError> {
        self.database()?.delete(ITEMS, &id.to_string())
    }

    fn delete_items(&self, ids: &[ItemId]) -> Result<(), StorageError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.database()?.bulk_delete(ITEMS, ids.iter().map(ToString::to_string))
    }

    fn put_item_with_owner(&self, item: &Item, owner: &OwnerRecord) -> Result<(), StorageError> {
        let db = self.database()?;
        let mut tx = db.transaction(&[ITEMS, OWNERS])?;
        tx.put(ITEMS, encode(item)?)?.put(OWNERS, encode(owner)?)?;
        db.commit(tx)
    }

    fn get_owner(&self, owner_id: &str) -> Result<Option<OwnerRecord>, StorageError> {
        self.database()?
            .get(OWNERS, owner_id)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(StorageError::from)
    }

    fn put_owner(&self, owner: &OwnerRecord) -> Result<(), StorageError> {
        self.database()?.put(OWNERS, encode(owner)?)
    }

    fn find_by_text(&self, owner_id: &str, text: &str) -> Result<Option<Item>, StorageError> {
        let docs = self
            .database()?
            .query_by_index(ITEMS, &schema::by_owner_text(), &[json!(owner_id), json!(text)])?;
        let items: Vec<Item> = decode_all(docs)?;
        Ok(items.into_iter().min_by_key(|i| i.created_at))
    }

    fn find_due(&self, owner_id: &str, now: DateTime<Utc>) -> Result<Vec<Item>, StorageError> {
        let owner = KeyPart::Text(owner_id.to_string());
        let lower = vec![owner.clone(), KeyPart::Int(i64::MIN)];
        let upper = vec![owner, KeyPart::Int(now.timestamp_millis())];
        let docs = self.database()?.scan_by_index(
            ITEMS,
            &schema::by_next_review(),
            Bound::Included(lower),
            Bound::Included(upper),
        )?;
        decode_all(docs)
    }

    fn put_collection(&self, collection: &Collection) -> Result<(), StorageError> {
        self.database()?.put(COLLECTIONS, encode(collection)?)
    }

    fn delete_collection(&self, id: CollectionId) -> Result<(), StorageError> {
        self.database()?.delete(COLLECTIONS, &id.to_string())
    }

    fn put_composition(&self, composition: &Composition) -> Result<(), StorageError> {
        self.database()?.put(COMPOSITIONS, encode(composition)?)
    }

    fn delete_composition(&self, id: CompositionId) -> Result<(), StorageError> {
        self.database()?.delete(COMPOSITIONS, &id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::persistent::PersistentConfig;
    use chrono::Duration;
    use tempfile::tempdir;

    fn store(dir: &std::path::Path) -> PersistentVocabStore {
        PersistentVocabStore::new(DatabaseConnector::vocabulary(dir, PersistentConfig::default()))
    }

    fn item(owner: &str, text: &str, at: DateTime<Utc>) -> Item {
        Item::new(owner, text, at).unwrap()
    }

    #[test]
    fn test_items_scoped_by_owner() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let now = Utc::now();

        store.put_items(&[item("u1", "gist", now), item("u2", "gist", now)]).unwrap();
        assert_eq!(store.load_items("u1").unwrap().len(), 1);
        assert_eq!(store.load_items("u3").unwrap().len(), 0);
    }

    #[test]
    fn test_find_by_text_is_case_insensitive_and_earliest() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let now = Utc::now();

        let older = item("u1", "Serendipity", now - Duration::days(2));
        let newer = item("u1", "serendipity ", now);
        store.put_items(&[newer, older.clone()]).unwrap();

        let found = store.find_by_text("u1", "SERENDIPITY").unwrap().unwrap();
        assert_eq!(found.id, older.id);
        assert!(store.find_by_text("u2", "serendipity").unwrap().is_none());
    }

    #[test]
    fn test_find_by_text_owner_match_is_exact() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let now = Utc::now();

        let upper = item("Alice", "gist", now);
        store.put_item(&upper).unwrap();

        assert!(store.find_by_text("alice", "gist").unwrap().is_none());
        assert_eq!(store.find_by_text("Alice", "GIST").unwrap().unwrap().id, upper.id);

        let lower = item("alice", "Gist", now);
        store.put_item(&lower).unwrap();
        assert_eq!(store.find_by_text("alice", "gist").unwrap().unwrap().id, lower.id);
        assert_eq!(store.load_items("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_find_due_excludes_unscheduled_and_future() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let now = Utc::now();

        let mut past = item("u1", "a", now);
        past.schedule.last_review = Some(now - Duration::days(3));
        past.schedule.next_review = Some(now - Duration::days(1));
        let mut future = item("u1", "b", now);
        future.schedule.last_review = Some(now);
        future.schedule.next_review = Some(now + Duration::days(1));
        let unscheduled = item("u1", "c", now);
        let mut other_owner = past.clone();
        other_owner.id = ItemId::new();
        other_owner.owner_id = "u2".to_string();

        store.put_items(&[past.clone(), future, unscheduled, other_owner]).unwrap();

        let due = store.find_due("u1", now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past.id);
    }

    #[test]
    fn test_compound_save_is_atomic_and_durable() {
        let dir = tempdir().unwrap();
        let it = item("u1", "gist", Utc::now());
        {
            let store = store(dir.path());
            let mut owner = OwnerRecord::new("u1", Utc::now());
            owner.progress = json!({ "xp": 10 });
            store.put_item_with_owner(&it, &owner).unwrap();
        }

        let store = store(dir.path());
        assert_eq!(store.load_items("u1").unwrap()[0].id, it.id);
        assert_eq!(store.get_owner("u1").unwrap().unwrap().progress["xp"], 10);
    }

    #[test]
    fn test_delete_items_and_records() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let a = item("u1", "a", Utc::now());
        let b = item("u1", "b", Utc::now());
        store.put_items(&[a.clone(), b.clone()]).unwrap();

        let comp = Composition::new("u1", "essay", vec![a.id]);
        store.put_composition(&comp).unwrap();
        let coll = Collection::new("u1", "unit 1");
        store.put_collection(&coll).unwrap();

        store.delete_items(&[a.id, ItemId::new()]).unwrap();
        store.delete_composition(comp.id).unwrap();
        store.delete_collection(coll.id).unwrap();

        assert_eq!(store.load_items("u1").unwrap().len(), 1);
        assert!(store.load_compositions("u1").unwrap().is_empty());
        assert!(store.load_collections("u1").unwrap().is_empty());
    }
}
