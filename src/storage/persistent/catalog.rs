//! Schema catalog: named collections, their primary keys and secondary indices.
//!
//! Documents are plain JSON objects. Index keys are extracted from dotted
//! field paths (`schedule.nextReview`) and compared part by part, so compound
//! indices order lexicographically by their paths.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::traits::StorageError;

/// A declared secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Unique within its collection.
    pub name: String,
    /// Dotted field paths, one per key part.
    pub key_paths: Vec<String>,
    /// Per key part: trim and lowercase text before comparing. Parts past
    /// the end compare exactly.
    #[serde(default)]
    pub fold_case: Vec<bool>,
}

impl IndexDef {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(name: impl Into<String>, key_paths: &[&str]) -> Self {
        Self {
            name: name.into(),
            key_paths: key_paths.iter().map(|p| (*p).to_string()).collect(),
            fold_case: Vec::new(),
        }
    }

    /// Makes the parts at `paths` case-insensitive. Other parts stay exact.
    #[must_use]
    pub fn fold_paths(mut self, paths: &[&str]) -> Self {
        self.fold_case = self
            .key_paths
            .iter()
            .map(|p| paths.contains(&p.as_str()))
            .collect();
        self
    }

    fn folds(&self, part: usize) -> bool {
        self.fold_case.get(part).copied().unwrap_or(false)
    }

    /// Extracts this index's key from `doc`. Missing fields become [`KeyPart::Null`].
    #[must_use]
    pub fn key_of(&self, doc: &Value) -> IndexKey {
        self.key_paths
            .iter()
            .enumerate()
            .map(|(i, path)| lookup_path(doc, path).map_or(KeyPart::Null, |v| KeyPart::from_value(v, self.folds(i))))
            .collect()
    }

    /// Builds a lookup key from caller-supplied values, folded like stored keys.
    #[must_use]
    pub fn key_from(&self, values: &[Value]) -> IndexKey {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| KeyPart::from_value(v, self.folds(i)))
            .collect()
    }
}

/// A declared collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDef {
    #[allow(missing_docs)]
    pub name: String,
    /// Top-level field holding the document's unique key.
    pub primary_key: String,
    /// Secondary indices by name.
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexDef>,
}

impl CollectionDef {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            indexes: BTreeMap::new(),
        }
    }

    /// Extracts the primary key of `doc`.
    ///
    /// # Errors
    ///
    /// `InvalidDocument` if the document is not an object or its key is
    /// missing, empty or not a string/integer.
    pub fn primary_key_of(&self, doc: &Value) -> Result<String, StorageError> {
        if !doc.is_object() {
            return Err(StorageError::InvalidDocument(format!(
                "{}: document is not an object",
                self.name
            )));
        }
        match doc.get(&self.primary_key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(StorageError::InvalidDocument(format!(
                "{}: missing primary key '{}'",
                self.name, self.primary_key
            ))),
        }
    }
}

/// Durable schema state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Last fully applied migration.
    pub version: u32,
    #[allow(missing_docs)]
    pub collections: BTreeMap<String, CollectionDef>,
}

impl Catalog {
    #[allow(missing_docs)]
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.get(name)
    }

    /// Returns the collection or `CollectionNotFound`.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` if `name` is not declared.
    pub fn require(&self, name: &str) -> Result<&CollectionDef, StorageError> {
        self.collections
            .get(name)
            .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))
    }
}

/// One component of an index key. Variant order defines cross-type ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyPart {
    #[allow(missing_docs)]
    Null,
    #[allow(missing_docs)]
    Bool(bool),
    #[allow(missing_docs)]
    Int(i64),
    #[allow(missing_docs)]
    Text(String),
}

impl KeyPart {
    /// Converts a JSON scalar. Non-integral numbers are truncated; arrays and
    /// objects are not indexable and map to `Null`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_value(value: &Value, fold_case: bool) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Int(n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64)),
            Value::String(s) if fold_case => Self::Text(s.trim().to_lowercase()),
            Value::String(s) => Self::Text(s.clone()),
            Value::Null | Value::Array(_) | Value::Object(_) => Self::Null,
        }
    }
}

/// Compound index key.
pub type IndexKey = Vec<KeyPart>;

/// Follows a dotted path through nested objects.
#[must_use]
pub fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, segment| cur.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_dotted_path() {
        let doc = json!({ "schedule": { "nextReview": 42 } });
        assert_eq!(lookup_path(&doc, "schedule.nextReview"), Some(&json!(42)));
        assert_eq!(lookup_path(&doc, "schedule.missing"), None);
    }

    #[test]
    fn test_compound_key_with_missing_part() {
        let idx = IndexDef::new("by_next_review", &["ownerId", "schedule.nextReview"]);
        let key = idx.key_of(&json!({ "ownerId": "u1", "schedule": {} }));
        assert_eq!(key, vec![KeyPart::Text("u1".into()), KeyPart::Null]);
    }

    #[test]
    fn test_null_sorts_before_numbers() {
        let due = vec![KeyPart::Text("u1".into()), KeyPart::Int(5)];
        let never = vec![KeyPart::Text("u1".into()), KeyPart::Null];
        assert!(never < due);
    }

    #[test]
    fn test_folded_index_normalizes_both_sides() {
        let idx = IndexDef::new("by_owner_text", &["ownerId", "text"]).fold_paths(&["text"]);
        let stored = idx.key_of(&json!({ "ownerId": "u1", "text": " Gist " }));
        let lookup = idx.key_from(&[json!("u1"), json!("GIST")]);
        assert_eq!(stored, lookup);
    }

    #[test]
    fn test_fold_applies_only_to_named_parts() {
        let idx = IndexDef::new("by_owner_text", &["ownerId", "text"]).fold_paths(&["text"]);
        let stored = idx.key_of(&json!({ "ownerId": "Alice", "text": "Gist" }));
        assert_eq!(stored, vec![KeyPart::Text("Alice".into()), KeyPart::Text("gist".into())]);
        assert_ne!(stored, idx.key_from(&[json!("alice"), json!("gist")]));
    }

    #[test]
    fn test_primary_key_validation() {
        let def = CollectionDef::new("items", "id");
        assert_eq!(def.primary_key_of(&json!({ "id": "a" })).unwrap(), "a");
        assert!(def.primary_key_of(&json!({ "id": "" })).is_err());
        assert!(def.primary_key_of(&json!([1, 2])).is_err());
    }
}
