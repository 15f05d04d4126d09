//! Inverted indices over the in-memory item set.
//!
//! Both indices are rebuilt wholesale from their owning records whenever the
//! cache is told the records (or the item set) changed. There is no
//! incremental patching: a rebuild clears the set and re-adds every reference
//! that still resolves to a live item.
//!
//! Collaborators that mutate compositions or collections behind the cache's
//! back must call the cache's `notify_*_changed` hooks. Until they do, lookups
//! return stale answers; this is a caller contract, not a runtime error.

use std::collections::HashSet;

use crate::item::normalize_text;

/// Which inverted index to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Item ids referenced by at least one composition.
    Composed,
    /// Normalized texts of items that belong to at least one collection.
    CollectionText,
}

impl IndexKind {
    const fn normalizes(self) -> bool {
        matches!(self, Self::CollectionText)
    }
}

/// Holds both inverted indices.
#[derive(Debug, Default, Clone)]
pub struct IndexEngine {
    composed: HashSet<String>,
    collection_text: HashSet<String>,
}

impl IndexEngine {
    /// Creates empty indices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, kind: IndexKind) -> &HashSet<String> {
        match kind {
            IndexKind::Composed => &self.composed,
            IndexKind::CollectionText => &self.collection_text,
        }
    }

    fn set_mut(&mut self, kind: IndexKind) -> &mut HashSet<String> {
        match kind {
            IndexKind::Composed => &mut self.composed,
            IndexKind::CollectionText => &mut self.collection_text,
        }
    }

    fn key(kind: IndexKind, raw: &str) -> String {
        if kind.normalizes() {
            normalize_text(raw)
        } else {
            raw.to_string()
        }
    }

    /// Clears `kind` and re-adds every reference for which `exists` holds.
    ///
    /// `exists` receives the key after normalization.
    pub fn rebuild<I, S, F>(&mut self, kind: IndexKind, references: I, exists: F)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> bool,
    {
        let set = self.set_mut(kind);
        set.clear();
        for reference in references {
            let key = Self::key(kind, reference.as_ref());
            if !key.is_empty() && exists(&key) {
                set.insert(key);
            }
        }
    }

    /// O(1) membership test.
    #[must_use]
    pub fn contains(&self, kind: IndexKind, key: &str) -> bool {
        self.set(kind).contains(&Self::key(kind, key))
    }

    /// Number of keys in `kind`.
    #[must_use]
    pub fn len(&self, kind: IndexKind) -> usize {
        self.set(kind).len()
    }

    /// Returns true if `kind` holds no keys.
    #[must_use]
    pub fn is_empty(&self, kind: IndexKind) -> bool {
        self.set(kind).is_empty()
    }

    /// Drops every key from both indices.
    pub fn clear(&mut self) {
        self.composed.clear();
        self.collection_text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_filters_missing_references() {
        let mut index = IndexEngine::new();
        let live: HashSet<&str> = ["a", "b"].into_iter().collect();

        index.rebuild(IndexKind::Composed, ["a", "b", "gone"], |k| live.contains(k));

        assert!(index.contains(IndexKind::Composed, "a"));
        assert!(!index.contains(IndexKind::Composed, "gone"));
        assert_eq!(index.len(IndexKind::Composed), 2);
    }

    #[test]
    fn test_rebuild_replaces_previous_contents() {
        let mut index = IndexEngine::new();
        index.rebuild(IndexKind::Composed, ["a"], |_| true);
        index.rebuild(IndexKind::Composed, ["b"], |_| true);

        assert!(!index.contains(IndexKind::Composed, "a"));
        assert!(index.contains(IndexKind::Composed, "b"));
    }

    #[test]
    fn test_text_index_is_case_insensitive() {
        let mut index = IndexEngine::new();
        index.rebuild(IndexKind::CollectionText, ["  Ubiquitous "], |_| true);

        assert!(index.contains(IndexKind::CollectionText, "ubiquitous"));
        assert!(index.contains(IndexKind::CollectionText, "UBIQUITOUS"));
        assert!(!index.contains(IndexKind::Composed, "ubiquitous"));
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut index = IndexEngine::new();
        index.rebuild(IndexKind::CollectionText, ["word"], |_| true);
        index.rebuild(IndexKind::Composed, Vec::<String>::new(), |_| true);

        assert!(index.is_empty(IndexKind::Composed));
        assert_eq!(index.len(IndexKind::CollectionText), 1);

        index.clear();
        assert!(index.is_empty(IndexKind::CollectionText));
    }
}
