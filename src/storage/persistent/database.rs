//! Schema-versioned document database.
//!
//! Collections of JSON documents keyed by a declared primary-key field, with
//! declared secondary indices. All state lives in memory; durability comes
//! from the WAL and periodic segment snapshots.
//!
//! Commit path: validate scope → append one WAL record → apply to memory.
//! A commit whose WAL append fails is never applied.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::ops::{Bound, RangeBounds};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::storage::traits::StorageError;

use super::catalog::{Catalog, CollectionDef, IndexDef, IndexKey};
use super::file_lock::FileLock;
use super::migration::{self, BackfillFn, Migration};
use super::segment::{SegmentData, SegmentManager};
use super::wal::{WalEntryKind, WalOp, WriteAheadLog};
use super::PersistentConfig;

const WAL_FILE: &str = "lexiq.wal";
const SEGMENTS_DIR: &str = "segments";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Unavailable(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct Table {
    docs: BTreeMap<String, Value>,
    indexes: HashMap<String, BTreeMap<IndexKey, BTreeSet<String>>>,
}

impl Table {
    fn index_doc(&mut self, def: &CollectionDef, key: &str, doc: &Value) {
        for index in def.indexes.values() {
            self.indexes
                .entry(index.name.clone())
                .or_default()
                .entry(index.key_of(doc))
                .or_default()
                .insert(key.to_string());
        }
    }

    fn unindex_doc(&mut self, def: &CollectionDef, key: &str, doc: &Value) {
        for index in def.indexes.values() {
            let Some(tree) = self.indexes.get_mut(&index.name) else {
                continue;
            };
            let ikey = index.key_of(doc);
            if let Some(keys) = tree.get_mut(&ikey) {
                keys.remove(key);
                if keys.is_empty() {
                    tree.remove(&ikey);
                }
            }
        }
    }

    fn put(&mut self, def: &CollectionDef, key: String, doc: Value) {
        if let Some(old) = self.docs.remove(&key) {
            self.unindex_doc(def, &key, &old);
        }
        self.index_doc(def, &key, &doc);
        self.docs.insert(key, doc);
    }

    fn remove(&mut self, def: &CollectionDef, key: &str) {
        if let Some(old) = self.docs.remove(key) {
            self.unindex_doc(def, key, &old);
        }
    }

    fn reindex(&mut self, def: &CollectionDef) {
        self.indexes.clear();
        let docs = std::mem::take(&mut self.docs);
        for (key, doc) in &docs {
            self.index_doc(def, key, doc);
        }
        self.docs = docs;
    }
}

#[derive(Debug, Default)]
struct DbState {
    catalog: Catalog,
    tables: HashMap<String, Table>,
}

impl DbState {
    fn from_snapshot(data: SegmentData) -> Self {
        let mut state = Self {
            catalog: data.catalog,
            tables: HashMap::new(),
        };
        for (name, docs) in data.tables {
            let Some(def) = state.catalog.collections.get(&name) else {
                warn!(collection = %name, "snapshot table has no catalog entry; dropping");
                continue;
            };
            let mut table = Table {
                docs,
                indexes: HashMap::new(),
            };
            table.reindex(def);
            state.tables.insert(name, table);
        }
        state
    }

    fn snapshot(&self) -> SegmentData {
        SegmentData {
            catalog: self.catalog.clone(),
            tables: self
                .tables
                .iter()
                .map(|(name, t)| (name.clone(), t.docs.clone()))
                .collect(),
        }
    }

    fn apply_ops(&mut self, ops: Vec<WalOp>) {
        for op in ops {
            let name = op.collection().to_string();
            let Some(def) = self.catalog.collections.get(&name) else {
                warn!(collection = %name, "op on unknown collection; skipping");
                continue;
            };
            let table = self.tables.entry(name).or_default();
            match op {
                WalOp::Put { key, doc, .. } => table.put(def, key, doc),
                WalOp::Delete { key, .. } => table.remove(def, &key),
            }
        }
    }

    fn apply_catalog(&mut self, catalog: Catalog) {
        self.tables.retain(|name, _| catalog.collections.contains_key(name));
        for (name, def) in &catalog.collections {
            let changed = self
                .catalog
                .collections
                .get(name)
                .map_or(true, |old| old.indexes != def.indexes);
            let table = self.tables.entry(name.clone()).or_default();
            if changed {
                table.reindex(def);
            }
        }
        self.catalog = catalog;
    }
}

/// A pending multi-collection write. Built by [`Database::transaction`].
#[derive(Debug)]
pub struct Transaction {
    scope: BTreeMap<String, CollectionDef>,
    ops: Vec<WalOp>,
}

impl Transaction {
    fn def(&self, collection: &str) -> Result<&CollectionDef, StorageError> {
        self.scope
            .get(collection)
            .ok_or_else(|| StorageError::OutOfScope(collection.to_string()))
    }

    /// Queues an upsert.
    ///
    /// # Errors
    ///
    /// `OutOfScope` if `collection` was not declared; `InvalidDocument` if the
    /// document has no primary key.
    pub fn put(&mut self, collection: &str, doc: Value) -> Result<&mut Self, StorageError> {
        let key = self.def(collection)?.primary_key_of(&doc)?;
        self.ops.push(WalOp::Put {
            collection: collection.to_string(),
            key,
            doc,
        });
        Ok(self)
    }

    /// Queues a delete.
    ///
    /// # Errors
    ///
    /// `OutOfScope` if `collection` was not declared.
    pub fn delete(&mut self, collection: &str, key: impl Into<String>) -> Result<&mut Self, StorageError> {
        self.def(collection)?;
        self.ops.push(WalOp::Delete {
            collection: collection.to_string(),
            key: key.into(),
        });
        Ok(self)
    }

    /// Queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Result of a compaction.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    /// Documents written to the snapshot.
    pub documents: u64,
    /// New segment file, if one was written.
    pub segment_path: Option<PathBuf>,
    #[allow(missing_docs)]
    pub wal_size_before: u64,
    #[allow(missing_docs)]
    pub wal_size_after: u64,
}

/// An open document database.
pub struct Database {
    dir: PathBuf,
    config: PersistentConfig,
    lock: Mutex<Option<FileLock>>,
    wal: WriteAheadLog,
    segments: Mutex<SegmentManager>,
    state: RwLock<DbState>,
    // Serializes commits, catalog changes and compaction.
    commit_lock: Mutex<()>,
    closed: AtomicBool,
    foreign_version: Mutex<Option<u32>>,
    supported_version: u32,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dir", &self.dir)
            .field("supported_version", &self.supported_version)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn valid_range(lower: &Bound<IndexKey>, upper: &Bound<IndexKey>) -> bool {
    use Bound::{Excluded, Included, Unbounded};
    match (lower, upper) {
        (Unbounded, _) | (_, Unbounded) => true,
        (Excluded(a), Excluded(b)) => a < b,
        (Included(a) | Excluded(a), Included(b) | Excluded(b)) => a <= b,
    }
}

impl Database {
    /// Opens (or creates) the database in `dir` and brings its schema up to
    /// the newest migration in `migrations`.
    ///
    /// # Errors
    /// - `Unavailable` if the directory cannot be created, is locked, or a
    ///   segment cannot be read
    /// - `SchemaVersionConflict` if the stored schema is newer than `migrations`
    pub fn open(dir: &Path, config: PersistentConfig, migrations: &[Migration]) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)
            .map_err(|e| StorageError::Unavailable(format!("failed to create store directory: {e}")))?;

        let lock = FileLock::acquire(dir)
            .map_err(|e| StorageError::Unavailable(format!("failed to acquire lock: {e}")))?;

        let wal = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write)
            .map_err(|e| StorageError::Unavailable(format!("failed to open wal: {e}")))?;

        let segments = SegmentManager::open(&dir.join(SEGMENTS_DIR))
            .map_err(|e| StorageError::Unavailable(format!("failed to open segments: {e}")))?;
        let snapshot = segments
            .load_latest()
            .map_err(|e| StorageError::Unavailable(format!("failed to load segment: {e}")))?;
        wal.advance_to(segments.last_sequence())
            .map_err(|e| StorageError::Unavailable(format!("failed to position wal: {e}")))?;

        let mut state = DbState::from_snapshot(snapshot);
        let replayed = Self::replay(&wal, &mut state)?;
        if replayed > 0 {
            info!(entries = replayed, dir = %dir.display(), "replayed wal");
        }

        let db = Self {
            dir: dir.to_path_buf(),
            config,
            lock: Mutex::new(Some(lock)),
            wal,
            segments: Mutex::new(segments),
            state: RwLock::new(state),
            commit_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            foreign_version: Mutex::new(None),
            supported_version: migration::target_version(migrations),
        };

        let version = migration::run_ladder(&db, migrations)?;
        debug!(version, dir = %dir.display(), "database open");
        Ok(db)
    }

    fn replay(wal: &WriteAheadLog, state: &mut DbState) -> Result<usize, StorageError> {
        let iter = wal
            .iter()
            .map_err(|e| StorageError::Unavailable(format!("failed to read wal: {e}")))?;

        let mut count = 0;
        for entry in iter {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "stopping wal replay at corrupt entry");
                    break;
                }
            };
            match entry.kind {
                WalEntryKind::Commit { ops } => state.apply_ops(ops),
                WalEntryKind::Catalog(catalog) => state.apply_catalog(catalog),
                WalEntryKind::Checkpoint { .. } => {}
            }
            count += 1;
        }
        Ok(count)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, DbState>, StorageError> {
        self.state.read().map_err(|_| lock_err("database.state"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, DbState>, StorageError> {
        self.state.write().map_err(|_| lock_err("database.state"))
    }

    fn serialize(&self) -> Result<MutexGuard<'_, ()>, StorageError> {
        self.commit_lock.lock().map_err(|_| lock_err("database.commit"))
    }

    /// Version reported by [`handle_version_change`](Self::handle_version_change), if any.
    #[must_use]
    pub fn foreign_version(&self) -> Option<u32> {
        *self
            .foreign_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if let Some(stored) = self.foreign_version() {
            return Err(StorageError::SchemaVersionConflict {
                stored,
                supported: self.supported_version,
            });
        }
        if self.is_closed() {
            return Err(StorageError::Unavailable("database is closed".to_string()));
        }
        Ok(())
    }

    /// Directory the database lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stored schema version.
    ///
    /// # Errors
    ///
    /// Fails only if the state lock is poisoned.
    pub fn version(&self) -> Result<u32, StorageError> {
        Ok(self.read()?.catalog.version)
    }

    /// Highest version this handle's migration ladder knows about.
    #[must_use]
    pub const fn supported_version(&self) -> u32 {
        self.supported_version
    }

    /// Snapshot of the catalog.
    ///
    /// # Errors
    ///
    /// Fails only if the state lock is poisoned.
    pub fn catalog(&self) -> Result<Catalog, StorageError> {
        Ok(self.read()?.catalog.clone())
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the handle and releases the directory lock.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.lock.lock().unwrap_or_else(PoisonError::into_inner).take();
            debug!(dir = %self.dir.display(), "database closed");
        }
    }

    /// Another session upgraded the schema to `new_version`. Closes this
    /// handle; every later call fails with `SchemaVersionConflict`.
    pub fn handle_version_change(&self, new_version: u32) {
        *self
            .foreign_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(new_version);
        warn!(
            stored = new_version,
            supported = self.supported_version,
            "schema changed underneath open connection; closing"
        );
        self.close();
    }

    // --- transactions ---

    /// Starts a transaction over the named collections.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` for an undeclared collection, or the handle's
    /// closed/conflict error.
    pub fn transaction(&self, scope: &[&str]) -> Result<Transaction, StorageError> {
        self.ensure_open()?;
        let state = self.read()?;
        let mut defs = BTreeMap::new();
        for name in scope {
            defs.insert((*name).to_string(), state.catalog.require(name)?.clone());
        }
        Ok(Transaction {
            scope: defs,
            ops: Vec::new(),
        })
    }

    /// Makes `tx` durable, then applies it.
    ///
    /// # Errors
    ///
    /// `TransactionFailed` if the WAL append fails; nothing is applied.
    pub fn commit(&self, tx: Transaction) -> Result<(), StorageError> {
        self.ensure_open()?;
        if tx.is_empty() {
            return Ok(());
        }

        {
            let _serial = self.serialize()?;
            {
                let state = self.read()?;
                for name in tx.scope.keys() {
                    state.catalog.require(name)?;
                }
            }

            self.wal
                .append(WalEntryKind::Commit { ops: tx.ops.clone() })
                .map_err(|e| StorageError::TransactionFailed(format!("wal append failed: {e}")))?;
            self.write()?.apply_ops(tx.ops);
        }

        self.maybe_compact();
        Ok(())
    }

    // --- single-collection conveniences ---

    /// Reads one document.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, or the handle's closed/conflict error.
    pub fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.ensure_open()?;
        let state = self.read()?;
        state.catalog.require(collection)?;
        Ok(state
            .tables
            .get(collection)
            .and_then(|t| t.docs.get(key))
            .cloned())
    }

    /// Every document in `collection`, ordered by primary key.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, or the handle's closed/conflict error.
    pub fn get_all(&self, collection: &str) -> Result<Vec<Value>, StorageError> {
        self.ensure_open()?;
        let state = self.read()?;
        state.catalog.require(collection)?;
        Ok(state
            .tables
            .get(collection)
            .map(|t| t.docs.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Upserts one document.
    ///
    /// # Errors
    ///
    /// See [`Transaction::put`] and [`Database::commit`].
    pub fn put(&self, collection: &str, doc: Value) -> Result<(), StorageError> {
        let mut tx = self.transaction(&[collection])?;
        tx.put(collection, doc)?;
        self.commit(tx)
    }

    /// Deletes one document. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// See [`Database::commit`].
    pub fn delete(&self, collection: &str, key: &str) -> Result<(), StorageError> {
        let mut tx = self.transaction(&[collection])?;
        tx.delete(collection, key)?;
        self.commit(tx)
    }

    /// Upserts many documents in one commit.
    ///
    /// # Errors
    ///
    /// See [`Transaction::put`] and [`Database::commit`].
    pub fn bulk_put(&self, collection: &str, docs: Vec<Value>) -> Result<(), StorageError> {
        let mut tx = self.transaction(&[collection])?;
        for doc in docs {
            tx.put(collection, doc)?;
        }
        self.commit(tx)
    }

    /// Deletes many documents in one commit.
    ///
    /// # Errors
    ///
    /// See [`Database::commit`].
    pub fn bulk_delete<I, K>(&self, collection: &str, keys: I) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut tx = self.transaction(&[collection])?;
        for key in keys {
            tx.delete(collection, key)?;
        }
        self.commit(tx)
    }

    // --- index reads ---

    /// Documents whose `index` key equals `values`.
    ///
    /// Uses the catalog index named `index.name` when it exists; otherwise
    /// scans the collection and extracts the key from every document.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, or the handle's closed/conflict error.
    pub fn query_by_index(
        &self,
        collection: &str,
        index: &IndexDef,
        values: &[Value],
    ) -> Result<Vec<Value>, StorageError> {
        let key = index.key_from(values);
        self.scan_by_index(collection, index, Bound::Included(key.clone()), Bound::Included(key))
    }

    /// Documents whose `index` key falls in `[lower, upper]`, in key order.
    ///
    /// Same full-scan fallback as [`Database::query_by_index`].
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, or the handle's closed/conflict error.
    pub fn scan_by_index(
        &self,
        collection: &str,
        index: &IndexDef,
        lower: Bound<IndexKey>,
        upper: Bound<IndexKey>,
    ) -> Result<Vec<Value>, StorageError> {
        self.ensure_open()?;
        let state = self.read()?;
        let def = state.catalog.require(collection)?;
        let Some(table) = state.tables.get(collection) else {
            return Ok(Vec::new());
        };
        if !valid_range(&lower, &upper) {
            return Ok(Vec::new());
        }

        if def.indexes.contains_key(&index.name) {
            let Some(tree) = table.indexes.get(&index.name) else {
                return Ok(Vec::new());
            };
            return Ok(tree
                .range((lower, upper))
                .flat_map(|(_, keys)| keys.iter())
                .filter_map(|k| table.docs.get(k).cloned())
                .collect());
        }

        debug!(collection, index = %index.name, "index not in catalog; full scan");
        let range = (lower, upper);
        let mut hits: Vec<(IndexKey, &String, &Value)> = table
            .docs
            .iter()
            .map(|(k, doc)| (index.key_of(doc), k, doc))
            .filter(|(ikey, _, _)| range.contains(ikey))
            .collect();
        hits.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        Ok(hits.into_iter().map(|(_, _, doc)| doc.clone()).collect())
    }

    // --- schema changes (used by the migration ladder) ---

    fn update_catalog<F>(&self, change: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut Catalog) -> Result<bool, StorageError>,
    {
        self.ensure_open()?;
        let _serial = self.serialize()?;
        let mut catalog = self.read()?.catalog.clone();
        if !change(&mut catalog)? {
            return Ok(false);
        }
        self.wal
            .append(WalEntryKind::Catalog(catalog.clone()))
            .map_err(|e| StorageError::TransactionFailed(format!("wal append failed: {e}")))?;
        self.write()?.apply_catalog(catalog);
        Ok(true)
    }

    pub(crate) fn create_collection(&self, def: &CollectionDef) -> Result<bool, StorageError> {
        self.update_catalog(|c| {
            if c.collections.contains_key(&def.name) {
                return Ok(false);
            }
            c.collections.insert(def.name.clone(), def.clone());
            Ok(true)
        })
    }

    pub(crate) fn create_index(&self, collection: &str, index: &IndexDef) -> Result<bool, StorageError> {
        self.update_catalog(|c| {
            let def = c
                .collections
                .get_mut(collection)
                .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
            if def.indexes.contains_key(&index.name) {
                return Ok(false);
            }
            def.indexes.insert(index.name.clone(), index.clone());
            Ok(true)
        })
    }

    pub(crate) fn delete_collection(&self, name: &str) -> Result<bool, StorageError> {
        self.update_catalog(|c| Ok(c.collections.remove(name).is_some()))
    }

    /// Rewrites every document `apply` reports as changed, in one commit.
    pub(crate) fn backfill(&self, collection: &str, apply: BackfillFn) -> Result<bool, StorageError> {
        let docs = self.get_all(collection)?;
        let mut tx = self.transaction(&[collection])?;
        for mut doc in docs {
            if apply(&mut doc).map_err(|e| StorageError::InvalidDocument(format!("{collection}: {e}")))? {
                tx.put(collection, doc)?;
            }
        }
        let changed = !tx.is_empty();
        self.commit(tx)?;
        Ok(changed)
    }

    pub(crate) fn set_version(&self, version: u32) -> Result<bool, StorageError> {
        self.update_catalog(|c| {
            if c.version == version {
                return Ok(false);
            }
            c.version = version;
            Ok(true)
        })
    }

    // --- compaction ---

    /// Snapshots every table into a new segment and truncates the WAL.
    ///
    /// Safe at any time: until the new segment is durable the WAL still
    /// holds everything and is replayed on the next open.
    ///
    /// # Errors
    ///
    /// `TransactionFailed` if the segment cannot be written.
    pub fn compact(&self) -> Result<CompactionResult, StorageError> {
        self.ensure_open()?;
        let _serial = self.serialize()?;
        let fail = |what: &str, e: std::io::Error| StorageError::TransactionFailed(format!("{what}: {e}"));

        let wal_size_before = self.wal.size_bytes().unwrap_or(0);
        let first = self.wal.first_sequence().map_err(|e| fail("wal sequence", e))?;
        let sequence = self.wal.current_sequence().map_err(|e| fail("wal sequence", e))?;
        let Some(first) = first else {
            return Ok(CompactionResult {
                documents: 0,
                segment_path: None,
                wal_size_before,
                wal_size_after: wal_size_before,
            });
        };

        let data = self.read()?.snapshot();
        let documents = data.document_count();

        let mut segments = self.segments.lock().map_err(|_| lock_err("database.segments"))?;
        let mut writer = segments
            .create_segment_writer(first)
            .map_err(|e| fail("failed to create segment", e))?;
        writer
            .write_data(&data, sequence)
            .map_err(|e| fail("failed to write segment", e))?;
        let segment = writer.finalize().map_err(|e| fail("failed to finalize segment", e))?;
        let segment_path = segment.path().to_path_buf();
        let segment_size = fs::metadata(&segment_path).map(|m| m.len()).unwrap_or(0);
        if segment_size > self.config.max_segment_size {
            warn!(
                segment_size,
                max_segment_size = self.config.max_segment_size,
                "segment snapshot exceeds configured size"
            );
        }
        segments.install(segment);
        drop(segments);

        self.wal
            .append(WalEntryKind::Checkpoint { up_to_sequence: sequence })
            .map_err(|e| fail("failed to write checkpoint", e))?;
        self.wal.truncate().map_err(|e| fail("failed to truncate wal", e))?;

        let wal_size_after = self.wal.size_bytes().unwrap_or(0);
        info!(documents, wal_size_before, wal_size_after, "compacted wal into segment");

        Ok(CompactionResult {
            documents,
            segment_path: Some(segment_path),
            wal_size_before,
            wal_size_after,
        })
    }

    fn maybe_compact(&self) {
        if !self.config.auto_compact {
            return;
        }
        let size = self.wal.size_bytes().unwrap_or(0);
        if size < self.config.max_wal_size {
            return;
        }
        if let Err(e) = self.compact() {
            warn!(error = %e, wal_size = size, "automatic compaction failed");
        }
    }

    /// Current WAL size in bytes.
    #[must_use]
    pub fn wal_size(&self) -> u64 {
        self.wal.size_bytes().unwrap_or(0)
    }

    /// Number of segment files on disk.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments
            .lock()
            .map(|s| s.segments().len())
            .unwrap_or(0)
    }

    /// WAL sequence range folded into the newest segment.
    #[must_use]
    pub fn segment_range(&self) -> Option<(u64, u64)> {
        self.segments
            .lock()
            .ok()
            .and_then(|s| s.segments().last().map(|seg| seg.sequence_range))
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}
