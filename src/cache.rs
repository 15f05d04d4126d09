//! The in-memory mirror of one owner's vocabulary.
//!
//! [`VocabCache`] is the only writer of the mirror. Every mutation runs the
//! same pipeline:
//!
//! ```text
//! derived refresh → WriteGuard → VocabStore commit → mirror → indices → stats → notify
//! ```
//!
//! Reads never touch the store. Storage I/O happens with no mirror lock held.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{LexiqError, LexiqResult, ValidationError};
use crate::guard::WriteGuard;
use crate::index::{IndexEngine, IndexKind};
use crate::item::{normalize_text, Grade, Item, ItemId, SessionKind};
use crate::notify::{ChangeNotifier, EventBus, PumpHandle, StoreEvent, Subscription};
use crate::query::{self, ItemQuery, QueryPage};
use crate::records::{Collection, Composition, OwnerRecord};
use crate::scheduler;
use crate::stats::{self, VocabStats};
use crate::storage::{StorageError, VocabStore};

/// What a load produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    #[allow(missing_docs)]
    pub owner_id: String,
    /// Items in the mirror, archived ones included.
    pub items: usize,
    #[allow(missing_docs)]
    pub collections: usize,
    #[allow(missing_docs)]
    pub compositions: usize,
    /// Items whose stored derived fields were stale and got rewritten.
    pub repaired: usize,
    /// False if the store could not be reached; the mirror is then empty.
    pub storage_available: bool,
}

/// Result of a write that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Durable and visible in the mirror.
    Committed,
    /// Dropped by the write guard. Nothing changed.
    Throttled,
}

impl WriteOutcome {
    #[allow(missing_docs)]
    #[must_use]
    pub const fn is_committed(self) -> bool {
        matches!(self, Self::Committed)
    }
}

/// Result of [`VocabCache::promote`].
#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    /// An item with the same normalized text already existed.
    Existing(Item),
    /// A new RAW item was created.
    Created(Item),
    /// Creation was dropped by the write guard.
    Throttled,
}

#[derive(Debug, Default)]
struct Mirror {
    owner_id: Option<String>,
    initialized: bool,
    items: HashMap<ItemId, Item>,
    collections: Vec<Collection>,
    compositions: Vec<Composition>,
    index: IndexEngine,
    stats: VocabStats,
    /// Ids hard-deleted since this mirror was loaded.
    deleted: HashSet<ItemId>,
}

impl Mirror {
    fn rebuild_composed(&mut self) {
        let items = &self.items;
        let refs = self
            .compositions
            .iter()
            .flat_map(|c| c.item_ids.iter())
            .filter(|id| items.contains_key(id))
            .map(ToString::to_string);
        self.index.rebuild(IndexKind::Composed, refs, |_| true);
    }

    fn rebuild_collection_text(&mut self) {
        let items = &self.items;
        let live: HashSet<String> = items.values().map(Item::text_key).collect();
        let words = self.collections.iter().flat_map(|c| c.words.iter().cloned());
        let referenced = self
            .collections
            .iter()
            .flat_map(|c| c.item_ids.iter())
            .filter_map(|id| items.get(id))
            .map(|i| i.text.clone());
        self.index
            .rebuild(IndexKind::CollectionText, words.chain(referenced), |k| live.contains(k));
    }

    fn rebuild_indices(&mut self) {
        self.rebuild_composed();
        self.rebuild_collection_text();
    }

    fn recompute_stats(&mut self, now: DateTime<Utc>, day_offset_minutes: i32) {
        self.stats = stats::compute(self.items.values(), now, day_offset_minutes);
    }

    /// Earliest-created item whose text normalizes to `key`.
    fn by_text_key(&self, key: &str) -> Option<&Item> {
        self.items
            .values()
            .filter(|i| i.text_key() == key)
            .min_by_key(|i| (i.created_at, i.id))
    }
}

#[derive(Debug, Default)]
struct LoadState {
    loading: bool,
    generation: u64,
    last_report: Option<LoadReport>,
}

/// Per-owner in-memory mirror over a [`VocabStore`].
///
/// Create one per session and call [`init`](Self::init). Independent
/// instances may coexist; each owns its mirror, guard and event bus.
pub struct VocabCache {
    store: Arc<dyn VocabStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    mirror: RwLock<Mirror>,
    load: Mutex<LoadState>,
    load_done: Condvar,
    guard: WriteGuard,
    notifier: Arc<ChangeNotifier>,
    bus: Arc<EventBus>,
    pump: Mutex<Option<PumpHandle>>,
    loads: AtomicU64,
    disposed: AtomicBool,
}

impl std::fmt::Debug for VocabCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VocabCache")
            .field("owner_id", &self.owner_id())
            .field("initialized", &self.is_initialized())
            .field("loads", &self.load_count())
            .finish_non_exhaustive()
    }
}

impl VocabCache {
    /// Builds an uninitialized cache.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad `config`; `Internal` if the notification
    /// pump thread cannot be spawned.
    pub fn new(store: Arc<dyn VocabStore>, clock: Arc<dyn Clock>, config: EngineConfig) -> LexiqResult<Self> {
        let config = config.validate()?;
        let bus = Arc::new(EventBus::new(config.event_capacity));
        let notifier = Arc::new(ChangeNotifier::new(
            Arc::clone(&clock),
            config.debounce_ms,
            Arc::clone(&bus),
        ));

        let pump = if config.auto_pump {
            let tick = std::time::Duration::from_millis(config.pump_interval_ms);
            Some(
                notifier
                    .spawn_pump(tick)
                    .map_err(|e| LexiqError::internal(format!("failed to spawn notification pump: {e}")))?,
            )
        } else {
            None
        };

        Ok(Self {
            guard: WriteGuard::new(Arc::clone(&clock), config.write_cooldown_ms),
            store,
            clock,
            config,
            mirror: RwLock::new(Mirror::default()),
            load: Mutex::new(LoadState::default()),
            load_done: Condvar::new(),
            notifier,
            bus,
            pump: Mutex::new(pump),
            loads: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        })
    }

    fn read_mirror(&self) -> RwLockReadGuard<'_, Mirror> {
        self.mirror.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_mirror(&self) -> RwLockWriteGuard<'_, Mirror> {
        self.mirror.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_state(&self) -> MutexGuard<'_, LoadState> {
        self.load.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn storage_failure(&self, err: StorageError) -> LexiqError {
        if matches!(err, StorageError::SchemaVersionConflict { .. }) {
            warn!(error = %err, "store schema changed underneath the cache; reset required");
            self.bus.publish(StoreEvent::ResetRequired);
        }
        LexiqError::Storage(err)
    }

    fn admit(&self) -> bool {
        if self.guard.try_acquire() {
            return true;
        }
        debug!(throttled = self.guard.throttled(), "write throttled");
        self.bus.publish(StoreEvent::WriteThrottled);
        false
    }

    fn ensure_owner(&self, owner_id: &str) -> LexiqResult<()> {
        let mirror = self.read_mirror();
        match &mirror.owner_id {
            Some(expected) if mirror.initialized && expected == owner_id => Ok(()),
            Some(expected) if mirror.initialized => Err(ValidationError::OwnerMismatch {
                expected: expected.clone(),
                actual: owner_id.to_string(),
            }
            .into()),
            _ => Err(LexiqError::NotInitialized),
        }
    }

    fn validate_item(&self, item: &Item) -> LexiqResult<()> {
        if item.text.trim().is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        self.ensure_owner(&item.owner_id)?;
        if self.read_mirror().deleted.contains(&item.id) {
            return Err(LexiqError::ItemNotFound(item.id));
        }
        Ok(())
    }

    fn after_mutation(&self, mut mirror: RwLockWriteGuard<'_, Mirror>) {
        mirror.recompute_stats(self.clock.now(), self.config.day_offset_minutes);
        drop(mirror);
        self.notifier.touch();
    }

    // --- lifecycle ---

    /// Loads `owner_id`'s data into the mirror.
    ///
    /// Concurrent callers share one load. Re-initializing for the current
    /// owner returns the previous report without I/O; a different owner
    /// replaces the mirror. An unreachable store is not an error: the report
    /// says `storage_available: false` and the cache stays uninitialized.
    ///
    /// # Errors
    ///
    /// `Disposed` after [`dispose`](Self::dispose), `EmptyOwner`, or a
    /// storage error other than `Unavailable`.
    pub fn init(&self, owner_id: &str) -> LexiqResult<LoadReport> {
        if self.is_disposed() {
            return Err(LexiqError::Disposed);
        }
        if owner_id.trim().is_empty() {
            return Err(ValidationError::EmptyOwner.into());
        }

        let mut load = self.load_state();
        loop {
            if load.loading {
                let generation = load.generation;
                while load.loading && load.generation == generation {
                    load = self.load_done.wait(load).unwrap_or_else(PoisonError::into_inner);
                }
                if let Some(report) = load.last_report.as_ref().filter(|r| r.owner_id == owner_id) {
                    return Ok(report.clone());
                }
                continue;
            }

            if let Some(report) = load.last_report.as_ref() {
                if report.owner_id == owner_id && report.storage_available && self.is_initialized() {
                    return Ok(report.clone());
                }
            }
            break;
        }
        load.loading = true;
        drop(load);

        let result = self.load_owner(owner_id);

        let mut load = self.load_state();
        load.loading = false;
        load.generation += 1;
        load.last_report = result.as_ref().ok().cloned();
        drop(load);
        self.load_done.notify_all();

        result
    }

    /// Clears the mirror and loads `owner_id` again.
    ///
    /// # Errors
    ///
    /// See [`init`](Self::init).
    pub fn force_reload(&self, owner_id: &str) -> LexiqResult<LoadReport> {
        if self.is_disposed() {
            return Err(LexiqError::Disposed);
        }
        self.load_state().last_report = None;
        *self.write_mirror() = Mirror::default();
        self.init(owner_id)
    }

    fn fetch(&self, owner_id: &str) -> Result<(Vec<Item>, Vec<Collection>, Vec<Composition>), StorageError> {
        Ok((
            self.store.load_items(owner_id)?,
            self.store.load_collections(owner_id)?,
            self.store.load_compositions(owner_id)?,
        ))
    }

    fn load_owner(&self, owner_id: &str) -> LexiqResult<LoadReport> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!(owner = owner_id, "loading mirror");

        let (mut items, collections, compositions) = match self.fetch(owner_id) {
            Ok(loaded) => loaded,
            Err(StorageError::Unavailable(reason)) => {
                warn!(owner = owner_id, %reason, "storage unavailable; serving an empty mirror");
                *self.write_mirror() = Mirror::default();
                return Ok(LoadReport {
                    owner_id: owner_id.to_string(),
                    items: 0,
                    collections: 0,
                    compositions: 0,
                    repaired: 0,
                    storage_available: false,
                });
            }
            Err(e) => return Err(self.storage_failure(e)),
        };

        let repaired: Vec<Item> = items
            .iter_mut()
            .filter_map(|item| scheduler::refresh_derived(item).then(|| item.clone()))
            .collect();
        if !repaired.is_empty() {
            match self.store.put_items(&repaired) {
                Ok(()) => info!(owner = owner_id, repaired = repaired.len(), "repaired stale derived fields"),
                Err(e) => warn!(owner = owner_id, error = %e, "failed to persist repaired items"),
            }
        }

        let mut mirror = Mirror {
            owner_id: Some(owner_id.to_string()),
            initialized: true,
            items: items.into_iter().map(|i| (i.id, i)).collect(),
            collections,
            compositions,
            index: IndexEngine::new(),
            stats: VocabStats::default(),
            deleted: HashSet::new(),
        };
        mirror.rebuild_indices();
        mirror.recompute_stats(self.clock.now(), self.config.day_offset_minutes);

        let report = LoadReport {
            owner_id: owner_id.to_string(),
            items: mirror.items.len(),
            collections: mirror.collections.len(),
            compositions: mirror.compositions.len(),
            repaired: repaired.len(),
            storage_available: true,
        };
        *self.write_mirror() = mirror;
        info!(owner = owner_id, items = report.items, repaired = report.repaired, "cache initialized");
        Ok(report)
    }

    /// Clears the mirror, stops the pump and disconnects subscribers.
    ///
    /// Terminal: later [`init`](Self::init) calls fail with `Disposed`.
    /// Build a new cache to start another session.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.notifier.cancel();
        self.load_state().last_report = None;
        *self.write_mirror() = Mirror::default();
        self.guard.reset();
        self.bus.close();
        debug!("cache disposed");
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // --- writes ---

    /// Saves one item (insert or replace).
    ///
    /// # Errors
    ///
    /// Validation errors, `NotInitialized`, `ItemNotFound` for an id deleted
    /// through this cache, or the store's failure. On error the mirror is
    /// unchanged.
    pub fn save(&self, item: Item) -> LexiqResult<WriteOutcome> {
        self.validate_item(&item)?;
        let mut item = item;
        scheduler::refresh_derived(&mut item);
        item.updated_at = self.clock.now();

        if !self.admit() {
            return Ok(WriteOutcome::Throttled);
        }
        self.store.put_item(&item).map_err(|e| self.storage_failure(e))?;
        self.apply_saved(vec![item]);
        Ok(WriteOutcome::Committed)
    }

    /// Saves many items in one commit.
    ///
    /// # Errors
    ///
    /// See [`save`](Self::save). Validation covers every item before any I/O.
    pub fn bulk_save(&self, items: Vec<Item>) -> LexiqResult<WriteOutcome> {
        if items.is_empty() {
            return Ok(WriteOutcome::Committed);
        }
        for item in &items {
            self.validate_item(item)?;
        }
        let now = self.clock.now();
        let items: Vec<Item> = items
            .into_iter()
            .map(|mut item| {
                scheduler::refresh_derived(&mut item);
                item.updated_at = now;
                item
            })
            .collect();

        if !self.admit() {
            return Ok(WriteOutcome::Throttled);
        }
        self.store.put_items(&items).map_err(|e| self.storage_failure(e))?;
        self.apply_saved(items);
        Ok(WriteOutcome::Committed)
    }

    /// Saves an item and its owner record atomically.
    ///
    /// # Errors
    ///
    /// `OwnerMismatch` if the record belongs to someone else; otherwise see
    /// [`save`](Self::save).
    pub fn save_with_owner(&self, item: Item, owner: &OwnerRecord) -> LexiqResult<WriteOutcome> {
        self.validate_item(&item)?;
        if owner.owner_id != item.owner_id {
            return Err(ValidationError::OwnerMismatch {
                expected: item.owner_id.clone(),
                actual: owner.owner_id.clone(),
            }
            .into());
        }
        let mut item = item;
        scheduler::refresh_derived(&mut item);
        item.updated_at = self.clock.now();

        if !self.admit() {
            return Ok(WriteOutcome::Throttled);
        }
        self.store
            .put_item_with_owner(&item, owner)
            .map_err(|e| self.storage_failure(e))?;
        self.apply_saved(vec![item]);
        Ok(WriteOutcome::Committed)
    }

    fn apply_saved(&self, items: Vec<Item>) {
        let count = items.len();
        let mut mirror = self.write_mirror();
        let mut texts_changed = false;
        for item in items {
            texts_changed |= mirror
                .items
                .get(&item.id)
                .map_or(true, |old| old.text_key() != item.text_key());
            mirror.items.insert(item.id, item);
        }
        if texts_changed {
            mirror.rebuild_collection_text();
        }
        debug!(items = count, texts_changed, "saved");
        self.after_mutation(mirror);
    }

    /// Hard-deletes one item.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` if the mirror has no such item, or the store's failure.
    pub fn delete(&self, id: ItemId) -> LexiqResult<WriteOutcome> {
        {
            let mirror = self.read_mirror();
            if !mirror.initialized {
                return Err(LexiqError::NotInitialized);
            }
            if !mirror.items.contains_key(&id) {
                return Err(LexiqError::ItemNotFound(id));
            }
        }
        if !self.admit() {
            return Ok(WriteOutcome::Throttled);
        }
        self.store.delete_item(id).map_err(|e| self.storage_failure(e))?;
        self.apply_deleted(&[id]);
        Ok(WriteOutcome::Committed)
    }

    /// Hard-deletes many items in one commit. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or the store's failure.
    pub fn bulk_delete(&self, ids: &[ItemId]) -> LexiqResult<WriteOutcome> {
        if !self.is_initialized() {
            return Err(LexiqError::NotInitialized);
        }
        if ids.is_empty() {
            return Ok(WriteOutcome::Committed);
        }
        if !self.admit() {
            return Ok(WriteOutcome::Throttled);
        }
        self.store.delete_items(ids).map_err(|e| self.storage_failure(e))?;
        self.apply_deleted(ids);
        Ok(WriteOutcome::Committed)
    }

    fn apply_deleted(&self, ids: &[ItemId]) {
        let mut mirror = self.write_mirror();
        for id in ids {
            mirror.items.remove(id);
            mirror.deleted.insert(*id);
        }
        mirror.rebuild_indices();
        debug!(items = ids.len(), "deleted");
        self.after_mutation(mirror);
    }

    /// Applies a graded review and saves the result.
    ///
    /// # Errors
    ///
    /// `ItemNotFound`, or see [`save`](Self::save).
    pub fn review(&self, id: ItemId, grade: Grade, session: SessionKind) -> LexiqResult<WriteOutcome> {
        let item = self.get_by_id(id).ok_or(LexiqError::ItemNotFound(id))?;
        let reviewed = scheduler::apply_review_outcome(&item, grade, self.clock.now(), session);
        self.save(reviewed)
    }

    /// Sets or clears the archived (passive) flag.
    ///
    /// # Errors
    ///
    /// `ItemNotFound`, or see [`save`](Self::save).
    pub fn archive(&self, id: ItemId, archived: bool) -> LexiqResult<WriteOutcome> {
        let mut item = self.get_by_id(id).ok_or(LexiqError::ItemNotFound(id))?;
        item.flags.is_passive = archived;
        self.save(item)
    }

    /// Returns the item whose text matches `text`, or creates a RAW one.
    ///
    /// # Errors
    ///
    /// `EmptyText`, owner errors, or the store's failure.
    pub fn promote(&self, owner_id: &str, text: &str) -> LexiqResult<Promotion> {
        self.ensure_owner(owner_id)?;
        let key = normalize_text(text);
        if key.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        if let Some(existing) = self.read_mirror().by_text_key(&key) {
            return Ok(Promotion::Existing(existing.clone()));
        }

        let item = Item::new(owner_id, text, self.clock.now())?;
        match self.save(item.clone())? {
            WriteOutcome::Committed => Ok(Promotion::Created(self.get_by_id(item.id).unwrap_or(item))),
            WriteOutcome::Throttled => Ok(Promotion::Throttled),
        }
    }

    // --- index hooks ---

    /// Reloads compositions and rebuilds the composed index.
    ///
    /// # Errors
    ///
    /// Owner errors, or the store's failure.
    pub fn notify_composition_changed(&self, owner_id: &str) -> LexiqResult<()> {
        self.ensure_owner(owner_id)?;
        let compositions = self
            .store
            .load_compositions(owner_id)
            .map_err(|e| self.storage_failure(e))?;
        let mut mirror = self.write_mirror();
        mirror.compositions = compositions;
        mirror.rebuild_composed();
        debug!(owner = owner_id, compositions = mirror.compositions.len(), "composed index rebuilt");
        drop(mirror);
        self.notifier.touch();
        Ok(())
    }

    /// Reloads collections and rebuilds the collection-text index.
    ///
    /// # Errors
    ///
    /// Owner errors, or the store's failure.
    pub fn notify_collection_changed(&self, owner_id: &str) -> LexiqResult<()> {
        self.ensure_owner(owner_id)?;
        let collections = self
            .store
            .load_collections(owner_id)
            .map_err(|e| self.storage_failure(e))?;
        let mut mirror = self.write_mirror();
        mirror.collections = collections;
        mirror.rebuild_collection_text();
        debug!(owner = owner_id, collections = mirror.collections.len(), "collection index rebuilt");
        drop(mirror);
        self.notifier.touch();
        Ok(())
    }

    // --- reads ---

    /// Every item, archived ones included, newest first.
    #[must_use]
    pub fn get_all(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self.read_mirror().items.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        items
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn get_by_id(&self, id: ItemId) -> Option<Item> {
        self.read_mirror().items.get(&id).cloned()
    }

    /// Runs a list query over the mirror.
    ///
    /// # Errors
    ///
    /// `InvalidPageSize`, or `OwnerMismatch` when the cache holds another owner.
    pub fn query(&self, owner_id: &str, query: &ItemQuery) -> LexiqResult<QueryPage> {
        query.validate()?;
        let mirror = self.read_mirror();
        if let Some(expected) = mirror.owner_id.as_ref().filter(|o| *o != owner_id) {
            return Err(ValidationError::OwnerMismatch {
                expected: expected.clone(),
                actual: owner_id.to_string(),
            }
            .into());
        }
        Ok(query::execute(mirror.items.values(), &mirror.index, self.clock.now(), query))
    }

    /// Aggregates as of the last mutation.
    #[must_use]
    pub fn get_stats(&self) -> VocabStats {
        self.read_mirror().stats.clone()
    }

    /// Case-insensitive text lookup in the mirror. Earliest created wins.
    #[must_use]
    pub fn find_by_text(&self, text: &str) -> Option<Item> {
        self.read_mirror().by_text_key(&normalize_text(text)).cloned()
    }

    /// True if any composition references `id`.
    #[must_use]
    pub fn is_composed(&self, id: ItemId) -> bool {
        self.read_mirror()
            .index
            .contains(IndexKind::Composed, &id.to_string())
    }

    /// True if `text` belongs to any collection.
    #[must_use]
    pub fn is_in_collection(&self, text: &str) -> bool {
        self.read_mirror().index.contains(IndexKind::CollectionText, text)
    }

    /// Verified, active items whose next review has passed, most overdue first.
    #[must_use]
    pub fn review_queue(&self, limit: usize) -> Vec<Item> {
        let now = self.clock.now();
        let mirror = self.read_mirror();
        let mut due: Vec<&Item> = mirror
            .items
            .values()
            .filter(|i| !i.is_archived() && i.is_due_for_review_queue(now))
            .collect();
        due.sort_by_key(|i| (i.schedule.next_review, i.id));
        due.into_iter().take(limit).cloned().collect()
    }

    /// Active new items, oldest first.
    #[must_use]
    pub fn new_queue(&self, limit: usize) -> Vec<Item> {
        let mirror = self.read_mirror();
        let mut fresh: Vec<&Item> = mirror
            .items
            .values()
            .filter(|i| !i.is_archived() && i.is_new())
            .collect();
        fresh.sort_by_key(|i| (i.created_at, i.id));
        fresh.into_iter().take(limit).cloned().collect()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.read_mirror().initialized
    }

    /// Owner the mirror holds, if initialized.
    #[must_use]
    pub fn owner_id(&self) -> Option<String> {
        let mirror = self.read_mirror();
        mirror.owner_id.clone().filter(|_| mirror.initialized)
    }

    /// Loads started so far, including ones that found storage unavailable.
    #[must_use]
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    // --- notifications ---

    /// Registers an event subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Publishes a pending `DataChanged` whose debounce window has elapsed.
    /// Returns true if it did. The pump calls the same path on every tick.
    pub fn flush_notifications(&self) -> bool {
        self.notifier.poll()
    }

    /// Writes rejected by the guard so far.
    #[must_use]
    pub fn throttled_writes(&self) -> u64 {
        self.guard.throttled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::item::Quality;
    use crate::storage::MemoryVocabStore;
    use chrono::Duration;

    fn cache() -> (VocabCache, Arc<MemoryVocabStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryVocabStore::new());
        let clock = Arc::new(ManualClock::epoch());
        let cache = VocabCache::new(store.clone(), clock.clone(), EngineConfig::manual()).unwrap();
        (cache, store, clock)
    }

    fn item(clock: &ManualClock, text: &str) -> Item {
        Item::new("u1", text, clock.now()).unwrap()
    }

    #[test]
    fn test_writes_require_init() {
        let (cache, _, clock) = cache();
        assert!(matches!(cache.save(item(&clock, "gist")), Err(LexiqError::NotInitialized)));
        assert!(cache.get_all().is_empty());
    }

    #[test]
    fn test_save_rejects_other_owner() {
        let (cache, _, clock) = cache();
        cache.init("u1").unwrap();
        let foreign = Item::new("u2", "gist", clock.now()).unwrap();
        let err = cache.save(foreign).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_init_repairs_stale_derived_fields() {
        let (cache, store, clock) = cache();
        let mut stale = item(&clock, "take it with a grain of salt");
        stale.derived.complexity_score = 0;
        store.put_item(&stale).unwrap();

        let report = cache.init("u1").unwrap();
        assert_eq!(report.repaired, 1);
        let stored = store.load_items("u1").unwrap();
        assert_eq!(stored[0].derived, scheduler::compute_derived_fields(&stored[0]));
    }

    #[test]
    fn test_reinit_same_owner_is_noop() {
        let (cache, _, _) = cache();
        cache.init("u1").unwrap();
        cache.init("u1").unwrap();
        assert_eq!(cache.load_count(), 1);

        cache.init("u2").unwrap();
        assert_eq!(cache.owner_id().as_deref(), Some("u2"));
        assert_eq!(cache.load_count(), 2);
    }

    #[test]
    fn test_review_updates_schedule_and_stats() {
        let (cache, _, clock) = cache();
        cache.init("u1").unwrap();
        let mut it = item(&clock, "gist");
        it.quality = Quality::Verified;
        let id = it.id;
        cache.save(it).unwrap();
        assert_eq!(cache.get_stats().new, 1);

        cache.review(id, Grade::Learned, SessionKind::Review).unwrap();
        let reviewed = cache.get_by_id(id).unwrap();
        assert!(reviewed.schedule.next_review > reviewed.schedule.last_review);
        assert_eq!(cache.get_stats().new, 0);

        clock.advance(Duration::days(30));
        assert_eq!(cache.review_queue(10).len(), 1);
    }

    #[test]
    fn test_promote_reuses_existing_text() {
        let (cache, _, _) = cache();
        cache.init("u1").unwrap();

        let Promotion::Created(created) = cache.promote("u1", "Serendipity").unwrap() else {
            panic!("expected a new item");
        };
        assert_eq!(created.quality, Quality::Raw);

        let Promotion::Existing(existing) = cache.promote("u1", "  serendipity ").unwrap() else {
            panic!("expected the existing item");
        };
        assert_eq!(existing.id, created.id);
    }

    #[test]
    fn test_archive_hides_from_stats_and_queues() {
        let (cache, _, clock) = cache();
        cache.init("u1").unwrap();
        let mut it = item(&clock, "gist");
        it.quality = Quality::Verified;
        let id = it.id;
        cache.save(it).unwrap();

        cache.archive(id, true).unwrap();
        assert_eq!(cache.get_stats().total, 0);
        assert!(cache.new_queue(5).is_empty());
        assert!(cache.get_by_id(id).unwrap().is_archived());
    }

    #[test]
    fn test_delete_unknown_item() {
        let (cache, _, _) = cache();
        cache.init("u1").unwrap();
        assert!(matches!(cache.delete(ItemId::new()), Err(LexiqError::ItemNotFound(_))));
    }

    #[test]
    fn test_dispose_clears_state() {
        let (cache, _, clock) = cache();
        cache.init("u1").unwrap();
        cache.save(item(&clock, "gist")).unwrap();

        cache.dispose();
        assert!(!cache.is_initialized());
        assert!(cache.get_all().is_empty());
        assert!(cache.owner_id().is_none());
    }

    #[test]
    fn test_dispose_is_terminal() {
        let (cache, _, clock) = cache();
        cache.init("u1").unwrap();
        cache.dispose();

        assert!(cache.is_disposed());
        assert!(matches!(cache.init("u1"), Err(LexiqError::Disposed)));
        assert!(matches!(cache.force_reload("u1"), Err(LexiqError::Disposed)));
        assert!(matches!(cache.save(item(&clock, "gist")), Err(LexiqError::NotInitialized)));
        assert_eq!(cache.load_count(), 1);
    }

    #[test]
    fn test_save_of_deleted_item_is_rejected() {
        let (cache, store, clock) = cache();
        cache.init("u1").unwrap();
        let gist = item(&clock, "gist");
        let other = item(&clock, "other");
        cache.bulk_save(vec![gist.clone(), other.clone()]).unwrap();

        let stale = cache.get_by_id(gist.id).unwrap();
        cache.delete(gist.id).unwrap();

        assert!(matches!(cache.save(stale.clone()), Err(LexiqError::ItemNotFound(id)) if id == gist.id));
        assert!(matches!(
            cache.bulk_save(vec![other.clone(), stale]),
            Err(LexiqError::ItemNotFound(_))
        ));
        assert!(cache.get_by_id(gist.id).is_none());
        assert_eq!(store.item_count().unwrap(), 1);

        // A fresh item with the same text is a new id and is accepted.
        assert_eq!(cache.save(item(&clock, "gist")).unwrap(), WriteOutcome::Committed);
        assert_eq!(cache.get_all().len(), 2);
    }
}
