//! Crash recovery tests for persistent storage.
//!
//! These tests verify that the storage layer correctly handles:
//! - Torn writes at the tail of the WAL (simulated crash mid-append)
//! - WAL replay idempotency across restarts
//! - CRC corruption in the last frame
//! - Recovery from segments written by compaction

#![cfg(feature = "persistent")]

use std::fs;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lexiq::storage::persistent::{open_vocab_store, PersistentConfig};
use lexiq::{
    EngineConfig, Item, ItemId, ManualClock, PersistentVocabStore, Quality, VocabCache, VocabStore, WriteOutcome,
};
use tempfile::tempdir;

const WAL_FILE: &str = "lexiq.wal";

fn at() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_110_400, 0).unwrap()
}

fn word(text: &str) -> Item {
    Item::new("u1", text, at()).unwrap()
}

fn manual_compaction() -> Option<PersistentConfig> {
    Some(PersistentConfig {
        auto_compact: false,
        ..PersistentConfig::default()
    })
}

/// A torn final frame is dropped; everything before it survives.
#[test]
fn test_torn_wal_tail_recovery() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join(WAL_FILE);

    {
        let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
        for i in 0..5 {
            store.put_item(&word(&format!("word_{i}"))).unwrap();
        }
    }

    // Chop a few bytes off the last frame.
    {
        let file = fs::OpenOptions::new().write(true).open(&wal_path).unwrap();
        let size = file.metadata().unwrap().len();
        file.set_len(size - 3).unwrap();
    }

    let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
    let items = store.load_items("u1").unwrap();
    assert_eq!(items.len(), 4);
    assert!(store.find_by_text("u1", "word_4").unwrap().is_none());
    assert!(store.find_by_text("u1", "word_3").unwrap().is_some());

    // The log accepts new writes after recovery.
    store.put_item(&word("after")).unwrap();
    drop(store);
    let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
    assert_eq!(store.load_items("u1").unwrap().len(), 5);
}

/// Replaying the same log on every restart yields the same state.
#[test]
fn test_wal_replay_idempotency() {
    let dir = tempdir().unwrap();
    let mut item = word("unique");
    let id = item.id;

    {
        let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
        store.put_item(&item).unwrap();
        item.meaning = "one of a kind".to_string();
        store.put_item(&item).unwrap();
    }

    for _ in 0..3 {
        let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
        let items = store.load_items("u1").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].meaning, "one of a kind");
    }
}

/// A flipped bit in the final frame fails its CRC and that commit is discarded.
#[test]
fn test_crc_corruption_detection() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join(WAL_FILE);

    {
        let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
        store.put_item(&word("kept")).unwrap();
        store.put_item(&word("corrupted")).unwrap();
    }

    {
        let mut content = fs::read(&wal_path).unwrap();
        let idx = content.len() - 2;
        content[idx] ^= 0xFF;
        fs::write(&wal_path, &content).unwrap();
    }

    let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
    let texts: Vec<String> = store.load_items("u1").unwrap().into_iter().map(|i| i.text).collect();
    assert_eq!(texts, vec!["kept".to_string()]);
}

/// Data written before and after a compaction survives a restart.
#[test]
fn test_compaction_recovery() {
    let dir = tempdir().unwrap();
    let mut ids: Vec<ItemId> = Vec::new();

    {
        let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
        let batch: Vec<Item> = (0..10).map(|i| word(&format!("compacted_{i}"))).collect();
        ids.extend(batch.iter().map(|i| i.id));
        store.put_items(&batch).unwrap();

        let result = store.compact().unwrap();
        assert!(result.documents >= 10);
        assert!(result.wal_size_after < result.wal_size_before);

        for i in 10..15 {
            let item = word(&format!("after_compact_{i}"));
            ids.push(item.id);
            store.put_item(&item).unwrap();
        }
        store.delete_item(ids[0]).unwrap();
    }

    let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
    let loaded: Vec<ItemId> = store.load_items("u1").unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(loaded.len(), 14);
    assert!(!loaded.contains(&ids[0]));
    for id in &ids[1..] {
        assert!(loaded.contains(id));
    }
}

/// Each compaction supersedes the previous segment.
#[test]
fn test_multiple_compactions() {
    let dir = tempdir().unwrap();

    {
        let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
        for i in 0..5 {
            store.put_item(&word(&format!("batch1_{i}"))).unwrap();
        }
        store.compact().unwrap();

        for i in 0..5 {
            store.put_item(&word(&format!("batch2_{i}"))).unwrap();
        }
        store.compact().unwrap();

        assert_eq!(store.database().unwrap().segment_count(), 1);
    }

    let store = open_vocab_store(dir.path(), manual_compaction()).unwrap();
    let items = store.load_items("u1").unwrap();
    assert_eq!(items.iter().filter(|i| i.text.starts_with("batch1_")).count(), 5);
    assert_eq!(items.iter().filter(|i| i.text.starts_with("batch2_")).count(), 5);
}

/// Auto-compaction kicks in once the WAL passes its threshold.
#[test]
fn test_auto_compaction_bounds_wal() {
    let dir = tempdir().unwrap();
    let cfg = PersistentConfig {
        max_wal_size: 8 * 1024,
        ..PersistentConfig::default()
    };

    {
        let store = open_vocab_store(dir.path(), Some(cfg.clone())).unwrap();
        for i in 0..100 {
            store.put_item(&word(&format!("filler word number {i}"))).unwrap();
        }
        let db = store.database().unwrap();
        assert!(db.segment_count() >= 1);
        assert!(db.wal_size() < 16 * 1024);
    }

    let store = open_vocab_store(dir.path(), Some(cfg)).unwrap();
    assert_eq!(store.load_items("u1").unwrap().len(), 100);
}

/// The cache over a durable store sees its own writes after a restart.
#[test]
fn test_cache_survives_restart() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(at()));
    let mut item = word("resilient");
    item.quality = Quality::Verified;
    let id = item.id;

    {
        let store: Arc<PersistentVocabStore> = Arc::new(open_vocab_store(dir.path(), None).unwrap());
        let cache = VocabCache::new(store, clock.clone(), EngineConfig::manual()).unwrap();
        cache.init("u1").unwrap();
        assert_eq!(cache.save(item).unwrap(), WriteOutcome::Committed);
        cache.dispose();
    }

    let store = Arc::new(open_vocab_store(dir.path(), None).unwrap());
    let cache = VocabCache::new(store, clock, EngineConfig::manual()).unwrap();
    let report = cache.init("u1").unwrap();
    assert_eq!(report.items, 1);
    assert_eq!(report.repaired, 0);
    assert_eq!(cache.get_stats().new, 1);
    assert_eq!(cache.get_by_id(id).unwrap().text, "resilient");
}
