//! # lexiq - local-first vocabulary engine
//!
//! lexiq owns a learner's vocabulary on the device: a durable,
//! schema-versioned store, an indexed in-memory mirror that serves every read,
//! incrementally recomputed statistics and a spaced-repetition scheduler.
//!
//! ## Core Concepts
//!
//! - **Item**: a word or phrase with its review schedule and derived scores
//! - **VocabStore**: the storage seam (durable or in-memory)
//! - **VocabCache**: the per-owner mirror; all writes go through it
//! - **StoreEvent**: debounced change and guard notifications
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use lexiq::{Clock, EngineConfig, Item, ManualClock, MemoryVocabStore, VocabCache, WriteOutcome};
//!
//! let clock = Arc::new(ManualClock::epoch());
//! let cache = VocabCache::new(Arc::new(MemoryVocabStore::new()), clock.clone(), EngineConfig::manual())?;
//! cache.init("learner-1")?;
//!
//! let item = Item::new("learner-1", "serendipity", clock.now())?;
//! assert_eq!(cache.save(item)?, WriteOutcome::Committed);
//! assert_eq!(cache.get_stats().total, 1);
//! # Ok::<(), lexiq::LexiqError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod clock;
pub mod error;
pub mod item;
pub mod records;

// Pure engines
pub mod index;
pub mod query;
pub mod scheduler;
pub mod stats;

// Storage, cache and notifications
pub mod cache;
pub mod config;
pub mod guard;
pub mod notify;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use cache::{LoadReport, Promotion, VocabCache, WriteOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{LexiqError, LexiqResult, ValidationError};
pub use index::{IndexEngine, IndexKind};
pub use item::{Grade, Item, ItemId, Quality, SessionKind};
pub use notify::{StoreEvent, Subscription};
pub use query::{ItemQuery, QueryPage};
pub use records::{Collection, CollectionId, Composition, CompositionId, OwnerRecord};
pub use stats::VocabStats;
pub use storage::{MemoryVocabStore, StorageError, VocabStore};

#[cfg(feature = "persistent")]
pub use storage::{open_vocab_store, PersistentConfig, PersistentVocabStore};
