//! Persistent storage backend for lexiq.
//!
//! A single-process, schema-versioned document database with:
//! - Write-Ahead Logging (WAL) for crash recovery
//! - File locking for single-writer access
//! - CRC32 checksums for corruption detection
//! - Segment snapshots written by compaction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PersistentVocabStore  (typed repository, VocabStore)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  DatabaseConnector     (lazy, shared Arc<Database>)          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Database              (catalog, tables, indices, ladder)    │
//! │  ┌─────────────────┐  ┌─────────────────┐                    │
//! │  │ WriteAheadLog   │  │ SegmentManager  │                    │
//! │  └────────┬────────┘  └────────┬────────┘                    │
//! │           └──────────┬─────────┘                             │
//! │           ┌─────────────────────┐                            │
//! │           │   FileLock (flock)  │                            │
//! │           └─────────────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod catalog;
mod codec;
mod connector;
mod database;
mod file_lock;
mod migration;
mod repository;
pub mod schema;
mod segment;
mod wal;

pub use catalog::{Catalog, CollectionDef, IndexDef, IndexKey, KeyPart};
pub use connector::DatabaseConnector;
pub use database::{CompactionResult, Database, Transaction};
pub use file_lock::FileLock;
pub use migration::{target_version, BackfillFn, Migration, MigrationStep};
pub use repository::PersistentVocabStore;
pub use segment::{Segment, SegmentData, SegmentManager};
pub use wal::{WalEntry, WalEntryKind, WalOp, WriteAheadLog};

use std::path::Path;

use crate::error::{LexiqResult, ValidationError};

/// Configuration for persistent storage.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// WAL size that triggers automatic compaction (bytes).
    pub max_wal_size: u64,
    /// Whether to fsync after every write (slower but safer).
    pub sync_on_write: bool,
    /// Upper bound for a single segment snapshot (bytes).
    pub max_segment_size: u64,
    /// Compact automatically once the WAL reaches `max_wal_size`.
    pub auto_compact: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            max_wal_size: 16 * 1024 * 1024,
            sync_on_write: true,
            max_segment_size: 256 * 1024 * 1024,
            auto_compact: true,
        }
    }
}

impl PersistentConfig {
    const MIN_WAL_SIZE: u64 = 4 * 1024;
    const MIN_SEGMENT_SIZE: u64 = 16 * 1024;

    /// Rejects degenerate sizes.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the offending field.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(ValidationError::InvalidConfig {
                field: "max_wal_size".to_string(),
                reason: format!(
                    "must be at least {} bytes (got {})",
                    Self::MIN_WAL_SIZE,
                    self.max_wal_size
                ),
            });
        }

        if self.max_segment_size < Self::MIN_SEGMENT_SIZE {
            return Err(ValidationError::InvalidConfig {
                field: "max_segment_size".to_string(),
                reason: format!(
                    "must be at least {} bytes (got {})",
                    Self::MIN_SEGMENT_SIZE,
                    self.max_segment_size
                ),
            });
        }

        Ok(self)
    }
}

/// Opens (or creates) a vocabulary store at `path` and brings its schema up
/// to date.
///
/// # Errors
/// - If the configuration is invalid
/// - If the path cannot be created or another handle holds the lock
/// - If the stored schema is newer than this build
///
/// # Example
/// ```rust,no_run
/// use lexiq::storage::persistent::{open_vocab_store, PersistentConfig};
///
/// let store = open_vocab_store("./vocab.lexiq", None)?;
/// # Ok::<(), lexiq::LexiqError>(())
/// ```
pub fn open_vocab_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> LexiqResult<PersistentVocabStore> {
    let cfg = config.unwrap_or_default().validate()?;
    let store = PersistentVocabStore::new(DatabaseConnector::vocabulary(path.as_ref(), cfg));
    store.database()?;
    Ok(store)
}
