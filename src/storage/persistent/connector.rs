//! Shared, lazily opened database handle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::storage::traits::StorageError;

use super::database::Database;
use super::migration::Migration;
use super::{schema, PersistentConfig};

/// Opens a [`Database`] at most once per live handle.
///
/// Callers racing on the first [`open`](Self::open) share one attempt: the
/// slot mutex is held while the database opens. A handle that has since been
/// closed is replaced on the next call, except after a foreign version
/// change, which keeps failing until [`close`](Self::close).
pub struct DatabaseConnector {
    dir: PathBuf,
    config: PersistentConfig,
    migrations: Vec<Migration>,
    slot: Mutex<Option<Arc<Database>>>,
    opens: AtomicU64,
}

impl std::fmt::Debug for DatabaseConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnector")
            .field("dir", &self.dir)
            .field("opens", &self.open_count())
            .finish_non_exhaustive()
    }
}

impl DatabaseConnector {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, config: PersistentConfig, migrations: Vec<Migration>) -> Self {
        Self {
            dir: dir.into(),
            config,
            migrations,
            slot: Mutex::new(None),
            opens: AtomicU64::new(0),
        }
    }

    /// Connector for the vocabulary schema.
    #[must_use]
    pub fn vocabulary(dir: impl Into<PathBuf>, config: PersistentConfig) -> Self {
        Self::new(dir, config, schema::migrations())
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the open database, opening it if needed.
    ///
    /// # Errors
    ///
    /// Whatever [`Database::open`] reports. A failed attempt leaves the slot
    /// empty so the next call retries.
    pub fn open(&self) -> Result<Arc<Database>, StorageError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| StorageError::Unavailable("poisoned lock: connector".to_string()))?;

        if let Some(db) = slot.as_ref() {
            if !db.is_closed() {
                return Ok(Arc::clone(db));
            }
            // Reopening against a foreign schema would fail the same way.
            if let Some(stored) = db.foreign_version() {
                return Err(StorageError::SchemaVersionConflict {
                    stored,
                    supported: db.supported_version(),
                });
            }
            debug!(dir = %self.dir.display(), "discarding closed database handle");
            // Release the directory lock before reopening.
            slot.take();
        }

        let db = Arc::new(Database::open(&self.dir, self.config.clone(), &self.migrations)?);
        let opens = self.opens.fetch_add(1, Ordering::Relaxed) + 1;
        info!(dir = %self.dir.display(), opens, "database connected");
        *slot = Some(Arc::clone(&db));
        Ok(db)
    }

    /// Successful opens so far.
    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Closes and forgets the cached handle.
    pub fn close(&self) {
        let db = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(db) = db {
            db.close();
        }
    }
}
