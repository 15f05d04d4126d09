//! Versioned, idempotent schema ladder.
//!
//! Each [`Migration`] is a list of steps. Every step checks for its own
//! effect before acting, so re-running a half-applied migration finishes it
//! without duplicating work. A failing step is logged and skipped; the stored
//! version only advances through consecutive migrations whose steps all
//! succeeded, so a failed migration is retried on the next open.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::storage::traits::StorageError;

use super::catalog::{CollectionDef, IndexDef};
use super::database::Database;

/// Document rewrite used by [`MigrationStep::Backfill`]. Returns whether the
/// document changed.
pub type BackfillFn = fn(&mut Value) -> Result<bool, String>;

/// One schema operation.
#[derive(Debug, Clone)]
pub enum MigrationStep {
    /// Declares a collection if it does not exist yet.
    CreateCollection(CollectionDef),
    /// Declares an index if the collection lacks it.
    CreateIndex {
        #[allow(missing_docs)]
        collection: String,
        #[allow(missing_docs)]
        index: IndexDef,
    },
    /// Drops a superseded collection and its documents.
    DeleteCollection {
        #[allow(missing_docs)]
        name: String,
    },
    /// Rewrites existing documents in place.
    Backfill {
        #[allow(missing_docs)]
        collection: String,
        /// Shown in logs.
        name: &'static str,
        #[allow(missing_docs)]
        apply: BackfillFn,
    },
}

impl MigrationStep {
    fn describe(&self) -> String {
        match self {
            Self::CreateCollection(def) => format!("create collection '{}'", def.name),
            Self::CreateIndex { collection, index } => {
                format!("create index '{}' on '{collection}'", index.name)
            }
            Self::DeleteCollection { name } => format!("delete collection '{name}'"),
            Self::Backfill { collection, name, .. } => format!("backfill '{name}' on '{collection}'"),
        }
    }

    /// Applies the step. `Ok(false)` means it was already in effect.
    fn apply(&self, db: &Database) -> Result<bool, StorageError> {
        match self {
            Self::CreateCollection(def) => db.create_collection(def),
            Self::CreateIndex { collection, index } => db.create_index(collection, index),
            Self::DeleteCollection { name } => db.delete_collection(name),
            Self::Backfill { collection, apply, .. } => db.backfill(collection, *apply),
        }
    }
}

/// A numbered group of steps.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Strictly increasing across the ladder.
    pub version: u32,
    #[allow(missing_docs)]
    pub name: &'static str,
    #[allow(missing_docs)]
    pub steps: Vec<MigrationStep>,
}

impl Migration {
    #[allow(missing_docs)]
    #[must_use]
    pub const fn new(version: u32, name: &'static str) -> Self {
        Self {
            version,
            name,
            steps: Vec::new(),
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn create_collection(mut self, name: &str, primary_key: &str) -> Self {
        self.steps
            .push(MigrationStep::CreateCollection(CollectionDef::new(name, primary_key)));
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn create_index(mut self, collection: &str, index: IndexDef) -> Self {
        self.steps.push(MigrationStep::CreateIndex {
            collection: collection.to_string(),
            index,
        });
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn delete_collection(mut self, name: &str) -> Self {
        self.steps.push(MigrationStep::DeleteCollection {
            name: name.to_string(),
        });
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn backfill(mut self, collection: &str, name: &'static str, apply: BackfillFn) -> Self {
        self.steps.push(MigrationStep::Backfill {
            collection: collection.to_string(),
            name,
            apply,
        });
        self
    }
}

/// Highest version in `migrations`, or 0 for an empty ladder.
#[must_use]
pub fn target_version(migrations: &[Migration]) -> u32 {
    migrations.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Brings `db` up to [`target_version`] and returns the version reached.
///
/// # Errors
///
/// `SchemaVersionConflict` if the stored version is newer than the ladder.
/// Step failures are not errors; they hold the version back.
pub(crate) fn run_ladder(db: &Database, migrations: &[Migration]) -> Result<u32, StorageError> {
    let target = target_version(migrations);
    let stored = db.version()?;
    if stored > target {
        return Err(StorageError::SchemaVersionConflict {
            stored,
            supported: target,
        });
    }

    let mut pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > stored).collect();
    pending.sort_by_key(|m| m.version);

    let mut reached = stored;
    let mut blocked = false;
    for migration in pending {
        let mut failed = 0usize;
        for step in &migration.steps {
            match step.apply(db) {
                Ok(true) => debug!(version = migration.version, step = %step.describe(), "applied migration step"),
                Ok(false) => debug!(version = migration.version, step = %step.describe(), "migration step already applied"),
                Err(e) => {
                    failed += 1;
                    warn!(
                        version = migration.version,
                        migration = migration.name,
                        step = %step.describe(),
                        error = %e,
                        "migration step failed; continuing"
                    );
                }
            }
        }

        if failed > 0 {
            blocked = true;
        }
        if blocked {
            continue;
        }
        db.set_version(migration.version)?;
        reached = migration.version;
        info!(version = reached, migration = migration.name, "schema migrated");
    }

    if reached < target {
        warn!(reached, target, "schema left below target; failed steps retry on next open");
    }
    Ok(reached)
}
