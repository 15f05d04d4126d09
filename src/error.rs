//! Error types for lexiq.
//!
//! All errors are strongly typed using thiserror. Storage failures live in
//! [`crate::storage::StorageError`]; this module layers input validation and
//! cache-level failures on top of them.

use thiserror::Error;

use crate::item::ItemId;
use crate::storage::StorageError;

/// Validation errors that occur before any I/O is attempted.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Item text cannot be empty")]
    EmptyText,

    #[error("Owner id cannot be empty")]
    EmptyOwner,

    #[error("Owner mismatch: cache is scoped to '{expected}', got '{actual}'")]
    OwnerMismatch {
        expected: String,
        actual: String,
    },

    #[error("Page size must be greater than zero")]
    InvalidPageSize,

    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

/// Top-level error type for lexiq.
#[derive(Debug, Error)]
pub enum LexiqError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache is not initialized")]
    NotInitialized,

    #[error("Cache has been disposed")]
    Disposed,

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl LexiqError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if the host must restart its session (foreign schema upgrade).
    #[must_use]
    pub const fn requires_reset(&self) -> bool {
        matches!(self, Self::Storage(StorageError::SchemaVersionConflict { .. }))
    }
}

/// Result type alias for lexiq operations.
pub type LexiqResult<T> = Result<T, LexiqError>;
