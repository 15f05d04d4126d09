//! Storage backends for lexiq.
//!
//! [`VocabStore`] is the seam the cache talks to. [`MemoryVocabStore`] is
//! always available; the durable backend lives in [`persistent`] behind the
//! `persistent` feature.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::MemoryVocabStore;
pub use traits::{StorageError, VocabStore};

#[cfg(feature = "persistent")]
pub use persistent::{open_vocab_store, PersistentConfig, PersistentVocabStore};
