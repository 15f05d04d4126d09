//! Write-ahead log.
//!
//! Every commit is appended (and optionally fsynced) as one frame before it
//! touches the in-memory tables. On open the log is replayed on top of the
//! latest segment snapshot.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec frame]
//! [ENTRY 2: codec frame]
//! ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::catalog::Catalog;
use super::codec;

/// A single document mutation inside a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum WalOp {
    /// Insert or replace.
    Put {
        #[allow(missing_docs)]
        collection: String,
        #[allow(missing_docs)]
        key: String,
        #[allow(missing_docs)]
        doc: Value,
    },
    #[allow(missing_docs)]
    Delete { collection: String, key: String },
}

impl WalOp {
    /// Collection this op touches.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Put { collection, .. } | Self::Delete { collection, .. } => collection,
        }
    }
}

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// What was logged.
    pub kind: WalEntryKind,
}

/// The type of WAL entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntryKind {
    /// One atomic transaction.
    Commit {
        #[allow(missing_docs)]
        ops: Vec<WalOp>,
    },
    /// Full catalog after a schema change.
    Catalog(Catalog),
    /// Everything up to this sequence is in a segment.
    Checkpoint {
        #[allow(missing_docs)]
        up_to_sequence: u64,
    },
}

struct WalWriter {
    // `None` only while the file is being truncated.
    file: Option<BufWriter<File>>,
    sequence: u64,
}

/// Append-only log. Thread-safe via an internal mutex.
pub struct WriteAheadLog {
    path: PathBuf,
    inner: Mutex<WalWriter>,
    sync_on_write: bool,
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.path)
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

fn poisoned() -> IoError {
    IoError::new(ErrorKind::Other, "poisoned lock: wal")
}

impl WriteAheadLog {
    /// Opens or creates a WAL file, recovering the last valid sequence number.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<Self> {
        let has_header = path.exists() && std::fs::metadata(path)?.len() >= 5;

        let sequence = if has_header {
            let (sequence, valid_len) = Self::scan(path)?;
            let len = std::fs::metadata(path)?.len();
            if valid_len < len {
                warn!(path = %path.display(), dropped_bytes = len - valid_len, "truncating torn wal tail");
                OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
            }
            sequence
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            codec::write_header(&mut file)?;
            if sync_on_write {
                file.sync_all()?;
            }
            0
        };

        let file = OpenOptions::new().append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(WalWriter {
                file: Some(BufWriter::new(file)),
                sequence,
            }),
            sync_on_write,
        })
    }

    fn lock(&self) -> IoResult<MutexGuard<'_, WalWriter>> {
        self.inner.lock().map_err(|_| poisoned())
    }

    /// Appends an entry and returns its sequence number.
    ///
    /// The sequence only advances once the frame is written (and synced if
    /// configured), so a failed append leaves no logical trace.
    pub fn append(&self, kind: WalEntryKind) -> IoResult<u64> {
        let mut inner = self.lock()?;
        let candidate = inner.sequence + 1;
        let encoded = codec::encode(&WalEntry {
            sequence: candidate,
            timestamp: Utc::now(),
            kind,
        })?;

        let writer = inner
            .file
            .as_mut()
            .ok_or_else(|| IoError::new(ErrorKind::Other, "wal writer unavailable"))?;
        writer.write_all(&encoded)?;
        writer.flush()?;
        if self.sync_on_write {
            writer.get_ref().sync_all()?;
        }

        inner.sequence = candidate;
        Ok(candidate)
    }

    /// Iterates over all entries, oldest first.
    pub fn iter(&self) -> IoResult<WalIterator> {
        WalIterator::new(&self.path)
    }

    /// Last assigned sequence number.
    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.lock()?.sequence)
    }

    /// Sequence of the oldest entry still in the log, if any.
    pub fn first_sequence(&self) -> IoResult<Option<u64>> {
        let _inner = self.lock()?;
        WalIterator::new(&self.path)?.next().transpose().map(|e| e.map(|e| e.sequence))
    }

    /// Raises the sequence so new entries number after `floor`.
    pub fn advance_to(&self, floor: u64) -> IoResult<()> {
        let mut inner = self.lock()?;
        inner.sequence = inner.sequence.max(floor);
        Ok(())
    }

    /// WAL file size in bytes.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Drops every entry and rewrites the header. Numbering continues from
    /// the last assigned sequence.
    ///
    /// Only call this once a segment covering the log is durable.
    pub fn truncate(&self) -> IoResult<()> {
        let mut inner = self.lock()?;
        if let Some(mut old) = inner.file.take() {
            old.flush()?;
        }

        let mut file = OpenOptions::new().write(true).truncate(true).open(&self.path)?;
        codec::write_header(&mut file)?;
        if self.sync_on_write {
            file.sync_all()?;
        }
        drop(file);

        inner.file = Some(BufWriter::new(OpenOptions::new().append(true).open(&self.path)?));
        Ok(())
    }

    /// Last valid sequence and the byte length of the valid prefix.
    fn scan(path: &Path) -> IoResult<(u64, u64)> {
        let mut iter = WalIterator::new(path)?;
        let mut last_seq = 0;
        let mut valid_len = iter.reader.stream_position()?;
        while let Some(entry) = iter.next() {
            match entry {
                Ok(entry) => {
                    last_seq = entry.sequence;
                    valid_len = iter.reader.stream_position()?;
                }
                Err(e) => {
                    warn!(sequence = last_seq + 1, error = %e, "wal corruption detected");
                    break;
                }
            }
        }
        Ok((last_seq, valid_len))
    }
}

/// Iterator over WAL entries. A torn final frame ends iteration cleanly.
pub struct WalIterator {
    reader: BufReader<File>,
    file_size: u64,
}

impl WalIterator {
    fn new(path: &Path) -> IoResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;
        Ok(Self { reader, file_size })
    }
}

impl Iterator for WalIterator {
    type Item = IoResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.stream_position() {
            Ok(pos) if pos >= self.file_size => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(e)),
        }

        match codec::decode(&mut self.reader) {
            Ok(entry) => Some(Ok(entry)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }
}
