//! Immutable snapshot files.
//!
//! A segment is a full snapshot of the catalog and every table at a WAL
//! sequence. Segments are numbered (`segment_00001.seg`, ...); only the newest
//! one is needed to load, older ones are pruned once a newer snapshot is
//! durable.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::catalog::Catalog;
use super::codec;

/// A finalized segment file.
#[derive(Debug)]
pub struct Segment {
    path: PathBuf,
    id: u32,
    /// Sequence range covered by this segment, inclusive.
    pub sequence_range: (u64, u64),
}

impl Segment {
    fn open(path: &Path, id: u32) -> IoResult<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        codec::read_header(&mut reader)?;
        let header: SegmentHeader = codec::decode(&mut reader)?;
        Ok(Self {
            path: path.to_path_buf(),
            id,
            sequence_range: (header.sequence_start, header.sequence_end),
        })
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot.
    pub fn read_all(&self) -> IoResult<SegmentData> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        codec::read_header(&mut reader)?;
        let _header: SegmentHeader = codec::decode(&mut reader)?;
        codec::decode(&mut reader)
    }
}

/// Segment file header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentHeader {
    /// First sequence number covered.
    pub sequence_start: u64,
    /// Last sequence number covered.
    pub sequence_end: u64,
    /// Documents in the snapshot.
    pub document_count: u64,
    /// When the segment was written.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Everything a segment stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentData {
    /// Schema at snapshot time.
    pub catalog: Catalog,
    /// Documents by collection, then by primary key.
    pub tables: BTreeMap<String, BTreeMap<String, Value>>,
}

impl SegmentData {
    /// Total documents across all tables.
    #[must_use]
    pub fn document_count(&self) -> u64 {
        self.tables.values().map(|t| t.len() as u64).sum()
    }
}

/// Writes a segment to a temp file, then renames it into place.
pub struct SegmentWriter {
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    id: u32,
    writer: Option<BufWriter<File>>,
    sequence_start: u64,
    sequence_end: u64,
}

impl SegmentWriter {
    fn new(final_path: PathBuf, id: u32, sequence_start: u64) -> IoResult<Self> {
        let temp_path = final_path.with_extension(format!("seg.{}.tmp", Uuid::new_v4()));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer)?;

        Ok(Self {
            temp_path: Some(temp_path),
            final_path,
            id,
            writer: Some(writer),
            sequence_start,
            sequence_end: sequence_start,
        })
    }

    /// Writes the header and snapshot. Call once.
    pub fn write_data(&mut self, data: &SegmentData, sequence_end: u64) -> IoResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| IoError::new(ErrorKind::Other, "segment writer already consumed"))?;
        self.sequence_end = sequence_end;

        let header = SegmentHeader {
            sequence_start: self.sequence_start,
            sequence_end,
            document_count: data.document_count(),
            created_at: Utc::now(),
        };
        writer.write_all(&codec::encode(&header)?)?;
        writer.write_all(&codec::encode(data)?)?;
        Ok(())
    }

    /// Flush, fsync, rename. After this returns the segment is durable.
    pub fn finalize(mut self) -> IoResult<Segment> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| IoError::new(ErrorKind::Other, "segment writer already consumed"))?;
        let temp_path = self
            .temp_path
            .take()
            .ok_or_else(|| IoError::new(ErrorKind::Other, "segment temp path already consumed"))?;

        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(&temp_path, &self.final_path)?;

        Ok(Segment {
            path: self.final_path.clone(),
            id: self.id,
            sequence_range: (self.sequence_start, self.sequence_end),
        })
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        // Unfinalized writers leave no temp file behind.
        self.writer.take();
        if let Some(path) = self.temp_path.take() {
            let _ = fs::remove_file(path);
        }
    }
}

/// Tracks the segment files of one database directory.
#[derive(Debug)]
pub struct SegmentManager {
    dir: PathBuf,
    segments: Vec<Segment>,
    next_segment_id: u32,
}

fn segment_id(path: &Path) -> Option<u32> {
    if path.extension().is_some_and(|e| e == "seg") {
        path.file_stem()?.to_str()?.strip_prefix("segment_")?.parse().ok()
    } else {
        None
    }
}

impl SegmentManager {
    /// Scans `dir` for segments, removing stale temp files.
    pub fn open(dir: &Path) -> IoResult<Self> {
        fs::create_dir_all(dir)?;

        let mut segments = Vec::new();
        let mut next_segment_id = 1u32;

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();

            if path.extension().is_some_and(|e| e == "tmp") {
                let _ = fs::remove_file(&path);
                continue;
            }

            if let Some(id) = segment_id(&path) {
                next_segment_id = next_segment_id.max(id + 1);
                match Segment::open(&path, id) {
                    Ok(seg) => segments.push(seg),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable segment"),
                }
            }
        }

        segments.sort_by_key(|s| s.id);

        Ok(Self {
            dir: dir.to_path_buf(),
            segments,
            next_segment_id,
        })
    }

    /// Segments, oldest first.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Last WAL sequence folded into the newest segment, or 0.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.segments.last().map_or(0, |s| s.sequence_range.1)
    }

    /// Starts writing the next segment.
    pub fn create_segment_writer(&mut self, sequence_start: u64) -> IoResult<SegmentWriter> {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        let path = self.dir.join(format!("segment_{id:05}.seg"));
        SegmentWriter::new(path, id, sequence_start)
    }

    /// Registers a finalized segment and deletes every older one.
    pub fn install(&mut self, segment: Segment) {
        let keep = segment.id;
        self.segments.push(segment);
        self.segments.retain(|s| {
            if s.id >= keep {
                return true;
            }
            match fs::remove_file(&s.path) {
                Ok(()) => debug!(path = %s.path.display(), "pruned segment"),
                Err(e) => warn!(path = %s.path.display(), error = %e, "failed to prune segment"),
            }
            false
        });
    }

    /// Loads the newest readable snapshot, or an empty one if there is none.
    pub fn load_latest(&self) -> IoResult<SegmentData> {
        self.segments
            .last()
            .map_or_else(|| Ok(SegmentData::default()), Segment::read_all)
    }
}
