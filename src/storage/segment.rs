//! Segment
//!
//! One append-only `<id>.data` file: owns its append cursor, its
//! read-only flag and its file handle.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncStrategy;
use crate::error::{KivalError, Result};
use crate::record::{self, Record};

use super::{LogPosition, SegmentId};

/// Capability set every segment-like log exposes to the engine
pub trait Log {
    /// Segment id
    fn id(&self) -> SegmentId;

    /// Append a key/value pair; an empty value appends a tombstone
    fn append(&mut self, key: &[u8], value: &[u8]) -> Result<LogPosition>;

    /// Read the value stored at `pos`
    fn read_at(&self, pos: &LogPosition) -> Result<Vec<u8>>;

    /// Bytes up to the append cursor
    fn size(&self) -> u64;

    /// Seal: later appends fail, reads keep working
    fn mark_read_only(&mut self);

    /// Release the file handle; idempotent
    fn close(&mut self) -> Result<()>;
}

/// An append-only segment file
///
/// ## Lifecycle
/// - `open` creates or reopens the file with the cursor at its end
/// - appends advance the cursor until the next record would exceed `max_size`
/// - `mark_read_only` seals it once the engine rotates past it
/// - `close` drops the handle; compaction deletes the file afterwards
pub struct Segment {
    id: SegmentId,
    path: PathBuf,
    /// `None` once closed
    file: Option<File>,
    /// Where the next append lands
    write_pos: u64,
    max_size: u64,
    read_only: bool,
    sync_strategy: SyncStrategy,
    /// Appends written since the last fsync
    unsynced: usize,
}

impl Segment {
    /// Open or create `<dir>/<id>.data`
    ///
    /// Creates `dir` if needed and positions the cursor at the end of the
    /// existing data.
    pub fn open(id: SegmentId, dir: &Path, max_size: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Self::open_at(id, &dir.join(Self::file_name(id)), max_size)
    }

    /// Open or create a segment at an explicit path
    ///
    /// Compaction uses this to build its output under a temporary name
    /// while already addressing records with the final id.
    pub fn open_at(id: SegmentId, path: &Path, max_size: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        // Always append at the end
        let write_pos = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file: Some(file),
            write_pos,
            max_size,
            read_only: false,
            sync_strategy: SyncStrategy::EveryWrite,
            unsynced: 0,
        })
    }

    /// Replace the default every-write sync policy
    pub fn with_sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.sync_strategy = strategy;
        self
    }

    /// File name for a segment id: "7" → "7.data"
    pub fn file_name(id: SegmentId) -> String {
        format!("{}.data", id)
    }

    /// Append a pre-built record, keeping its timestamp
    pub fn append_record(&mut self, record: &Record) -> Result<LogPosition> {
        self.write_entry(&record.key, &record.value, record.timestamp)
    }

    /// Decode the full record stored at `pos`
    pub fn read_record(&self, pos: &LogPosition) -> Result<Record> {
        self.decode_at(pos.value_pos).map(|(record, _)| record)
    }

    /// Force buffered appends to disk
    pub fn sync(&mut self) -> Result<()> {
        if self.unsynced == 0 {
            return Ok(());
        }
        let file = self.file.as_ref().ok_or(KivalError::SegmentClosed(self.id))?;
        file.sync_all()?;
        self.unsynced = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Bytes still available before the segment is full
    pub fn remaining(&self) -> u64 {
        self.max_size.saturating_sub(self.write_pos)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    // =========================================================================
    // Crate-internal helpers (rebuild)
    // =========================================================================

    /// Decode the record at `offset`, returning it and the next offset
    pub(crate) fn decode_at(&self, offset: u64) -> Result<(Record, u64)> {
        let file = self.file.as_ref().ok_or(KivalError::SegmentClosed(self.id))?;
        record::decode(file, offset)
    }

    /// Physical length of the file (may exceed the cursor before rebuild)
    pub(crate) fn file_len(&self) -> Result<u64> {
        let file = self.file.as_ref().ok_or(KivalError::SegmentClosed(self.id))?;
        Ok(file.metadata()?.len())
    }

    /// Cut the file at `len` and resume appending there
    pub(crate) fn truncate(&mut self, len: u64) -> Result<()> {
        let file = self.file.as_ref().ok_or(KivalError::SegmentClosed(self.id))?;
        file.set_len(len)?;
        file.sync_all()?;
        self.write_pos = len;
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write_entry(&mut self, key: &[u8], value: &[u8], timestamp: u32) -> Result<LogPosition> {
        if self.file.is_none() {
            return Err(KivalError::SegmentClosed(self.id));
        }
        if self.read_only {
            return Err(KivalError::ReadOnlySegment(self.id));
        }
        record::validate(key, value)?;

        // Capacity check happens before any byte is written
        let record_len = record::encoded_len(key.len(), value.len());
        if self.write_pos.saturating_add(record_len) > self.max_size {
            return Err(KivalError::CapacityExceeded {
                segment_id: self.id,
            });
        }

        let buf = record::encode_with_timestamp(key, value, timestamp)?;
        let start = self.write_pos;

        let file = self.file.as_mut().ok_or(KivalError::SegmentClosed(self.id))?;
        file.seek(SeekFrom::Start(start))?;
        file.write_all(&buf)?;

        self.write_pos = start + buf.len() as u64;
        self.unsynced += 1;
        self.maybe_sync()?;

        Ok(LogPosition::new(
            self.id,
            start,
            value.len() as u32,
            timestamp,
        ))
    }

    fn maybe_sync(&mut self) -> Result<()> {
        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }
}

impl Log for Segment {
    fn id(&self) -> SegmentId {
        self.id
    }

    fn append(&mut self, key: &[u8], value: &[u8]) -> Result<LogPosition> {
        self.write_entry(key, value, record::now_timestamp())
    }

    fn read_at(&self, pos: &LogPosition) -> Result<Vec<u8>> {
        self.read_record(pos).map(|record| record.value)
    }

    fn size(&self) -> u64 {
        self.write_pos
    }

    fn mark_read_only(&mut self) {
        self.read_only = true;
    }

    fn close(&mut self) -> Result<()> {
        // Handle is released even if the final sync fails
        if let Some(file) = self.file.take() {
            if self.unsynced > 0 {
                self.unsynced = 0;
                file.sync_all()?;
            }
        }
        Ok(())
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if self.unsynced > 0 {
            if let Some(file) = &self.file {
                let _ = file.sync_all();
            }
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("write_pos", &self.write_pos)
            .field("max_size", &self.max_size)
            .field("read_only", &self.read_only)
            .field("closed", &self.file.is_none())
            .finish()
    }
}
