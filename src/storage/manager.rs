//! Segment Set
//!
//! Owns every segment of a store directory and materializes it from disk.
//!
//! ## Responsibilities
//! - Discover existing segment files on startup
//! - Replay them oldest → newest into a fresh KeyDir
//! - Keep exactly one active segment; everything else is sealed
//! - Rotate to a new active segment when the engine asks
//! - Route reads to the segment owning a position

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{Config, SyncStrategy};
use crate::error::{KivalError, Result};
use crate::index::{build_index, KeyDir};
use crate::record::Record;

use super::{Log, LogPosition, Segment, SegmentId};

/// Collection of segments for one store directory
///
/// Sealed segments are keyed by id; the active segment always has the
/// highest id.
#[derive(Debug)]
pub struct SegmentSet {
    /// Directory holding the `<id>.data` files
    dir: PathBuf,

    /// Capacity applied to every segment opened by this set
    max_segment_size: u64,

    /// Sync policy of the active segment
    sync_strategy: SyncStrategy,

    /// The single writable segment
    active: Segment,

    /// Read-only segments, by id
    sealed: BTreeMap<SegmentId, Segment>,
}

impl SegmentSet {
    /// Open or create the segment set described by `config`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing segment files, sorted by id ascending
    /// 3. If none exist, create segment 1 as the active segment
    /// 4. Otherwise replay each into the KeyDir; the highest id becomes
    ///    active, all others are sealed
    pub fn open(config: &Config) -> Result<(Self, KeyDir)> {
        let dir = config.data_dir.as_path();
        fs::create_dir_all(dir)?;

        let ids = Self::list_segment_ids(dir)?;
        let mut keydir = KeyDir::new();

        let Some((&active_id, sealed_ids)) = ids.split_last() else {
            let active = Segment::open(1, dir, config.max_segment_size)?
                .with_sync_strategy(config.sync_strategy);
            info!(dir = %dir.display(), "created new store");
            return Ok((Self::new(config, active, BTreeMap::new()), keydir));
        };

        let mut sealed = BTreeMap::new();
        for &id in sealed_ids {
            let mut segment = Segment::open(id, dir, config.max_segment_size)?;
            segment.mark_read_only();
            let result = build_index(&mut segment, &mut keydir)?;
            debug!(segment = id, ?result, "replayed sealed segment");
            sealed.insert(id, segment);
        }

        // Highest id stays writable even if full; the next append will rotate
        let mut active = Segment::open(active_id, dir, config.max_segment_size)?
            .with_sync_strategy(config.sync_strategy);
        let result = build_index(&mut active, &mut keydir)?;
        debug!(segment = active_id, ?result, "replayed active segment");

        Ok((Self::new(config, active, sealed), keydir))
    }

    fn new(config: &Config, active: Segment, sealed: BTreeMap<SegmentId, Segment>) -> Self {
        Self {
            dir: config.data_dir.clone(),
            max_segment_size: config.max_segment_size,
            sync_strategy: config.sync_strategy,
            active,
            sealed,
        }
    }

    /// Seal the active segment and start a new one with the next id
    ///
    /// Returns the id of the new active segment.
    pub fn rotate(&mut self) -> Result<SegmentId> {
        let old_id = self.active.id();
        let new_id = old_id
            .checked_add(1)
            .ok_or(KivalError::CapacityExceeded { segment_id: old_id })?;

        // The old segment is durable before a higher id exists on disk
        self.active.sync()?;

        let next = Segment::open(new_id, &self.dir, self.max_segment_size)?
            .with_sync_strategy(self.sync_strategy);

        let mut old = std::mem::replace(&mut self.active, next);
        old.mark_read_only();
        self.sealed.insert(old_id, old);

        info!(sealed = old_id, active = new_id, "rotated segment");
        Ok(new_id)
    }

    /// Segment owning `id`: sealed first, then the active one
    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.sealed
            .get(&id)
            .or_else(|| (self.active.id() == id).then_some(&self.active))
    }

    /// Read the value at `pos`
    pub fn read_value(&self, pos: &LogPosition) -> Result<Vec<u8>> {
        self.segment_for(pos)?.read_at(pos)
    }

    /// Read the full record at `pos`
    pub fn read_record(&self, pos: &LogPosition) -> Result<Record> {
        self.segment_for(pos)?.read_record(pos)
    }

    pub fn active(&self) -> &Segment {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut Segment {
        &mut self.active
    }

    pub fn active_id(&self) -> SegmentId {
        self.active.id()
    }

    /// Ids of the sealed segments, ascending
    pub fn sealed_ids(&self) -> Vec<SegmentId> {
        self.sealed.keys().copied().collect()
    }

    /// Every segment id, ascending (active last)
    pub fn all_ids(&self) -> Vec<SegmentId> {
        let mut ids = self.sealed_ids();
        ids.push(self.active.id());
        ids
    }

    /// Number of segments, active included
    pub fn segment_count(&self) -> usize {
        self.sealed.len() + 1
    }

    /// Sum of all segment sizes in bytes
    pub fn total_size(&self) -> u64 {
        self.sealed.values().map(|s| s.size()).sum::<u64>() + self.active.size()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Close every segment, reporting the first failure
    pub fn close_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for segment in self.sealed.values_mut() {
            if let Err(e) = segment.close() {
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.active.close() {
            first_err.get_or_insert(e);
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Drop every known segment and continue with `active` alone
    pub(crate) fn replace_with(&mut self, active: Segment) {
        self.sealed.clear();
        self.active = active.with_sync_strategy(self.sync_strategy);
    }

    // =========================================================================
    // Path Helpers
    // =========================================================================

    /// Ids of all segment files in `dir`, ascending
    pub fn list_segment_ids(dir: &Path) -> Result<Vec<SegmentId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = Self::parse_segment_id(&path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Path of segment `id` inside `dir`
    pub fn segment_path(dir: &Path, id: SegmentId) -> PathBuf {
        dir.join(Segment::file_name(id))
    }

    /// Parse a segment id from a file name
    /// "42.data" → Some(42), "compact.tmp" → None
    pub fn parse_segment_id(path: &Path) -> Option<SegmentId> {
        if path.extension()? != "data" {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }

    fn segment_for(&self, pos: &LogPosition) -> Result<&Segment> {
        self.get(pos.file_id)
            .ok_or(KivalError::SegmentNotFound(pos.file_id))
    }
}

/// Fsync a directory so created, renamed and removed entries are durable
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

/// Directory fsync is not available on this platform
#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
