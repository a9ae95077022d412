//! Engine Module
//!
//! The key-value store that coordinates all components.
//!
//! ## Responsibilities
//! - Resolve interrupted compactions, then replay segments on startup
//! - Route puts and deletes to the active segment, rotating when it fills
//! - Keep the keydir pointing at the latest live record of every key
//! - Serve reads from whichever segment owns a position
//! - Run compaction with exclusive access

use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::compaction::{self, CompactionStats, Compactor, RecoveryOutcome};
use crate::config::Config;
use crate::error::{KivalError, Result};
use crate::index::KeyDir;
use crate::record;
use crate::storage::{Log, LogPosition, SegmentId, SegmentSet};

/// Point-in-time view of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Keys currently visible to `get`
    pub live_keys: usize,
    /// Segments on disk, active included
    pub segment_count: usize,
    /// Segment receiving appends
    pub active_segment_id: SegmentId,
    /// Bytes across all segments, dead records included
    pub total_bytes: u64,
}

/// Mutable state guarded by the engine lock
struct EngineState {
    segments: SegmentSet,
    keydir: KeyDir,
}

impl EngineState {
    /// Append to the active segment, rotating once if it is full
    fn append(&mut self, key: &[u8], value: &[u8]) -> Result<LogPosition> {
        match self.segments.active_mut().append(key, value) {
            Err(KivalError::CapacityExceeded { segment_id }) => {
                let new_id = self.segments.rotate()?;
                debug!(full = segment_id, retry_on = new_id, "retrying append after rotation");
                self.segments.active_mut().append(key, value)
            }
            other => other,
        }
    }
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Reads** (get/keys/stats): shared lock, run concurrently; segment
///   reads are positioned so readers never fight over a file cursor
/// - **Writes** (put/delete/sync): exclusive lock
/// - **Compaction**: exclusive lock for its entire duration, so no reader
///   ever sees a half-migrated keydir or a segment mid-rename
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Segments and keydir, always locked together
    state: RwLock<EngineState>,
}

impl Engine {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Validate config, create the data directory
    /// 2. Resolve any interrupted compaction
    /// 3. Discover segments and rebuild the keydir
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let outcome = compaction::recover(&config.data_dir)?;
        if outcome != RecoveryOutcome::Clean {
            info!(?outcome, "compaction recovery");
        }

        let (segments, keydir) = SegmentSet::open(&config)?;
        info!(
            dir = %config.data_dir.display(),
            segments = segments.segment_count(),
            active = segments.active_id(),
            live_keys = keydir.len(),
            "store opened"
        );

        Ok(Self {
            config,
            state: RwLock::new(EngineState { segments, keydir }),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().data_dir(path.as_ref()).build())
    }

    /// Store `value` under `key`
    ///
    /// A full active segment is rotated transparently; `CapacityExceeded`
    /// never reaches the caller.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(KivalError::EmptyKey);
        }
        if value.is_empty() {
            return Err(KivalError::EmptyValue);
        }
        self.check_fits(key, value)?;

        let mut state = self.state.write();
        let pos = state.append(key, value)?;
        state.keydir.insert(key.to_vec(), pos);
        Ok(())
    }

    /// Get the value stored under `key`
    ///
    /// Corruption discovered at read time is returned as-is.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let state = self.state.read();
        let pos = state.keydir.get(key).ok_or(KivalError::KeyNotFound)?;
        state.segments.read_value(pos)
    }

    /// Delete `key`
    ///
    /// The tombstone is durable before the key leaves the keydir, so a
    /// rebuild after a crash reaches the same decision.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        if !state.keydir.contains_key(key) {
            return Err(KivalError::KeyNotFound);
        }
        self.check_fits(key, &[])?;

        state.append(key, &[])?;
        state.keydir.remove(key);
        Ok(())
    }

    /// Merge all segments into one, dropping dead records
    pub fn compact(&self) -> Result<CompactionStats> {
        let mut state = self.state.write();
        let EngineState { segments, keydir } = &mut *state;
        Compactor::new(&self.config).run(segments, keydir)
    }

    /// Force pending appends to disk (only matters with batched sync)
    pub fn sync(&self) -> Result<()> {
        self.state.write().segments.active_mut().sync()
    }

    /// Close the engine gracefully, syncing and releasing every segment
    pub fn close(self) -> Result<()> {
        let mut state = self.state.into_inner();
        state.segments.close_all()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Whether `key` is live
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.state.read().keydir.contains_key(key)
    }

    /// Snapshot of every live key, unordered
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.state.read().keydir.keys()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.state.read().keydir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current store statistics
    pub fn stats(&self) -> EngineStats {
        let state = self.state.read();
        EngineStats {
            live_keys: state.keydir.len(),
            segment_count: state.segments.segment_count(),
            active_segment_id: state.segments.active_id(),
            total_bytes: state.segments.total_size(),
        }
    }

    /// Number of segments, active included
    pub fn segment_count(&self) -> usize {
        self.state.read().segments.segment_count()
    }

    /// Id of the segment receiving appends
    pub fn active_segment_id(&self) -> SegmentId {
        self.state.read().segments.active_id()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Reject records no segment could ever hold
    fn check_fits(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let size = record::encoded_len(key.len(), value.len());
        if size > self.config.max_segment_size {
            return Err(KivalError::RecordTooLarge {
                size,
                limit: self.config.max_segment_size,
            });
        }
        Ok(())
    }
}
