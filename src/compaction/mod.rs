//! Compaction Module
//!
//! Rewrites every live record into one fresh segment and retires the old
//! segments, with a marker file making the swap crash-recoverable.
//!
//! ## Phases
//! ```text
//!  begin        snapshot keydir, write COMPACTING (uncommitted)
//!    │
//!  write_live   copy each live record into compact.tmp
//!    │
//!  commit       fsync compact.tmp, rewrite COMPACTING with its size
//!    │          ── durability point: from here recovery rolls forward ──
//!  install      close + delete old segments, rename compact.tmp → 1.data,
//!               delete COMPACTING, swap keydir
//! ```
//!
//! The keydir is the only input: segments are never content-scanned, so
//! cost is proportional to the number of live keys. Original segments are
//! only deleted after the output is committed.

mod marker;
mod recovery;

pub use marker::CompactionMarker;
pub use recovery::{recover, RecoveryOutcome};

use std::fs;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::config::{Config, SyncStrategy};
use crate::error::Result;
use crate::index::KeyDir;
use crate::storage::{sync_dir, Log, LogPosition, Segment, SegmentId, SegmentSet};

use recovery::remove_if_exists;

/// Marker file name
pub const MARKER_FILE: &str = "COMPACTING";

/// Scratch name used while rewriting the marker
pub const MARKER_TEMP_FILE: &str = "COMPACTING.tmp";

/// Compaction output before install
pub const COMPACT_TEMP_FILE: &str = "compact.tmp";

/// Id the compacted segment is installed under
pub const COMPACTED_SEGMENT_ID: SegmentId = 1;

/// Summary of a finished compaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Segments deleted by the compaction
    pub segments_retired: usize,
    /// Records copied into the new segment
    pub live_keys: usize,
    /// Total segment bytes before
    pub bytes_before: u64,
    /// Size of the compacted segment
    pub bytes_after: u64,
    /// `bytes_before - bytes_after`
    pub bytes_reclaimed: u64,
}

/// An in-progress compaction between `begin` and `install`
///
/// Dropping a job before `install` leaves exactly the on-disk state a crash
/// at that point would, which the next open resolves.
#[derive(Debug)]
pub struct CompactionJob {
    marker: CompactionMarker,
    snapshot: Vec<(Vec<u8>, LogPosition)>,
    output: Segment,
    keydir: KeyDir,
    bytes_before: u64,
}

impl CompactionJob {
    pub fn marker(&self) -> &CompactionMarker {
        &self.marker
    }

    /// Live keys captured at `begin`
    pub fn live_keys(&self) -> usize {
        self.snapshot.len()
    }
}

/// Drives the compaction phases for one store directory
#[derive(Debug, Clone)]
pub struct Compactor {
    dir: PathBuf,
    max_segment_size: u64,
}

impl Compactor {
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.data_dir.clone(),
            max_segment_size: config.max_segment_size,
        }
    }

    /// Run every phase; the caller must hold exclusive access
    ///
    /// On failure before `commit` the store keeps working on its original
    /// segments and the marker stays behind for the next open to roll back.
    /// From `commit` on, a failure closes the segments and the store must be
    /// reopened.
    pub fn run(&self, segments: &mut SegmentSet, keydir: &mut KeyDir) -> Result<CompactionStats> {
        let mut job = self.begin(segments, keydir)?;
        self.write_live(&mut job, segments)?;
        self.commit(&mut job, segments)?;
        self.install(job, segments, keydir)
    }

    /// Snapshot the keydir and write the uncommitted marker
    pub fn begin(&self, segments: &SegmentSet, keydir: &KeyDir) -> Result<CompactionJob> {
        let output_path = self.dir.join(COMPACT_TEMP_FILE);
        remove_if_exists(&output_path)?;

        let marker = CompactionMarker::new(segments.all_ids(), COMPACT_TEMP_FILE);
        marker.store(&self.dir)?;

        info!(
            retiring = ?marker.retiring_segment_ids,
            live_keys = keydir.len(),
            "compaction started"
        );

        // No capacity limit: the output holds all live data, however large
        let output = Segment::open_at(COMPACTED_SEGMENT_ID, &output_path, u64::MAX)?
            .with_sync_strategy(SyncStrategy::EveryNWrites { count: usize::MAX });

        Ok(CompactionJob {
            marker,
            snapshot: keydir.snapshot(),
            output,
            keydir: KeyDir::new(),
            bytes_before: segments.total_size(),
        })
    }

    /// Copy every live record into the output, keeping timestamps
    pub fn write_live(&self, job: &mut CompactionJob, segments: &SegmentSet) -> Result<()> {
        for (key, pos) in job.snapshot.drain(..) {
            let record = segments.read_record(&pos)?;
            let new_pos = job.output.append_record(&record)?;
            job.keydir.insert(key, new_pos);
        }
        Ok(())
    }

    /// Make the output durable and record its size in the marker
    ///
    /// A failure here may still leave the committed marker on disk, and
    /// the next open would then retire every current segment. The segments
    /// are closed on failure so no write can land in them before that open.
    pub fn commit(&self, job: &mut CompactionJob, segments: &mut SegmentSet) -> Result<()> {
        let committed = job.output.sync().and_then(|()| {
            job.marker.compacted_size = Some(job.output.size());
            job.marker.store(&self.dir)
        });

        if let Err(e) = committed {
            error!(error = %e, "compaction commit failed, closing segments until reopen");
            if let Err(close_err) = segments.close_all() {
                warn!(error = %close_err, "closing segments after failed commit");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Swap the compacted segment in for every retiring segment
    pub fn install(
        &self,
        mut job: CompactionJob,
        segments: &mut SegmentSet,
        keydir: &mut KeyDir,
    ) -> Result<CompactionStats> {
        let bytes_after = job.output.size();
        job.output.close()?;
        segments.close_all()?;

        for &id in &job.marker.retiring_segment_ids {
            remove_if_exists(&SegmentSet::segment_path(&self.dir, id))?;
        }

        let target = SegmentSet::segment_path(&self.dir, COMPACTED_SEGMENT_ID);
        fs::rename(self.dir.join(COMPACT_TEMP_FILE), &target)?;
        sync_dir(&self.dir)?;
        CompactionMarker::remove(&self.dir)?;

        let active = Segment::open(COMPACTED_SEGMENT_ID, &self.dir, self.max_segment_size)?;
        segments.replace_with(active);

        let live_keys = job.keydir.len();
        *keydir = job.keydir;

        let stats = CompactionStats {
            segments_retired: job.marker.retiring_segment_ids.len(),
            live_keys,
            bytes_before: job.bytes_before,
            bytes_after,
            bytes_reclaimed: job.bytes_before.saturating_sub(bytes_after),
        };
        info!(?stats, "compaction finished");
        Ok(stats)
    }
}
