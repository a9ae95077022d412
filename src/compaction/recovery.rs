//! Compaction recovery
//!
//! Runs once at open, before segment discovery, and resolves whatever a
//! crash left behind. Never touched by put/get/delete.
//!
//! | marker            | output file          | action                        |
//! |-------------------|----------------------|-------------------------------|
//! | absent            | absent               | nothing                       |
//! | absent            | present              | delete stray output           |
//! | not committed     | any                  | delete output, delete marker  |
//! | committed         | present, right size  | finish install                |
//! | committed         | already renamed      | delete leftovers              |
//! | committed         | wrong size / missing | hard error, touch nothing     |

use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{KivalError, Result};
use crate::storage::{sync_dir, SegmentSet};

use super::{CompactionMarker, COMPACTED_SEGMENT_ID, COMPACT_TEMP_FILE, MARKER_TEMP_FILE};

/// What recovery found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No compaction state on disk
    Clean,

    /// Output or marker temp files without a marker were removed
    DiscardedStrayTemp,

    /// An uncommitted compaction was discarded; original segments kept
    RolledBack,

    /// A committed compaction was installed
    Completed,
}

/// Resolve leftover compaction state in `dir`
pub fn recover(dir: &Path) -> Result<RecoveryOutcome> {
    let marker_temp_removed = remove_if_exists(&dir.join(MARKER_TEMP_FILE))?;

    let outcome = match CompactionMarker::load(dir)? {
        None => {
            let output_removed = remove_if_exists(&dir.join(COMPACT_TEMP_FILE))?;
            if output_removed || marker_temp_removed {
                warn!(dir = %dir.display(), "removed stray compaction files");
                sync_dir(dir)?;
                RecoveryOutcome::DiscardedStrayTemp
            } else {
                RecoveryOutcome::Clean
            }
        }
        Some(marker) => match marker.compacted_size {
            None => {
                remove_if_exists(&dir.join(&marker.compacted_file_name))?;
                CompactionMarker::remove(dir)?;
                info!(
                    retiring = ?marker.retiring_segment_ids,
                    "rolled back interrupted compaction"
                );
                RecoveryOutcome::RolledBack
            }
            Some(expected) => {
                finish_install(dir, &marker, expected)?;
                info!(
                    retiring = ?marker.retiring_segment_ids,
                    compacted_size = expected,
                    "completed interrupted compaction"
                );
                RecoveryOutcome::Completed
            }
        },
    };

    Ok(outcome)
}

/// Roll a committed compaction forward
fn finish_install(dir: &Path, marker: &CompactionMarker, expected: u64) -> Result<()> {
    let output = dir.join(&marker.compacted_file_name);
    let target = SegmentSet::segment_path(dir, COMPACTED_SEGMENT_ID);

    match file_len(&output)? {
        Some(actual) if actual == expected => {
            for &id in &marker.retiring_segment_ids {
                remove_if_exists(&SegmentSet::segment_path(dir, id))?;
            }
            fs::rename(&output, &target)?;
        }
        Some(actual) => {
            return Err(KivalError::CompactionRecovery(format!(
                "{} is {} bytes, marker expects {}",
                output.display(),
                actual,
                expected
            )));
        }
        None => {
            // Output already renamed; every other retiring file went first
            match file_len(&target)? {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(KivalError::CompactionRecovery(format!(
                        "{} is {} bytes, marker expects {}",
                        target.display(),
                        actual,
                        expected
                    )));
                }
                None => {
                    return Err(KivalError::CompactionRecovery(format!(
                        "neither {} nor {} exists",
                        output.display(),
                        target.display()
                    )));
                }
            }
            for &id in &marker.retiring_segment_ids {
                if id != COMPACTED_SEGMENT_ID {
                    remove_if_exists(&SegmentSet::segment_path(dir, id))?;
                }
            }
        }
    }

    sync_dir(dir)?;
    CompactionMarker::remove(dir)
}

fn file_len(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove `path`, reporting whether it existed
pub(super) fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
