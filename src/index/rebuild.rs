//! KeyDir rebuild
//!
//! Replays a segment into a KeyDir at startup.

use tracing::warn;

use crate::error::{KivalError, Result};
use crate::storage::{Log, LogPosition, Segment};

use super::KeyDir;

/// Result of replaying one segment
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RebuildResult {
    /// Live records written into the KeyDir
    pub records_applied: u64,

    /// Tombstones that removed a key (or found it already absent)
    pub tombstones_applied: u64,

    /// Offset just past the last valid record
    pub end_offset: u64,

    /// Whether a torn tail was cut off
    pub was_truncated: bool,
}

/// Replay `segment` from offset 0 into `keydir`
///
/// Later records always win, so calling this on segments in ascending id
/// order reproduces the final state of every key.
///
/// - tombstone → remove the key
/// - live record → overwrite the key's position
/// - `PartialWrite` → stop; the torn tail is truncated away
/// - `CorruptRecord` (or any other error) → abort the rebuild
///
/// Only a writable segment can end in a torn append. A read-only segment
/// was synced when it was sealed, so an incomplete record there is damage:
/// the rebuild fails with `DamagedSealedSegment` and the file is left as is.
///
/// The segment's cursor ends up at `end_offset`.
pub fn build_index(segment: &mut Segment, keydir: &mut KeyDir) -> Result<RebuildResult> {
    let file_len = segment.file_len()?;
    let mut result = RebuildResult::default();
    let mut offset = 0u64;

    while offset < file_len {
        match segment.decode_at(offset) {
            Ok((record, next)) => {
                if record.is_tombstone() {
                    keydir.remove(&record.key);
                    result.tombstones_applied += 1;
                } else {
                    let pos = LogPosition::new(
                        segment.id(),
                        offset,
                        record.value_size()?,
                        record.timestamp,
                    );
                    keydir.insert(record.key, pos);
                    result.records_applied += 1;
                }
                offset = next;
            }
            Err(KivalError::PartialWrite { .. }) => break,
            Err(e) => return Err(e),
        }
    }

    result.end_offset = offset;
    if offset < file_len {
        if segment.is_read_only() {
            return Err(KivalError::DamagedSealedSegment {
                segment_id: segment.id(),
                offset,
            });
        }

        warn!(
            segment = segment.id(),
            valid_bytes = offset,
            torn_bytes = file_len - offset,
            "truncating torn tail"
        );
        segment.truncate(offset)?;
        result.was_truncated = true;
    }

    Ok(result)
}
