//! Record addressing

use super::SegmentId;

/// Address of a record inside the store
///
/// Always refers to a byte range that held a complete, CRC-valid record
/// at the time it was indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct LogPosition {
    /// Segment holding the record
    pub file_id: SegmentId,
    /// Byte offset of the record header within the segment
    pub value_pos: u64,
    /// Cached value length
    pub value_size: u32,
    /// Copy of the record timestamp
    pub timestamp: u32,
}

impl LogPosition {
    pub fn new(file_id: SegmentId, value_pos: u64, value_size: u32, timestamp: u32) -> Self {
        Self {
            file_id,
            value_pos,
            value_size,
            timestamp,
        }
    }
}
