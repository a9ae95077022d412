//! Error types for kival
//!
//! Provides a unified error type for all operations. Variants are kept
//! distinct so recovery code can branch on "stop quietly" (partial write),
//! "abort loudly" (corruption) and "not an error at all" (key not found).

use thiserror::Error;

/// Result type alias using KivalError
pub type Result<T> = std::result::Result<T, KivalError>;

/// Unified error type for kival operations
#[derive(Debug, Error)]
pub enum KivalError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Value must not be empty (a zero-length value is a tombstone)")]
    EmptyValue,

    #[error("Record too large: {size} bytes exceeds limit of {limit} bytes")]
    RecordTooLarge { size: u64, limit: u64 },

    #[error("Partial write at offset {offset}")]
    PartialWrite { offset: u64 },

    #[error("Corrupt record at offset {offset}: stored crc {stored:#010x}, computed {computed:#010x}")]
    CorruptRecord {
        offset: u64,
        stored: u32,
        computed: u32,
    },

    // -------------------------------------------------------------------------
    // Segment Errors
    // -------------------------------------------------------------------------
    #[error("Segment {segment_id} is full")]
    CapacityExceeded { segment_id: u32 },

    #[error("Segment {0} is read-only")]
    ReadOnlySegment(u32),

    #[error("Segment {0} is closed")]
    SegmentClosed(u32),

    #[error("Segment {0} not found")]
    SegmentNotFound(u32),

    #[error("Sealed segment {segment_id} holds an incomplete record at offset {offset}")]
    DamagedSealedSegment { segment_id: u32, offset: u64 },

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Compaction Errors
    // -------------------------------------------------------------------------
    #[error("Compaction marker error: {0}")]
    Marker(String),

    #[error("Compaction recovery needs manual inspection: {0}")]
    CompactionRecovery(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KivalError {
    /// True for `KeyNotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, KivalError::KeyNotFound)
    }

    /// True for `PartialWrite` (torn tail, not enough bytes on disk)
    pub fn is_partial_write(&self) -> bool {
        matches!(self, KivalError::PartialWrite { .. })
    }

    /// True for on-disk damage: checksum mismatch or a cut-short sealed segment
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            KivalError::CorruptRecord { .. } | KivalError::DamagedSealedSegment { .. }
        )
    }
}
