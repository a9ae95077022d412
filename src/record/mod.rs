//! Record Module
//!
//! Binary framing of a single key-value entry with corruption detection.
//!
//! ## Responsibilities
//! - Encode a key/value pair into the on-disk layout
//! - Decode a record at an offset, telling torn writes apart from bit rot
//! - CRC32C (Castagnoli) checksums over sizes, key and value
//!
//! ## Record Format (little-endian)
//! ```text
//! ┌─────────┬───────────────┬─────────────┬───────────────┬───────┬─────────┐
//! │ CRC (4) │ Timestamp (4) │ KeySize (4) │ ValueSize (4) │  Key  │  Value  │
//! └─────────┴───────────────┴─────────────┴───────────────┴───────┴─────────┘
//!   crc covers [KeySize | ValueSize | Key | Value], not the timestamp
//! ```
//!
//! A record with `ValueSize == 0` is a tombstone.

mod codec;

pub use codec::{
    decode, encode, encode_with_timestamp, encoded_len, now_timestamp, Record, RecordSource,
};

pub(crate) use codec::validate;

/// Fixed header size: crc (4) + timestamp (4) + key size (4) + value size (4)
pub const HEADER_SIZE: usize = 16;

/// Custom epoch for record timestamps: 2024-01-01T00:00:00Z, in unix seconds
pub const CUSTOM_EPOCH: u64 = 1_704_067_200;
