//! Record codec
//!
//! Encoding and decoding of single records, plus the positioned-read
//! abstraction decode runs against.

use std::fs::File;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc_fast::{CrcAlgorithm, Digest};

use crate::error::{KivalError, Result};

use super::{CUSTOM_EPOCH, HEADER_SIZE};

/// CRC32C / iSCSI / Castagnoli
const ALGORITHM: CrcAlgorithm = CrcAlgorithm::Crc32Iscsi;

// =============================================================================
// Record
// =============================================================================

/// A decoded (or about to be encoded) key-value entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Checksum over key size, value size, key and value
    pub crc: u32,
    /// Seconds since `CUSTOM_EPOCH`
    pub timestamp: u32,
    pub key: Vec<u8>,
    /// Empty for tombstones
    pub value: Vec<u8>,
}

impl Record {
    /// Build a record stamped with the current time
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::with_timestamp(key, value, now_timestamp())
    }

    /// Build a record with an explicit timestamp
    pub fn with_timestamp(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        timestamp: u32,
    ) -> Self {
        let key = key.into();
        let value = value.into();
        let crc = checksum(&key, &value);
        Self {
            crc,
            timestamp,
            key,
            value,
        }
    }

    /// Build a tombstone for `key`
    pub fn tombstone(key: impl Into<Vec<u8>>) -> Self {
        Self::new(key, Vec::new())
    }

    /// Key length as stored in the header
    pub fn key_size(&self) -> Result<u32> {
        size_field(self.key.len())
    }

    /// Value length as stored in the header
    pub fn value_size(&self) -> Result<u32> {
        size_field(self.value.len())
    }

    /// A zero-length value marks the key as deleted
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }

    /// Total on-disk size of this record
    pub fn encoded_len(&self) -> u64 {
        encoded_len(self.key.len(), self.value.len())
    }

    /// Encode into the on-disk layout, keeping this record's timestamp
    pub fn encode(&self) -> Result<Bytes> {
        encode_with_timestamp(&self.key, &self.value, self.timestamp)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// On-disk size of a record with the given key and value lengths
pub fn encoded_len(key_len: usize, value_len: usize) -> u64 {
    HEADER_SIZE as u64 + key_len as u64 + value_len as u64
}

/// Seconds since `CUSTOM_EPOCH`, saturating at both ends of the u32 range
pub fn now_timestamp() -> u32 {
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    u32::try_from(unix.saturating_sub(CUSTOM_EPOCH)).unwrap_or(u32::MAX)
}

/// Encode a key/value pair stamped with the current time
pub fn encode(key: &[u8], value: &[u8]) -> Result<Bytes> {
    encode_with_timestamp(key, value, now_timestamp())
}

/// Encode a key/value pair with an explicit timestamp
///
/// Fails with `EmptyKey` for a zero-length key and `RecordTooLarge` when
/// either length does not fit in 32 bits.
pub fn encode_with_timestamp(key: &[u8], value: &[u8], timestamp: u32) -> Result<Bytes> {
    validate(key, value)?;

    let mut buf = BytesMut::with_capacity(encoded_len(key.len(), value.len()) as usize);
    buf.put_u32_le(checksum(key, value));
    buf.put_u32_le(timestamp);
    buf.put_u32_le(key.len() as u32);
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(key);
    buf.put_slice(value);

    Ok(buf.freeze())
}

/// Reject keys and values the header cannot describe
pub(crate) fn validate(key: &[u8], value: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(KivalError::EmptyKey);
    }

    size_field(key.len())?;
    size_field(value.len())?;
    Ok(())
}

/// Convert a length into its 32-bit header field
fn size_field(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| KivalError::RecordTooLarge {
        size: len as u64,
        limit: u32::MAX as u64,
    })
}

/// CRC32C over [key size | value size | key | value]
fn checksum(key: &[u8], value: &[u8]) -> u32 {
    let mut digest = Digest::new(ALGORITHM);
    digest.update(&(key.len() as u32).to_le_bytes());
    digest.update(&(value.len() as u32).to_le_bytes());
    digest.update(key);
    digest.update(value);
    digest.finalize() as u32
}

// =============================================================================
// Decoding
// =============================================================================

/// Anything records can be decoded from with positioned reads
///
/// Positioned reads never move a shared cursor, so several readers can
/// decode from the same file handle at once.
pub trait RecordSource {
    /// Current length of the underlying data in bytes
    fn source_len(&self) -> io::Result<u64>;

    /// Read into `buf` starting at `offset`; may return fewer bytes
    fn read_bytes_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl RecordSource for File {
    fn source_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    #[cfg(unix)]
    fn read_bytes_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_bytes_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl RecordSource for [u8] {
    fn source_len(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_bytes_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.len());
        let available = &self[start..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

/// Fill as much of `buf` as the source has, returning the bytes read
fn read_full<S: RecordSource + ?Sized>(source: &S, buf: &mut [u8], offset: u64) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read_bytes_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Decode the record starting at `offset`
///
/// Returns the record and the offset just past it, ready for the next
/// decode in a sequential scan.
///
/// Errors:
/// - `PartialWrite`: not enough bytes for the header or the body (torn tail)
/// - `EmptyKey`: header declares a zero-length key
/// - `CorruptRecord`: checksum mismatch
pub fn decode<S: RecordSource + ?Sized>(source: &S, offset: u64) -> Result<(Record, u64)> {
    let source_len = source.source_len()?;

    // Step 1: Header must fit
    let header_end = offset.saturating_add(HEADER_SIZE as u64);
    if header_end > source_len {
        return Err(KivalError::PartialWrite { offset });
    }

    let mut header = [0u8; HEADER_SIZE];
    if read_full(source, &mut header, offset)? != HEADER_SIZE {
        return Err(KivalError::PartialWrite { offset });
    }

    // Step 2: Parse header fields
    let mut cursor = &header[..];
    let stored_crc = cursor.get_u32_le();
    let timestamp = cursor.get_u32_le();
    let key_size = cursor.get_u32_le();
    let value_size = cursor.get_u32_le();

    if key_size == 0 {
        return Err(KivalError::EmptyKey);
    }

    // Step 3: Whole record must fit
    let record_len = encoded_len(key_size as usize, value_size as usize);
    let record_end = offset.saturating_add(record_len);
    if record_end > source_len {
        return Err(KivalError::PartialWrite { offset });
    }

    // Step 4: Read key and value
    let mut body = vec![0u8; key_size as usize + value_size as usize];
    if read_full(source, &mut body, header_end)? != body.len() {
        return Err(KivalError::PartialWrite { offset });
    }
    let value = body.split_off(key_size as usize);
    let key = body;

    // Step 5: Verify checksum
    let computed = checksum(&key, &value);
    if computed != stored_crc {
        return Err(KivalError::CorruptRecord {
            offset,
            stored: stored_crc,
            computed,
        });
    }

    Ok((
        Record {
            crc: stored_crc,
            timestamp,
            key,
            value,
        },
        record_end,
    ))
}
