//! Tests for KeyDir and its rebuild
//!
//! These tests verify:
//! - Basic KeyDir operations and snapshot ordering
//! - Replay of puts, overwrites and tombstones
//! - Torn-tail handling and corruption during replay
//! - Sealed segments are never truncated

use std::fs::{self, OpenOptions};
use std::io::Write;

use kival::index::{build_index, KeyDir, RebuildResult};
use kival::record::{encode, encoded_len};
use kival::{KivalError, Log, LogPosition, Segment};
use tempfile::TempDir;

const MAX_SIZE: u64 = 4096;

/// Fewer bytes than a full header
const HEADER_PREFIX: usize = 10;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_segment() -> (TempDir, Segment) {
    let temp_dir = TempDir::new().unwrap();
    let segment = Segment::open(1, temp_dir.path(), MAX_SIZE).unwrap();
    (temp_dir, segment)
}

fn reopen(temp: &TempDir) -> Segment {
    Segment::open(1, temp.path(), MAX_SIZE).unwrap()
}

// =============================================================================
// KeyDir Tests
// =============================================================================

#[test]
fn test_keydir_insert_get_remove() {
    let mut keydir = KeyDir::new();
    let pos = LogPosition::new(1, 0, 5, 10);

    assert!(keydir.insert(b"key".to_vec(), pos).is_none());
    assert_eq!(keydir.get(b"key"), Some(&pos));
    assert!(keydir.contains_key(b"key"));
    assert_eq!(keydir.len(), 1);

    assert_eq!(keydir.remove(b"key"), Some(pos));
    assert!(keydir.is_empty());
    assert!(keydir.remove(b"key").is_none());
}

#[test]
fn test_keydir_insert_replaces() {
    let mut keydir = KeyDir::new();
    let old = LogPosition::new(1, 0, 1, 0);
    let new = LogPosition::new(2, 64, 1, 0);

    keydir.insert(b"k".to_vec(), old);
    let previous = keydir.insert(b"k".to_vec(), new);

    assert_eq!(previous, Some(old));
    assert_eq!(keydir.get(b"k"), Some(&new));
    assert_eq!(keydir.len(), 1);
}

#[test]
fn test_keydir_snapshot_order() {
    let mut keydir = KeyDir::new();
    keydir.insert(b"c".to_vec(), LogPosition::new(2, 0, 1, 0));
    keydir.insert(b"a".to_vec(), LogPosition::new(1, 40, 1, 0));
    keydir.insert(b"b".to_vec(), LogPosition::new(1, 0, 1, 0));

    let keys: Vec<_> = keydir.snapshot().into_iter().map(|(k, _)| k).collect();

    assert_eq!(keys, vec![b"b".to_vec(), b"a".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_keydir_keys() {
    let mut keydir = KeyDir::new();
    keydir.insert(b"x".to_vec(), LogPosition::default());
    keydir.insert(b"y".to_vec(), LogPosition::default());

    let mut keys = keydir.keys();
    keys.sort();

    assert_eq!(keys, vec![b"x".to_vec(), b"y".to_vec()]);
    assert_eq!(keydir.iter().count(), 2);
}

// =============================================================================
// Rebuild Tests
// =============================================================================

#[test]
fn test_rebuild_empty_segment() {
    let (_temp, mut segment) = setup_temp_segment();
    let mut keydir = KeyDir::new();

    let result = build_index(&mut segment, &mut keydir).unwrap();

    assert_eq!(result, RebuildResult::default());
    assert!(keydir.is_empty());
}

#[test]
fn test_rebuild_mixed_operations() {
    let (temp, mut segment) = setup_temp_segment();
    segment.append(b"k1", b"v1").unwrap();
    segment.append(b"k1", b"v2").unwrap();
    segment.append(b"k2", b"x").unwrap();
    segment.append(b"k2", b"").unwrap();
    let last = segment.append(b"k1", b"v3").unwrap();
    let end = segment.size();
    segment.close().unwrap();

    let mut segment = reopen(&temp);
    let mut keydir = KeyDir::new();
    let result = build_index(&mut segment, &mut keydir).unwrap();

    assert_eq!(result.records_applied, 4);
    assert_eq!(result.tombstones_applied, 1);
    assert_eq!(result.end_offset, end);
    assert!(!result.was_truncated);

    assert_eq!(keydir.len(), 1);
    assert!(!keydir.contains_key(b"k2"));
    let pos = keydir.get(b"k1").unwrap();
    assert_eq!(pos.value_pos, last.value_pos);
    assert_eq!(pos.value_size, 2);
    assert_eq!(segment.read_at(pos).unwrap(), b"v3".to_vec());
}

#[test]
fn test_rebuild_tombstone_for_absent_key() {
    let (temp, mut segment) = setup_temp_segment();
    segment.append(b"never-written", b"").unwrap();
    segment.close().unwrap();

    let mut segment = reopen(&temp);
    let mut keydir = KeyDir::new();
    let result = build_index(&mut segment, &mut keydir).unwrap();

    assert_eq!(result.tombstones_applied, 1);
    assert!(keydir.is_empty());
}

#[test]
fn test_rebuild_across_segments_later_wins() {
    let temp = TempDir::new().unwrap();
    {
        let mut s1 = Segment::open(1, temp.path(), MAX_SIZE).unwrap();
        s1.append(b"a", b"old").unwrap();
        s1.append(b"b", b"keep").unwrap();
        let mut s2 = Segment::open(2, temp.path(), MAX_SIZE).unwrap();
        s2.append(b"a", b"new").unwrap();
        s2.append(b"b", b"").unwrap();
    }

    let mut keydir = KeyDir::new();
    for id in [1, 2] {
        let mut segment = Segment::open(id, temp.path(), MAX_SIZE).unwrap();
        build_index(&mut segment, &mut keydir).unwrap();
    }

    assert_eq!(keydir.len(), 1);
    assert_eq!(keydir.get(b"a").unwrap().file_id, 2);
}

#[test]
fn test_rebuild_truncates_torn_tail() {
    let (temp, mut segment) = setup_temp_segment();
    segment.append(b"k1", b"v1").unwrap();
    let valid_len = segment.size();
    segment.close().unwrap();

    let path = temp.path().join("1.data");
    let torn = encode(b"k2", b"v2").unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&torn[..HEADER_PREFIX]).unwrap();
    drop(file);

    let mut segment = reopen(&temp);
    let mut keydir = KeyDir::new();
    let result = build_index(&mut segment, &mut keydir).unwrap();

    assert!(result.was_truncated);
    assert_eq!(result.end_offset, valid_len);
    assert_eq!(keydir.len(), 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), valid_len);
    assert_eq!(segment.size(), valid_len);

    // Appends resume where the valid data ends
    let pos = segment.append(b"k3", b"v3").unwrap();
    assert_eq!(pos.value_pos, valid_len);
    assert_eq!(segment.size(), valid_len + encoded_len(2, 2));
}

#[test]
fn test_rebuild_aborts_on_corruption() {
    let (temp, mut segment) = setup_temp_segment();
    segment.append(b"k1", b"v1").unwrap();
    let second = segment.append(b"k2", b"v2").unwrap();
    segment.append(b"k3", b"v3").unwrap();
    segment.close().unwrap();

    let path = temp.path().join("1.data");
    let mut data = fs::read(&path).unwrap();
    let value_byte = second.value_pos as usize + 16 + 2;
    data[value_byte] ^= 0x01;
    fs::write(&path, &data).unwrap();

    let mut segment = reopen(&temp);
    let mut keydir = KeyDir::new();
    let result = build_index(&mut segment, &mut keydir);

    match result {
        Err(KivalError::CorruptRecord { offset, .. }) => assert_eq!(offset, second.value_pos),
        other => panic!("expected corruption, got {:?}", other),
    }
}

#[test]
fn test_rebuild_aborts_on_empty_key_header() {
    let (temp, mut segment) = setup_temp_segment();
    segment.append(b"k1", b"v1").unwrap();
    segment.close().unwrap();

    // A zeroed header declaring no key but a 4-byte value
    let mut bogus = vec![0u8; 20];
    bogus[12..16].copy_from_slice(&4u32.to_le_bytes());
    let path = temp.path().join("1.data");
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&bogus).unwrap();
    drop(file);

    let mut segment = reopen(&temp);
    let mut keydir = KeyDir::new();
    let result = build_index(&mut segment, &mut keydir);

    assert!(matches!(result, Err(KivalError::EmptyKey)));
}

#[test]
fn test_rebuild_read_only_segment_keeps_torn_tail() {
    let (temp, mut segment) = setup_temp_segment();
    segment.append(b"k1", b"v1").unwrap();
    let valid_len = segment.size();
    segment.close().unwrap();

    let path = temp.path().join("1.data");
    let torn = encode(b"k2", b"v2").unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&torn[..HEADER_PREFIX]).unwrap();
    drop(file);
    let damaged_len = fs::metadata(&path).unwrap().len();

    let mut segment = reopen(&temp);
    segment.mark_read_only();
    let mut keydir = KeyDir::new();
    let result = build_index(&mut segment, &mut keydir);

    match result {
        Err(e @ KivalError::DamagedSealedSegment { .. }) => {
            assert!(e.is_corruption());
            assert!(matches!(
                e,
                KivalError::DamagedSealedSegment { segment_id: 1, offset } if offset == valid_len
            ));
        }
        other => panic!("expected damaged segment, got {:?}", other),
    }
    assert_eq!(fs::metadata(&path).unwrap().len(), damaged_len);
}
