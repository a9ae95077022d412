//! Compaction marker
//!
//! The `COMPACTING` file is the single source of truth for "a compaction
//! is in flight". It is pretty-printed JSON so it can be inspected by hand:
//!
//! ```text
//! {
//!   "retiring_segment_ids": [1, 2, 3],
//!   "compacted_file_name": "compact.tmp",
//!   "started_at": 1760000000,
//!   "compacted_size": null
//! }
//! ```
//!
//! `compacted_size` stays `null` until the output is fully written and
//! synced; once set, the compaction is committed and recovery rolls it
//! forward instead of back.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{KivalError, Result};
use crate::storage::{sync_dir, SegmentId};

use super::{MARKER_FILE, MARKER_TEMP_FILE};

/// Persistent record of an in-flight compaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionMarker {
    /// Segments folded into the output, all deleted on install
    pub retiring_segment_ids: Vec<SegmentId>,

    /// Name of the output file inside the store directory
    pub compacted_file_name: String,

    /// Unix seconds when the compaction began
    pub started_at: i64,

    /// Final output length; `Some` once committed
    #[serde(default)]
    pub compacted_size: Option<u64>,
}

impl CompactionMarker {
    pub fn new(retiring_segment_ids: Vec<SegmentId>, compacted_file_name: impl Into<String>) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            retiring_segment_ids,
            compacted_file_name: compacted_file_name.into(),
            started_at,
            compacted_size: None,
        }
    }

    /// Whether the output was durably written before the marker was updated
    pub fn is_committed(&self) -> bool {
        self.compacted_size.is_some()
    }

    /// Path of the marker inside `dir`
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MARKER_FILE)
    }

    /// Load the marker from `dir`, if any
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let data = match fs::read(Self::path(dir)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let marker: Self = serde_json::from_slice(&data)
            .map_err(|e| KivalError::Marker(format!("unreadable marker: {}", e)))?;

        // Output must live directly inside the store directory
        let name = Path::new(&marker.compacted_file_name);
        if name.file_name() != Some(name.as_os_str()) {
            return Err(KivalError::Marker(format!(
                "invalid compacted file name {:?}",
                marker.compacted_file_name
            )));
        }

        Ok(Some(marker))
    }

    /// Write the marker atomically
    ///
    /// 1. Write `COMPACTING.tmp`
    /// 2. Sync it
    /// 3. Rename over `COMPACTING`
    /// 4. Sync the directory
    pub fn store(&self, dir: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| KivalError::Marker(format!("cannot serialize marker: {}", e)))?;

        let temp_path = dir.join(MARKER_TEMP_FILE);
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, Self::path(dir))?;
        sync_dir(dir)
    }

    /// Delete the marker; the last step of any compaction or recovery
    pub fn remove(dir: &Path) -> Result<()> {
        match fs::remove_file(Self::path(dir)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        sync_dir(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_load() {
        let temp = TempDir::new().unwrap();
        let mut marker = CompactionMarker::new(vec![1, 2, 3], "compact.tmp");

        marker.store(temp.path()).unwrap();
        assert_eq!(CompactionMarker::load(temp.path()).unwrap(), Some(marker.clone()));
        assert!(!temp.path().join(MARKER_TEMP_FILE).exists());

        marker.compacted_size = Some(128);
        marker.store(temp.path()).unwrap();
        let loaded = CompactionMarker::load(temp.path()).unwrap().unwrap();
        assert!(loaded.is_committed());
        assert_eq!(loaded.compacted_size, Some(128));
    }

    #[test]
    fn test_marker_is_plain_json() {
        let temp = TempDir::new().unwrap();
        CompactionMarker::new(vec![4, 5], "compact.tmp")
            .store(temp.path())
            .unwrap();

        let text = fs::read_to_string(CompactionMarker::path(temp.path())).unwrap();
        assert!(text.contains("\"retiring_segment_ids\""));
        assert!(text.contains("\"compacted_file_name\": \"compact.tmp\""));
        assert!(text.contains("\"compacted_size\": null"));
    }

    #[test]
    fn test_load_missing_marker() {
        let temp = TempDir::new().unwrap();
        assert_eq!(CompactionMarker::load(temp.path()).unwrap(), None);
    }

    #[test]
    fn test_load_garbage_marker() {
        let temp = TempDir::new().unwrap();
        fs::write(CompactionMarker::path(temp.path()), b"{not json").unwrap();

        let result = CompactionMarker::load(temp.path());
        assert!(matches!(result, Err(KivalError::Marker(_))));
    }

    #[test]
    fn test_load_rejects_path_escape() {
        let temp = TempDir::new().unwrap();
        let marker = CompactionMarker::new(vec![1], "../elsewhere.tmp");
        marker.store(temp.path()).unwrap();

        let result = CompactionMarker::load(temp.path());
        assert!(matches!(result, Err(KivalError::Marker(_))));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        CompactionMarker::new(vec![1], "compact.tmp")
            .store(temp.path())
            .unwrap();

        CompactionMarker::remove(temp.path()).unwrap();
        CompactionMarker::remove(temp.path()).unwrap();
        assert!(!CompactionMarker::path(temp.path()).exists());
    }
}
