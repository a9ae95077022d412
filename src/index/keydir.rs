//! KeyDir implementation
//!
//! HashMap-based key → location map. Exclusive access is provided by the
//! engine's lock, so the map itself carries no synchronization.

use std::collections::HashMap;

use crate::storage::LogPosition;

/// In-memory map from every live key to its latest record
#[derive(Debug, Default, Clone)]
pub struct KeyDir {
    entries: HashMap<Vec<u8>, LogPosition>,
}

impl KeyDir {
    /// Create a new empty KeyDir
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the latest live record for `key`
    pub fn get(&self, key: &[u8]) -> Option<&LogPosition> {
        self.entries.get(key)
    }

    /// Point `key` at `pos`, returning the previous location
    pub fn insert(&mut self, key: Vec<u8>, pos: LogPosition) -> Option<LogPosition> {
        self.entries.insert(key, pos)
    }

    /// Forget `key`; removing an absent key is a no-op
    pub fn remove(&mut self, key: &[u8]) -> Option<LogPosition> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &LogPosition)> {
        self.entries.iter()
    }

    /// Live keys in unspecified order
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.entries.keys().cloned().collect()
    }

    /// Owned copy of every entry ordered by (segment, offset)
    ///
    /// The order is stable for a given KeyDir and makes a full pass read
    /// each segment front to back.
    pub fn snapshot(&self) -> Vec<(Vec<u8>, LogPosition)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(key, pos)| (key.clone(), *pos))
            .collect();
        entries.sort_by_key(|(_, pos)| (pos.file_id, pos.value_pos));
        entries
    }
}
