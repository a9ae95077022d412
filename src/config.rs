//! Configuration for kival
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KivalError, Result};
use crate::record::HEADER_SIZE;

/// Main configuration for a kival store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Store directory holding every segment file
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 1.data, 2.data, ...   (segments)
    ///     ├── COMPACTING            (only while a compaction is in flight)
    ///     └── compact.tmp           (compaction output before install)
    pub data_dir: PathBuf,

    /// Max size of a single segment in bytes before rotation
    pub max_segment_size: u64,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often appends are fsynced
    pub sync_strategy: SyncStrategy,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (no committed record is ever lost)
    EveryWrite,

    /// fsync after N appends; seal, close and compaction still sync
    EveryNWrites { count: usize },
}

impl Default for SyncStrategy {
    fn default() -> Self {
        SyncStrategy::EveryWrite
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./kival_data"),
            max_segment_size: 16 * 1024 * 1024, // 16 MB
            sync_strategy: SyncStrategy::EveryWrite,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the config describes a usable store
    pub fn validate(&self) -> Result<()> {
        // Smallest storable record: header + 1 byte key + 1 byte value
        let min_segment = HEADER_SIZE as u64 + 2;
        if self.max_segment_size < min_segment {
            return Err(KivalError::Config(format!(
                "max_segment_size must be at least {} bytes, got {}",
                min_segment, self.max_segment_size
            )));
        }

        if let SyncStrategy::EveryNWrites { count: 0 } = self.sync_strategy {
            return Err(KivalError::Config(
                "EveryNWrites count must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the maximum segment size (in bytes)
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
