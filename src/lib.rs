//! # kival
//!
//! An embedded, single-node key-value storage engine in the Bitcask style:
//! - Append-only segment files with CRC32C-checked records
//! - Capacity-based segment rotation
//! - In-memory keydir rebuilt from the log on startup
//! - Torn-write detection at the tail of a segment
//! - Compaction with a crash-recoverable atomic swap
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │            put / get / delete / compact / close              │
//! │             (RwLock: shared reads, exclusive writes)         │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │                               │
//!                ▼                               ▼
//!        ┌──────────────┐                ┌──────────────┐
//!        │    KeyDir    │◄── rebuild ────│  SegmentSet  │
//!        │ key → LogPos │                │ active+sealed│
//!        └──────────────┘                └──────┬───────┘
//!                ▲                              │
//!                │                              ▼
//!        ┌──────────────┐                ┌──────────────┐
//!        │  Compactor   │── rewrites ───►│   Segment    │
//!        │ marker+swap  │                │  <id>.data   │
//!        └──────────────┘                └──────┬───────┘
//!                                               │
//!                                               ▼
//!                                        ┌──────────────┐
//!                                        │ Record codec │
//!                                        │ 16B hdr+CRC  │
//!                                        └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod storage;
pub mod index;
pub mod compaction;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use compaction::CompactionStats;
pub use config::{Config, SyncStrategy};
pub use engine::{Engine, EngineStats};
pub use error::{KivalError, Result};
pub use storage::{Log, LogPosition, Segment, SegmentId};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kival
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
