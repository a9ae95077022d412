//! Storage Module
//!
//! Append-only segment files and the set that owns them.
//!
//! ## Responsibilities
//! - Append records with a capacity check made before any write
//! - Positioned reads by `LogPosition`
//! - Sealing and rotation of segments
//! - Discovery and replay of segments at startup
//!
//! ## Directory Layout
//! ```text
//! <dir>/
//! ├── 1.data          sealed segment
//! ├── 2.data          sealed segment
//! ├── 3.data          active segment (highest id)
//! ├── COMPACTING      compaction marker (only mid-compaction)
//! └── compact.tmp     compaction output before install
//! ```

mod manager;
mod position;
mod segment;

pub use manager::SegmentSet;
pub use position::LogPosition;
pub use segment::{Log, Segment};

pub(crate) use manager::sync_dir;

/// Numeric segment id; file `<id>.data`
pub type SegmentId = u32;
