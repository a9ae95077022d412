//! Index Module
//!
//! In-memory key → location map (the keydir) and its rebuild from disk.
//!
//! ## Responsibilities
//! - One entry per live key, pointing at its most recent record
//! - Incremental updates on put/delete (done by the engine)
//! - Bulk rebuild by replaying segments oldest → newest at startup

mod keydir;
mod rebuild;

pub use keydir::KeyDir;
pub use rebuild::{build_index, RebuildResult};
