//! SQLite-backed Cache Store Set.
//!
//! This module provides the five named, versioned cache partitions the
//! worker reads and writes. It supports:
//!
//! - Partition names carrying the build version (`static-v60-multi`), so a
//!   new deploy never clobbers the previous version's entries
//! - Byte-exact storage of status, headers and body per request URL
//! - Automatic schema migrations
//! - Size-bounded eviction that never drops critical resources

pub mod connection;
pub mod entries;
pub mod eviction;
pub mod hash;
pub mod migrations;
pub mod partition;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, EntryAge};
pub use eviction::select_evictions;
pub use partition::Partition;
