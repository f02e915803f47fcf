//! Core types and shared functionality for the barrio offline cache.
//!
//! This crate provides:
//! - Cache Store Set with a SQLite backend (versioned partitions)
//! - Resource classification and freshness tracking
//! - Unified error types
//! - Configuration structures
//! - Sitemap generation for the locality pages

pub mod cache;
pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod freshness;
pub mod sitemap;

pub use cache::{CacheDb, CacheEntry, Partition};
pub use classify::{AppContext, Classification, Classifier, ResourceClass};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::Error;
pub use freshness::FreshnessTracker;
