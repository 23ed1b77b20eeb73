//! Versioned cache generations for offline support.
//!
//! This module provides:
//! - Named static/dynamic generations keyed by normalized `(method, url)`
//! - Install-time population from an asset manifest
//! - Eager purge of stale generations on activation
//! - Read/write failure isolation (reads degrade to a miss, writes are logged)

mod registry;
mod storage;
#[cfg(test)]
pub mod testing;
mod types;

pub use registry::{ActivateReport, CacheRegistry, InstallReport};
pub use storage::{CacheStorage, SqliteStorage};
pub use types::{CacheGeneration, GenerationKind, RequestKey, ResponseRecord};
