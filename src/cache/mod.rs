//! Generic caching layer for data persistence and offline support.
//!
//! This module provides an API-agnostic caching mechanism that:
//! - Stores whole collection snapshots (`{data, timestamp}`) under composite keys
//! - Decides freshness against a configurable stale time
//! - Serves the last persisted snapshot when the network is unavailable
//! - Degrades to memory-only operation when the backing store fails

mod layer;
mod storage;
mod traits;

pub use layer::{fallback_message, CacheLayer, Clock};
pub use storage::{CacheStorage, MemoryStorage, NoopStorage, SqliteStorage, StorageBackend};
pub use traits::{CacheResult, CacheSource, Cacheable, QueryKey, Snapshot};
