//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Trait for entities that can be cached.
///
/// Implementors provide a unique cache key and the entity kind.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Unique identifier for this entity (e.g., job id, property id)
  fn cache_key(&self) -> String;

  /// Entity kind used as the prefix of collection cache keys (e.g., "pm_jobs")
  fn entity_type() -> &'static str;
}

/// A value that identifies one cached query result.
pub trait QueryKey {
  /// Storage key for this query. Must be stable across runs.
  fn cache_key(&self) -> String;

  /// Human-readable description for logs.
  fn description(&self) -> String;
}

impl QueryKey for str {
  fn cache_key(&self) -> String {
    self.to_string()
  }

  fn description(&self) -> String {
    self.to_string()
  }
}

/// A collection of records plus the moment it was captured.
///
/// This is the persisted layout: `{"data": [...], "timestamp": "<ISO 8601>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
  pub data: Vec<T>,
  pub timestamp: DateTime<Utc>,
}

impl<T> Snapshot<T> {
  pub fn new(data: Vec<T>, timestamp: DateTime<Utc>) -> Self {
    Self { data, timestamp }
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
  /// User-visible error that accompanied this result, if any
  pub error: Option<String>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
      error: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(cached_at),
      error: None,
    }
  }

  /// Create a new cache result from the in-memory snapshot.
  pub fn from_memory(data: T, loaded_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Memory,
      cached_at: loaded_at,
      error: None,
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>, error: String) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
      error: Some(error),
    }
  }

  pub fn with_error(mut self, error: impl Into<String>) -> Self {
    self.error = Some(error.into());
    self
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data already held in memory, no I/O performed
  Memory,
  /// Data from the persistent cache, still considered fresh
  CacheFresh,
  /// Data from the persistent cache, considered stale
  CacheStale,
  /// Offline mode - network unavailable, serving cached data
  Offline,
}

impl CacheSource {
  pub fn label(&self) -> &'static str {
    match self {
      CacheSource::Network => "network",
      CacheSource::Memory => "memory",
      CacheSource::CacheFresh => "cache",
      CacheSource::CacheStale => "stale cache",
      CacheSource::Offline => "offline",
    }
  }
}
