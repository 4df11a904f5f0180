//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheResult, Cacheable, QueryKey, Snapshot};

/// Source of "now" for staleness decisions. Swappable so tests can pin time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client,
/// providing transparent caching with offline support. Storage failures
/// never fail an operation; they are logged and the layer carries on
/// memory-only.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// How long before cached data is considered stale
  stale_time: Duration,
  clock: Clock,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: Arc<S>) -> Self {
    Self {
      storage,
      stale_time: Duration::minutes(5),
      clock: Arc::new(Utc::now),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Replace the clock used for staleness decisions.
  pub fn with_clock(mut self, clock: Clock) -> Self {
    self.clock = clock;
    self
  }

  pub fn now(&self) -> DateTime<Utc> {
    (self.clock)()
  }

  /// Check if cached data is stale based on cached_at timestamp.
  ///
  /// An age of exactly `stale_time` counts as stale.
  pub fn is_stale(&self, cached_at: DateTime<Utc>) -> bool {
    is_stale_at(cached_at, self.now(), self.stale_time)
  }

  /// Read a snapshot only if it is still fresh.
  pub fn read_fresh<T: Cacheable>(&self, key: &str) -> Option<Snapshot<T>> {
    let snapshot = self.read_any::<T>(key)?;
    if self.is_stale(snapshot.timestamp) {
      debug!(key, cached_at = %snapshot.timestamp, "Cache entry is stale");
      return None;
    }
    Some(snapshot)
  }

  /// Read a snapshot regardless of its age.
  pub fn read_any<T: Cacheable>(&self, key: &str) -> Option<Snapshot<T>> {
    match self.storage.get_snapshot::<T>(key) {
      Ok(snapshot) => snapshot,
      Err(e) => {
        warn!(key, error = %e, "Cache read failed");
        None
      }
    }
  }

  /// Persist a snapshot. Returns false if the backing store rejected it.
  pub fn write<T: Cacheable>(&self, key: &str, snapshot: &Snapshot<T>) -> bool {
    match self.storage.store_snapshot(key, snapshot) {
      Ok(()) => true,
      Err(e) => {
        warn!(key, error = %e, "Cache write failed, keeping data in memory only");
        false
      }
    }
  }

  /// Drop the entry stored under `key`.
  pub fn remove(&self, key: &str) {
    if let Err(e) = self.storage.remove_item(key) {
      warn!(key, error = %e, "Cache removal failed");
    }
  }

  /// Fetch a list with cache-first strategy.
  ///
  /// 1. Check cache - if fresh and not `force`, return immediately
  /// 2. If stale/missing or forced, fetch from network
  /// 3. On network failure, return the cached entry of any age (offline mode)
  /// 4. Update cache with new data
  ///
  /// The `query` parameter provides the cache lookup key (e.g., "properties_all").
  pub async fn fetch_list<K, T, F, Fut>(
    &self,
    query: &K,
    force: bool,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>>
  where
    K: QueryKey + ?Sized,
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    let key = &query.cache_key();

    // Check cache first
    if let Some(cached) = self.read_any::<T>(key) {
      if !force && !self.is_stale(cached.timestamp) {
        // Cache is fresh, return immediately
        debug!(query = %query.description(), "Serving fresh cache");
        return Ok(CacheResult::from_cache(cached.data, cached.timestamp, false));
      }

      // Cache is stale or bypassed, try to fetch from network
      match fetcher().await {
        Ok(data) => {
          self.write(key, &Snapshot::new(data.clone(), self.now()));
          Ok(CacheResult::from_network(data))
        }
        Err(e) => {
          // Network failed, return the old entry (offline mode)
          warn!(query = %query.description(), error = %e, "Fetch failed, serving cached data");
          let message = fallback_message(&e.to_string(), cached.timestamp);
          Ok(CacheResult::offline(cached.data, cached.timestamp, message))
        }
      }
    } else {
      // No cache, must fetch from network
      let data = fetcher().await?;
      self.write(key, &Snapshot::new(data.clone(), self.now()));
      Ok(CacheResult::from_network(data))
    }
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      stale_time: self.stale_time,
      clock: Arc::clone(&self.clock),
    }
  }
}

/// Staleness rule shared by the cache layer and in-memory snapshots.
pub fn is_stale_at(cached_at: DateTime<Utc>, now: DateTime<Utc>, stale_time: Duration) -> bool {
  now - cached_at >= stale_time
}

/// Error text shown when a failed refresh falls back to cached data.
pub fn fallback_message(error: &str, cached_at: DateTime<Utc>) -> String {
  format!(
    "{} (showing cached data from {})",
    error,
    cached_at.format("%Y-%m-%d %H:%M:%S UTC")
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use color_eyre::eyre::eyre;
  use serde::{Deserialize, Serialize};
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Site {
    id: String,
  }

  impl Cacheable for Site {
    fn cache_key(&self) -> String {
      self.id.clone()
    }

    fn entity_type() -> &'static str {
      "site"
    }
  }

  fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
  }

  fn sites(ids: &[&str]) -> Vec<Site> {
    ids
      .iter()
      .map(|id| Site { id: id.to_string() })
      .collect()
  }

  #[test]
  fn test_staleness_boundary() {
    let now = Utc::now();
    let threshold = Duration::minutes(5);

    assert!(is_stale_at(now - threshold, now, threshold));
    assert!(!is_stale_at(
      now - threshold + Duration::milliseconds(1),
      now,
      threshold
    ));
  }

  #[test]
  fn test_read_fresh_ignores_stale_entry() {
    let now = Utc::now();
    let storage = Arc::new(MemoryStorage::new());
    let cache = CacheLayer::new(storage).with_clock(fixed_clock(now));

    cache.write("sites", &Snapshot::new(sites(&["a"]), now - Duration::minutes(6)));

    assert!(cache.read_fresh::<Site>("sites").is_none());
    assert!(cache.read_any::<Site>("sites").is_some());
  }

  #[test]
  fn test_write_failure_is_reported_not_raised() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_simulate_write_error(true);
    let cache = CacheLayer::new(storage);

    assert!(!cache.write("sites", &Snapshot::new(sites(&["a"]), Utc::now())));
  }

  #[tokio::test]
  async fn test_fetch_list_uses_fresh_cache() {
    let now = Utc::now();
    let storage = Arc::new(MemoryStorage::new());
    let cache = CacheLayer::new(storage).with_clock(fixed_clock(now));
    cache.write("sites", &Snapshot::new(sites(&["a", "b"]), now));

    let calls = AtomicU32::new(0);
    let result = cache
      .fetch_list("sites", false, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(sites(&["c"]))
      })
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.source, crate::cache::CacheSource::CacheFresh);
    assert_eq!(result.data.len(), 2);
  }

  #[tokio::test]
  async fn test_fetch_list_falls_back_when_offline() {
    let now = Utc::now();
    let storage = Arc::new(MemoryStorage::new());
    let cache = CacheLayer::new(storage).with_clock(fixed_clock(now));
    cache.write("sites", &Snapshot::new(sites(&["a"]), now - Duration::hours(1)));

    let result = cache
      .fetch_list::<_, Site, _, _>("sites", false, || async { Err(eyre!("connection refused")) })
      .await
      .unwrap();

    assert_eq!(result.source, crate::cache::CacheSource::Offline);
    assert_eq!(result.data, sites(&["a"]));
    assert!(result.error.unwrap().starts_with("connection refused"));
  }

  #[tokio::test]
  async fn test_fetch_list_without_cache_propagates_error() {
    let storage = Arc::new(MemoryStorage::new());
    let cache = CacheLayer::new(storage);

    let result = cache
      .fetch_list::<_, Site, _, _>("sites", false, || async { Err(eyre!("connection refused")) })
      .await;

    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_fetch_list_refreshes_stale_cache() {
    let now = Utc::now();
    let storage = Arc::new(MemoryStorage::new());
    let cache = CacheLayer::new(storage).with_clock(fixed_clock(now));
    cache.write("sites", &Snapshot::new(sites(&["a"]), now - Duration::hours(1)));

    let result = cache
      .fetch_list("sites", false, || async { Ok(sites(&["b", "c"])) })
      .await
      .unwrap();

    assert_eq!(result.source, crate::cache::CacheSource::Network);
    let stored = cache.read_fresh::<Site>("sites").unwrap();
    assert_eq!(stored.data, sites(&["b", "c"]));
    assert_eq!(stored.timestamp, now);
  }
  #[tokio::test]
  async fn test_forced_fetch_bypasses_fresh_cache() {
    let now = Utc::now();
    let storage = Arc::new(MemoryStorage::new());
    let cache = CacheLayer::new(storage).with_clock(fixed_clock(now));
    cache.write("sites", &Snapshot::new(sites(&["a"]), now));

    let result = cache
      .fetch_list("sites", true, || async { Ok(sites(&["b"])) })
      .await
      .unwrap();

    assert_eq!(result.source, crate::cache::CacheSource::Network);
    assert_eq!(cache.read_any::<Site>("sites").unwrap().data, sites(&["b"]));
  }

  #[tokio::test]
  async fn test_forced_fetch_keeps_entry_when_offline() {
    let now = Utc::now();
    let cached_at = now - Duration::hours(1);
    let storage = Arc::new(MemoryStorage::new());
    let cache = CacheLayer::new(storage).with_clock(fixed_clock(now));
    cache.write("sites", &Snapshot::new(sites(&["a"]), cached_at));

    let result = cache
      .fetch_list::<_, Site, _, _>("sites", true, || async { Err(eyre!("connection refused")) })
      .await
      .unwrap();

    assert_eq!(result.source, crate::cache::CacheSource::Offline);
    assert_eq!(result.data, sites(&["a"]));
    let kept = cache.read_any::<Site>("sites").unwrap();
    assert_eq!(kept.data, sites(&["a"]));
    assert_eq!(kept.timestamp, cached_at);
  }
}
