//! Reference data (properties, rooms, topics) with transparent caching.

use color_eyre::Result;

use crate::cache::{CacheLayer, CacheResult, CacheStorage, QueryKey};

use super::cache::LubdQueryKey;
use super::client::ApiClient;
use super::types::{Property, Room, Topic};

/// API client with transparent caching of slow-changing lists.
///
/// Jobs and maintenance tasks go through synchronized collections instead;
/// this covers the lookups those views need.
#[derive(Clone)]
pub struct CachedClient<S: CacheStorage> {
  inner: ApiClient,
  cache: CacheLayer<S>,
}

impl<S: CacheStorage> CachedClient<S> {
  pub fn new(inner: ApiClient, cache: CacheLayer<S>) -> Self {
    Self { inner, cache }
  }

  /// Get properties visible to the user. `refresh` skips the cache.
  pub async fn get_properties(&self, refresh: bool) -> Result<CacheResult<Vec<Property>>> {
    self
      .cache
      .fetch_list(&LubdQueryKey::Properties, refresh, || {
        let inner = self.inner.clone();
        async move { inner.get_properties().await }
      })
      .await
  }

  /// Get rooms, optionally for one property.
  pub async fn get_rooms(&self, property_id: Option<&str>) -> Result<CacheResult<Vec<Room>>> {
    let key = LubdQueryKey::Rooms {
      property_id: property_id.map(str::to_string),
    };
    self
      .cache
      .fetch_list(&key, false, || {
        let inner = self.inner.clone();
        let property_id = property_id.map(str::to_string);
        async move { inner.get_rooms(property_id.as_deref()).await }
      })
      .await
  }

  pub async fn get_topics(&self) -> Result<CacheResult<Vec<Topic>>> {
    self
      .cache
      .fetch_list(&LubdQueryKey::Topics, false, || {
        let inner = self.inner.clone();
        async move { inner.get_topics().await }
      })
      .await
  }

  /// Drop every cached reference list, including the rooms of `property_id`.
  pub fn clear(&self, property_id: Option<&str>) {
    let keys = [
      LubdQueryKey::Properties,
      LubdQueryKey::Rooms {
        property_id: property_id.map(str::to_string),
      },
      LubdQueryKey::Topics,
    ];
    for key in &keys {
      self.cache.remove(&key.cache_key());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, MemoryStorage, Snapshot};
  use crate::config::Config;
  use chrono::{Duration, Utc};
  use std::sync::Arc;

  fn unreachable_client() -> ApiClient {
    let config: Config =
      serde_yaml::from_str("api:\n  url: http://127.0.0.1:9\n  timeout_secs: 2\n").unwrap();
    ApiClient::with_token(&config, "token".to_string()).unwrap()
  }

  fn property(id: &str) -> Property {
    Property {
      id: id.to_string(),
      name: format!("Property {}", id),
      description: None,
      created_at: None,
    }
  }

  #[tokio::test]
  async fn test_refresh_while_offline_keeps_property_list() {
    let storage = Arc::new(MemoryStorage::new());
    let cached_at = Utc::now() - Duration::hours(2);
    storage
      .store_snapshot("properties_all", &Snapshot::new(vec![property("P1")], cached_at))
      .unwrap();
    let client = CachedClient::new(unreachable_client(), CacheLayer::new(Arc::clone(&storage)));

    let result = client.get_properties(true).await.unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, vec![property("P1")]);
    let kept = storage.get_snapshot::<Property>("properties_all").unwrap();
    assert_eq!(kept.map(|s| s.data), Some(vec![property("P1")]));
  }

  #[test]
  fn test_clear_removes_rooms_of_scope() {
    let storage = Arc::new(MemoryStorage::new());
    for key in ["properties_all", "topics_all", "rooms_P1", "rooms_P2"] {
      storage.set_item(key, "{}").unwrap();
    }
    let client = CachedClient::new(unreachable_client(), CacheLayer::new(Arc::clone(&storage)));

    client.clear(Some("P1"));

    for key in ["properties_all", "topics_all", "rooms_P1"] {
      assert_eq!(storage.get_item(key).unwrap(), None, "{} survived", key);
    }
    assert!(storage.get_item("rooms_P2").unwrap().is_some());
  }
}
