//! Caching implementations for tracker types.

use crate::cache::{Cacheable, QueryKey};

use super::types::{Job, MaintenanceTask, Property, Room, Topic};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Job {
  fn cache_key(&self) -> String {
    self.job_id.clone()
  }

  fn entity_type() -> &'static str {
    "pm_jobs"
  }
}

impl Cacheable for MaintenanceTask {
  fn cache_key(&self) -> String {
    self.pm_id.clone()
  }

  fn entity_type() -> &'static str {
    "pm_tasks"
  }
}

impl Cacheable for Property {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "properties"
  }
}

impl Cacheable for Room {
  fn cache_key(&self) -> String {
    self.room_id.clone()
  }

  fn entity_type() -> &'static str {
    "rooms"
  }
}

impl Cacheable for Topic {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "topics"
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Reference-data queries cached outside of a synchronized collection.
#[derive(Clone, Debug)]
pub enum LubdQueryKey {
  /// Properties visible to the user
  Properties,
  /// Rooms, optionally for one property
  Rooms { property_id: Option<String> },
  /// All topics
  Topics,
}

impl QueryKey for LubdQueryKey {
  fn cache_key(&self) -> String {
    match self {
      Self::Properties => "properties_all".to_string(),
      Self::Rooms { property_id } => {
        format!("rooms_{}", property_id.as_deref().unwrap_or("all"))
      }
      Self::Topics => "topics_all".to_string(),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Properties => "properties".to_string(),
      Self::Rooms { property_id } => match property_id {
        Some(p) => format!("rooms of property {}", p),
        None => "all rooms".to_string(),
      },
      Self::Topics => "topics".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_query_keys_are_readable() {
    assert_eq!(LubdQueryKey::Properties.cache_key(), "properties_all");
    assert_eq!(
      LubdQueryKey::Rooms {
        property_id: Some("P1".to_string())
      }
      .cache_key(),
      "rooms_P1"
    );
    assert_eq!(LubdQueryKey::Rooms { property_id: None }.cache_key(), "rooms_all");
  }
}
