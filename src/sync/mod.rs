//! Synchronized collections: locally held record lists kept consistent with
//! the backend under staleness windows, local mutation and cache fallback.

mod collection;
mod stats;
mod strategy;

pub use collection::{CollectionOptions, SyncedCollection};
pub use stats::CollectionStats;
pub use strategy::{fetch_with_degrade, FetchOutcome};

use crate::cache::Cacheable;
use color_eyre::Result;
use std::future::Future;

/// Where a record sits in its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
  Active,
  Completed,
  Cancelled,
}

/// A domain record held by a [`SyncedCollection`].
///
/// Identity is [`Cacheable::cache_key`]; updates replace by it.
pub trait Record: Cacheable {
  fn progress(&self) -> Progress;

  /// Client-side equivalent of the collection's server-side filter, applied
  /// when the filtered request had to be retried without it.
  fn matches_filter(&self) -> bool;
}

/// Remote query backing one collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionQuery {
  /// Selected property, `None` for all
  pub property_id: Option<String>,
  pub limit: Option<u32>,
  /// Whether the collection's filter (PM-only, pending-only) is requested
  pub filtered: bool,
}

impl CollectionQuery {
  /// Persistent cache key: `<kind>_<scope|all>_<limit|all>_<flag>`
  pub fn cache_key(&self, kind: &str) -> String {
    let limit = self
      .limit
      .map(|l| l.to_string())
      .unwrap_or_else(|| "all".to_string());
    format!(
      "{}_{}_{}_{}",
      kind,
      self.property_id.as_deref().unwrap_or("all"),
      limit,
      self.filtered
    )
  }
}

/// Backend that can produce the records of a collection.
pub trait RemoteSource<T>: Send + Sync + 'static {
  /// Fetch records for `query`, sending the collection filter only when `filtered` is set.
  fn fetch(
    &self,
    query: &CollectionQuery,
    filtered: bool,
  ) -> impl Future<Output = Result<Vec<T>>> + Send;

  /// Whether the scope takes part in this collection at all.
  fn scope_eligible(&self, _property_id: &str) -> impl Future<Output = Result<bool>> + Send {
    async { Ok(true) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_key_layout() {
    let query = CollectionQuery {
      property_id: Some("P1".to_string()),
      limit: Some(10),
      filtered: true,
    };
    assert_eq!(query.cache_key("pm_jobs"), "pm_jobs_P1_10_true");

    let unscoped = CollectionQuery {
      property_id: None,
      limit: None,
      filtered: false,
    };
    assert_eq!(unscoped.cache_key("pm_tasks"), "pm_tasks_all_all_false");
  }
}
