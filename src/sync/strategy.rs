use tracing::warn;

use super::{CollectionQuery, Record, RemoteSource};

/// How a collection fetch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
  /// The request as asked for succeeded
  Strict(Vec<T>),
  /// The filtered request failed; the unfiltered retry succeeded and was
  /// narrowed client-side
  Relaxed {
    records: Vec<T>,
    strict_error: String,
  },
  /// Nothing could be fetched
  Failed(String),
}

/// Fetch a collection, dropping the server-side filter and retrying once if
/// the filtered request fails.
pub async fn fetch_with_degrade<T, R>(remote: &R, query: &CollectionQuery) -> FetchOutcome<T>
where
  T: Record,
  R: RemoteSource<T>,
{
  if !query.filtered {
    return match remote.fetch(query, false).await {
      Ok(records) => FetchOutcome::Strict(records),
      Err(e) => FetchOutcome::Failed(e.to_string()),
    };
  }

  let strict_error = match remote.fetch(query, true).await {
    Ok(records) => return FetchOutcome::Strict(records),
    Err(e) => e.to_string(),
  };

  warn!(error = %strict_error, "Filtered fetch failed, retrying without filter");

  match remote.fetch(query, false).await {
    Ok(records) => FetchOutcome::Relaxed {
      records: records.into_iter().filter(T::matches_filter).collect(),
      strict_error,
    },
    Err(e) => FetchOutcome::Failed(e.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Cacheable;
  use color_eyre::{eyre::eyre, Result};
  use serde::{Deserialize, Serialize};
  use std::sync::Mutex;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Item {
    id: u32,
    flagged: bool,
  }

  impl Cacheable for Item {
    fn cache_key(&self) -> String {
      self.id.to_string()
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  impl Record for Item {
    fn progress(&self) -> crate::sync::Progress {
      crate::sync::Progress::Active
    }

    fn matches_filter(&self) -> bool {
      self.flagged
    }
  }

  /// Remote whose filtered and unfiltered calls can fail independently.
  struct Scripted {
    filtered_ok: bool,
    unfiltered_ok: bool,
    calls: Mutex<Vec<bool>>,
  }

  impl Scripted {
    fn new(filtered_ok: bool, unfiltered_ok: bool) -> Self {
      Self {
        filtered_ok,
        unfiltered_ok,
        calls: Mutex::new(Vec::new()),
      }
    }
  }

  impl RemoteSource<Item> for Scripted {
    async fn fetch(&self, _query: &CollectionQuery, filtered: bool) -> Result<Vec<Item>> {
      self.calls.lock().unwrap().push(filtered);
      let ok = if filtered {
        self.filtered_ok
      } else {
        self.unfiltered_ok
      };
      if !ok {
        return Err(eyre!("boom"));
      }
      Ok(
        (0..4)
          .map(|id| Item {
            id,
            flagged: filtered || id % 2 == 0,
          })
          .collect(),
      )
    }
  }

  fn query(filtered: bool) -> CollectionQuery {
    CollectionQuery {
      property_id: Some("P1".to_string()),
      limit: None,
      filtered,
    }
  }

  #[tokio::test]
  async fn test_strict_success_makes_one_call() {
    let remote = Scripted::new(true, true);
    let outcome = fetch_with_degrade(&remote, &query(true)).await;

    assert!(matches!(outcome, FetchOutcome::Strict(ref r) if r.len() == 4));
    assert_eq!(*remote.calls.lock().unwrap(), vec![true]);
  }

  #[tokio::test]
  async fn test_relaxed_retry_filters_client_side() {
    let remote = Scripted::new(false, true);
    let outcome = fetch_with_degrade(&remote, &query(true)).await;

    match outcome {
      FetchOutcome::Relaxed {
        records,
        strict_error,
      } => {
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(strict_error, "boom");
      }
      other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(*remote.calls.lock().unwrap(), vec![true, false]);
  }

  #[tokio::test]
  async fn test_unfiltered_query_does_not_retry() {
    let remote = Scripted::new(true, false);
    let outcome = fetch_with_degrade(&remote, &query(false)).await;

    assert_eq!(outcome, FetchOutcome::Failed("boom".to_string()));
    assert_eq!(*remote.calls.lock().unwrap(), vec![false]);
  }

  #[tokio::test]
  async fn test_both_failing_reports_failure() {
    let remote = Scripted::new(false, false);
    let outcome = fetch_with_degrade(&remote, &query(true)).await;

    assert_eq!(outcome, FetchOutcome::Failed("boom".to_string()));
  }
}
