use super::{Progress, Record};

/// Counts derived from a collection; recomputed on every read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollectionStats {
  pub total: usize,
  /// Neither completed nor cancelled
  pub active: usize,
  pub completed: usize,
  /// Percentage of completed records, 0 for an empty collection
  pub completion_rate: f64,
}

impl CollectionStats {
  pub fn from_records<T: Record>(records: &[T]) -> Self {
    let total = records.len();
    let mut active = 0;
    let mut completed = 0;
    for record in records {
      match record.progress() {
        Progress::Active => active += 1,
        Progress::Completed => completed += 1,
        Progress::Cancelled => {}
      }
    }

    let completion_rate = if total == 0 {
      0.0
    } else {
      completed as f64 / total as f64 * 100.0
    };

    Self {
      total,
      active,
      completed,
      completion_rate,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Cacheable;
  use serde::{Deserialize, Serialize};

  #[derive(Clone, Serialize, Deserialize)]
  struct Item(String);

  impl Cacheable for Item {
    fn cache_key(&self) -> String {
      String::new()
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  impl Record for Item {
    fn progress(&self) -> Progress {
      match self.0.as_str() {
        "done" => Progress::Completed,
        "cancelled" => Progress::Cancelled,
        _ => Progress::Active,
      }
    }

    fn matches_filter(&self) -> bool {
      true
    }
  }

  #[test]
  fn test_empty_collection_has_zero_rate() {
    let stats = CollectionStats::from_records::<Item>(&[]);
    assert_eq!(stats, CollectionStats::default());
  }

  #[test]
  fn test_cancelled_counts_toward_total_only() {
    let items: Vec<Item> = ["done", "open", "open", "cancelled"]
      .into_iter()
      .map(|s| Item(s.to_string()))
      .collect();
    let stats = CollectionStats::from_records(&items);

    assert_eq!(stats.total, 4);
    assert_eq!(stats.active, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.completion_rate, 25.0);
  }
}
