//! Client-side filtering, sorting and paging over loaded jobs.

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::api::types::{Job, JobStatus, Priority};

/// Field used to group jobs into tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facet {
  #[default]
  Status,
  Priority,
  Room,
}

impl Facet {
  /// Extract the values of this facet from a job
  fn extract(&self, job: &Job) -> Vec<String> {
    match self {
      Facet::Status => vec![job.status.as_str().to_string()],
      Facet::Priority => vec![job.priority.as_str().to_string()],
      Facet::Room => job.rooms.iter().map(|r| r.name.clone()).collect(),
    }
  }

  /// Distinct values present in `jobs`, sorted
  pub fn unique_values(&self, jobs: &[Job]) -> Vec<String> {
    let values: BTreeSet<String> = jobs.iter().flat_map(|j| self.extract(j)).collect();
    values.into_iter().collect()
  }

  /// Number of jobs carrying `value`
  pub fn count(&self, jobs: &[Job], value: &str) -> usize {
    jobs
      .iter()
      .filter(|j| self.extract(j).iter().any(|v| v == value))
      .count()
  }
}

impl FromStr for Facet {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "status" => Ok(Facet::Status),
      "priority" => Ok(Facet::Priority),
      "room" | "rooms" => Ok(Facet::Room),
      other => Err(format!(
        "Unknown facet '{}' (expected status, priority or room)",
        other
      )),
    }
  }
}

/// Criteria a job must meet to be listed. Unset criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
  pub status: Option<JobStatus>,
  pub priority: Option<Priority>,
  /// Case-insensitive text matched against description, remarks, rooms and topics
  pub search: Option<String>,
  pub defective_only: bool,
}

impl JobFilter {
  pub fn matches(&self, job: &Job) -> bool {
    if self.status.is_some_and(|s| s != job.status) {
      return false;
    }
    if self.priority.is_some_and(|p| p != job.priority) {
      return false;
    }
    if self.defective_only && !job.is_defective {
      return false;
    }

    match self.search.as_deref().map(str::trim) {
      Some(query) if !query.is_empty() => {
        let query = query.to_lowercase();
        let contains = |text: &str| text.to_lowercase().contains(&query);
        contains(&job.description)
          || contains(&job.job_id)
          || job.remarks.as_deref().is_some_and(contains)
          || job.rooms.iter().any(|r| contains(&r.name))
          || job.topics.iter().any(|t| contains(&t.title))
      }
      _ => true,
    }
  }

  pub fn apply<'a>(&self, jobs: &'a [Job]) -> Vec<&'a Job> {
    jobs.iter().filter(|j| self.matches(j)).collect()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
  #[default]
  Newest,
  Oldest,
  /// High priority first, newest first within a priority
  Priority,
  /// Workflow order, newest first within a status
  Status,
}

impl SortOrder {
  pub fn sort(&self, jobs: &mut [&Job]) {
    match self {
      SortOrder::Newest => jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
      SortOrder::Oldest => jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
      SortOrder::Priority => jobs.sort_by(|a, b| {
        b.priority
          .cmp(&a.priority)
          .then_with(|| b.created_at.cmp(&a.created_at))
      }),
      SortOrder::Status => jobs.sort_by(|a, b| {
        a.status
          .cmp(&b.status)
          .then_with(|| b.created_at.cmp(&a.created_at))
      }),
    }
  }
}

impl FromStr for SortOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "newest" => Ok(SortOrder::Newest),
      "oldest" => Ok(SortOrder::Oldest),
      "priority" => Ok(SortOrder::Priority),
      "status" => Ok(SortOrder::Status),
      other => Err(format!(
        "Unknown sort order '{}' (expected newest, oldest, priority or status)",
        other
      )),
    }
  }
}

/// One page of a list
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
  pub items: Vec<T>,
  /// 1-based, clamped to the last page
  pub page: usize,
  pub total_pages: usize,
  pub total_items: usize,
}

/// Slice `items` into pages of `per_page`. Page numbers start at 1.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
  let per_page = per_page.max(1);
  let total_items = items.len();
  let total_pages = total_items.div_ceil(per_page).max(1);
  let page = page.clamp(1, total_pages);
  let start = (page - 1) * per_page;

  Page {
    items: items.iter().skip(start).take(per_page).cloned().collect(),
    page,
    total_pages,
    total_items,
  }
}
