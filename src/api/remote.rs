//! Binds tracker records to synchronized collections.

use color_eyre::Result;

use super::client::ApiClient;
use super::types::{Job, JobStatus, MaintenanceStatus, MaintenanceTask};
use crate::sync::{CollectionQuery, Progress, Record, RemoteSource};

impl Record for Job {
  fn progress(&self) -> Progress {
    match self.status {
      JobStatus::Completed => Progress::Completed,
      JobStatus::Cancelled => Progress::Cancelled,
      _ => Progress::Active,
    }
  }

  /// Flagged as preventive maintenance, or described as such
  fn matches_filter(&self) -> bool {
    self.is_preventivemaintenance || self.description.to_lowercase().contains("preventive")
  }
}

impl Record for MaintenanceTask {
  fn progress(&self) -> Progress {
    match self.status {
      MaintenanceStatus::Completed => Progress::Completed,
      MaintenanceStatus::Cancelled => Progress::Cancelled,
      MaintenanceStatus::Pending | MaintenanceStatus::Overdue => Progress::Active,
    }
  }

  /// Still waiting to be done
  fn matches_filter(&self) -> bool {
    matches!(
      self.status,
      MaintenanceStatus::Pending | MaintenanceStatus::Overdue
    )
  }
}

impl RemoteSource<Job> for ApiClient {
  async fn fetch(&self, query: &CollectionQuery, filtered: bool) -> Result<Vec<Job>> {
    self
      .get_jobs(query.property_id.as_deref(), query.limit, filtered)
      .await
  }

  async fn scope_eligible(&self, property_id: &str) -> Result<bool> {
    self.pm_eligible(property_id).await
  }
}

impl RemoteSource<MaintenanceTask> for ApiClient {
  async fn fetch(&self, query: &CollectionQuery, filtered: bool) -> Result<Vec<MaintenanceTask>> {
    self
      .get_maintenance_tasks(query.property_id.as_deref(), query.limit, filtered)
      .await
  }

  async fn scope_eligible(&self, property_id: &str) -> Result<bool> {
    self.pm_eligible(property_id).await
  }
}
