use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Pending,
  InProgress,
  WaitingSparepart,
  Completed,
  Cancelled,
}

impl JobStatus {
  pub const ALL: [JobStatus; 5] = [
    JobStatus::Pending,
    JobStatus::InProgress,
    JobStatus::WaitingSparepart,
    JobStatus::Completed,
    JobStatus::Cancelled,
  ];

  /// Wire name used by the API
  pub fn as_str(&self) -> &'static str {
    match self {
      JobStatus::Pending => "pending",
      JobStatus::InProgress => "in_progress",
      JobStatus::WaitingSparepart => "waiting_sparepart",
      JobStatus::Completed => "completed",
      JobStatus::Cancelled => "cancelled",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      JobStatus::Pending => "Pending",
      JobStatus::InProgress => "In Progress",
      JobStatus::WaitingSparepart => "Waiting Sparepart",
      JobStatus::Completed => "Completed",
      JobStatus::Cancelled => "Cancelled",
    }
  }
}

impl FromStr for JobStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
    JobStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == normalized)
      .ok_or_else(|| format!("Unknown job status '{}'", s))
  }
}

impl fmt::Display for JobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

impl Priority {
  pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

  pub fn as_str(&self) -> &'static str {
    match self {
      Priority::Low => "low",
      Priority::Medium => "medium",
      Priority::High => "high",
    }
  }
}

impl FromStr for Priority {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase();
    Priority::ALL
      .into_iter()
      .find(|p| p.as_str() == normalized)
      .ok_or_else(|| format!("Unknown priority '{}'", s))
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Room within a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
  pub room_id: String,
  pub name: String,
  pub room_type: String,
  pub is_active: bool,
}

/// Job subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
  pub id: String,
  pub title: String,
  pub description: Option<String>,
}

/// Maintenance job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub job_id: String,
  pub description: String,
  pub remarks: Option<String>,
  pub status: JobStatus,
  pub priority: Priority,
  pub is_defective: bool,
  pub is_preventivemaintenance: bool,
  pub property_id: Option<String>,
  pub rooms: Vec<Room>,
  pub topics: Vec<Topic>,
  pub user: Option<String>,
  pub updated_by: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
  Pending,
  Completed,
  Overdue,
  Cancelled,
}

impl MaintenanceStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      MaintenanceStatus::Pending => "pending",
      MaintenanceStatus::Completed => "completed",
      MaintenanceStatus::Overdue => "overdue",
      MaintenanceStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for MaintenanceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Scheduled preventive maintenance task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceTask {
  pub pm_id: String,
  pub job_id: Option<String>,
  pub property_id: Option<String>,
  pub scheduled_date: Option<DateTime<Utc>>,
  pub completed_date: Option<DateTime<Utc>>,
  pub frequency: Option<String>,
  pub notes: Option<String>,
  pub status: MaintenanceStatus,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

/// Property (site) a user has access to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
  /// Public property code, e.g. "P1A2B3C4"
  pub id: String,
  pub name: String,
  pub description: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
}

/// Profile of the authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  pub id: String,
  pub username: String,
  pub email: Option<String>,
  pub positions: Option<String>,
  pub properties: Vec<Property>,
}

/// Partial job update sent with PATCH; unset fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub remarks: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<JobStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_defective: Option<bool>,
}

impl JobUpdate {
  pub fn is_empty(&self) -> bool {
    *self == JobUpdate::default()
  }
}

/// Topic named when creating a job; the backend reuses one with the same title
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicData {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// New job sent with POST
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewJob {
  pub description: String,
  pub status: JobStatus,
  pub priority: Priority,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub remarks: Option<String>,
  pub is_defective: bool,
  pub is_preventivemaintenance: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub property_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub room_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub topic_data: Option<TopicData>,
}

impl NewJob {
  /// Reject payloads the backend would refuse.
  ///
  /// Preventive maintenance jobs need a room and a topic.
  pub fn validate(&self) -> Result<(), String> {
    if self.description.trim().is_empty() {
      return Err("description must not be empty".to_string());
    }
    if self.is_preventivemaintenance {
      if self.room_id.is_none() {
        return Err("preventive maintenance jobs need a room".to_string());
      }
      if self.topic_data.is_none() {
        return Err("preventive maintenance jobs need a topic".to_string());
      }
    }
    Ok(())
  }
}

/// Answer of the preventive-maintenance eligibility endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeEligibility {
  pub property_id: String,
  pub is_preventivemaintenance: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_job_status_parses_labels_and_wire_names() {
    assert_eq!("in_progress".parse::<JobStatus>(), Ok(JobStatus::InProgress));
    assert_eq!("In Progress".parse::<JobStatus>(), Ok(JobStatus::InProgress));
    assert_eq!("waiting-sparepart".parse::<JobStatus>(), Ok(JobStatus::WaitingSparepart));
    assert!("done".parse::<JobStatus>().is_err());
  }

  #[test]
  fn test_job_status_serializes_as_wire_name() {
    let json = serde_json::to_string(&JobStatus::WaitingSparepart).unwrap();
    assert_eq!(json, "\"waiting_sparepart\"");
  }

  #[test]
  fn test_job_update_only_sends_set_fields() {
    let update = JobUpdate {
      status: Some(JobStatus::Completed),
      ..Default::default()
    };
    let json = serde_json::to_value(&update).unwrap();
    assert_eq!(json, serde_json::json!({"status": "completed"}));
    assert!(!update.is_empty());
    assert!(JobUpdate::default().is_empty());
  }

  #[test]
  fn test_priority_parse_is_case_insensitive() {
    assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
    assert!("urgent".parse::<Priority>().is_err());
  }
  fn new_job(pm: bool) -> NewJob {
    NewJob {
      description: "Replace filter".to_string(),
      status: JobStatus::Pending,
      priority: Priority::High,
      remarks: None,
      is_defective: false,
      is_preventivemaintenance: pm,
      property_id: Some("P1".to_string()),
      room_id: None,
      topic_data: None,
    }
  }

  #[test]
  fn test_new_job_payload_uses_backend_field_names() {
    let mut job = new_job(false);
    job.room_id = Some("12".to_string());
    job.topic_data = Some(TopicData {
      title: "HVAC".to_string(),
      description: None,
    });

    let json = serde_json::to_value(&job).unwrap();

    assert_eq!(
      json,
      serde_json::json!({
        "description": "Replace filter",
        "status": "pending",
        "priority": "high",
        "is_defective": false,
        "is_preventivemaintenance": false,
        "property_id": "P1",
        "room_id": "12",
        "topic_data": {"title": "HVAC"}
      })
    );
  }

  #[test]
  fn test_new_job_validation() {
    assert!(new_job(false).validate().is_ok());

    let mut blank = new_job(false);
    blank.description = "  ".to_string();
    assert!(blank.validate().is_err());

    let mut pm = new_job(true);
    assert_eq!(
      pm.validate(),
      Err("preventive maintenance jobs need a room".to_string())
    );
    pm.room_id = Some("12".to_string());
    assert_eq!(
      pm.validate(),
      Err("preventive maintenance jobs need a topic".to_string())
    );
    pm.topic_data = Some(TopicData {
      title: "HVAC".to_string(),
      description: None,
    });
    assert!(pm.validate().is_ok());
  }
}
