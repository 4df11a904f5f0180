//! Serde-deserializable types matching the REST API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs. Every payload goes
//! through here exactly once: identifiers that arrive as strings, numbers or
//! nested objects are normalized to `String`, timestamps are parsed leniently,
//! and records that cannot be understood are dropped with a warning.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::warn;

use super::types::{
  Job, JobStatus, MaintenanceStatus, MaintenanceTask, Priority, Property, Room,
  ScopeEligibility, Topic, UserProfile,
};

// ============================================================================
// Normalization helpers
// ============================================================================

/// Normalize an identifier that may be a string, a number or an object.
///
/// For objects, `keys` are tried in order (e.g. `["property_id", "id"]`).
pub fn normalize_id(value: &Value, keys: &[&str]) -> Option<String> {
  match value {
    Value::String(s) => {
      let s = s.trim();
      (!s.is_empty()).then(|| s.to_string())
    }
    Value::Number(n) => Some(n.to_string()),
    Value::Object(map) => keys
      .iter()
      .filter_map(|k| map.get(*k))
      .find_map(|v| normalize_id(v, keys)),
    _ => None,
  }
}

/// Parse a timestamp in any of the formats the backend emits.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
  let s = value.as_str()?.trim();
  if s.is_empty() {
    return None;
  }

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
    return Some(dt.and_utc());
  }
  if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
  }

  warn!(value = s, "Unparseable timestamp");
  None
}

/// Collection payload: either a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiList {
  Bare(Vec<Value>),
  Paginated {
    #[serde(default)]
    next: Option<String>,
    results: Vec<Value>,
  },
  Other(Value),
}

impl ApiList {
  /// Split into the page items and the next page URL, if any.
  pub fn into_page(self) -> (Vec<Value>, Option<String>) {
    match self {
      ApiList::Bare(items) => (items, None),
      ApiList::Paginated { results, next } => (results, next),
      ApiList::Other(value) => {
        warn!(kind = value_kind(&value), "Expected a list payload, treating as empty");
        (Vec::new(), None)
      }
    }
  }
}

fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// Decode each item as `R` and convert it, skipping items that don't fit.
pub fn normalize_items<R, T>(items: Vec<Value>, convert: impl Fn(R) -> Option<T>) -> Vec<T>
where
  R: DeserializeOwned,
{
  let total = items.len();
  let records: Vec<T> = items
    .into_iter()
    .filter_map(|item| match serde_json::from_value::<R>(item) {
      Ok(raw) => convert(raw),
      Err(e) => {
        warn!(error = %e, "Skipping malformed record");
        None
      }
    })
    .collect();

  if records.len() != total {
    warn!(kept = records.len(), total, "Some records were dropped during normalization");
  }
  records
}

// ============================================================================
// Rooms, topics, properties
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiRoom {
  #[serde(default)]
  pub room_id: Value,
  #[serde(default)]
  pub id: Value,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub room_type: String,
  #[serde(default)]
  pub is_active: Option<bool>,
}

impl ApiRoom {
  pub fn into_room(self) -> Option<Room> {
    let room_id = normalize_id(&self.room_id, &["room_id", "id"])
      .or_else(|| normalize_id(&self.id, &["room_id", "id"]))?;
    Some(Room {
      room_id,
      name: self.name.trim().to_string(),
      room_type: self.room_type,
      is_active: self.is_active.unwrap_or(true),
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiTopic {
  #[serde(default)]
  pub id: Value,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
}

impl ApiTopic {
  pub fn into_topic(self) -> Option<Topic> {
    Some(Topic {
      id: normalize_id(&self.id, &["id"])?,
      title: self.title,
      description: self.description,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiProperty {
  #[serde(default)]
  pub id: Value,
  #[serde(default)]
  pub property_id: Value,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub created_at: Value,
}

impl ApiProperty {
  pub fn into_property(self) -> Option<Property> {
    let id = normalize_id(&self.property_id, &["property_id", "id"])
      .or_else(|| normalize_id(&self.id, &["property_id", "id"]))?;
    Some(Property {
      id,
      name: self.name,
      description: self.description,
      created_at: parse_timestamp(&self.created_at),
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiUserProfile {
  #[serde(default)]
  pub id: Value,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub positions: Option<String>,
  #[serde(default)]
  pub properties: Vec<Value>,
}

impl ApiUserProfile {
  pub fn into_profile(self) -> UserProfile {
    UserProfile {
      id: normalize_id(&self.id, &["id"]).unwrap_or_default(),
      username: self.username,
      email: self.email.filter(|e| !e.is_empty()),
      positions: self.positions,
      properties: normalize_items(self.properties, ApiProperty::into_property),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiEligibility {
  #[serde(default)]
  pub property_id: Value,
  #[serde(default)]
  pub is_preventivemaintenance: bool,
}

impl ApiEligibility {
  pub fn into_eligibility(self, requested: &str) -> ScopeEligibility {
    ScopeEligibility {
      property_id: normalize_id(&self.property_id, &["property_id", "id"])
        .unwrap_or_else(|| requested.to_string()),
      is_preventivemaintenance: self.is_preventivemaintenance,
    }
  }
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiJob {
  #[serde(default)]
  pub id: Value,
  #[serde(default)]
  pub job_id: Value,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub remarks: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub priority: Option<String>,
  #[serde(default)]
  pub is_defective: Option<bool>,
  #[serde(default)]
  pub is_preventivemaintenance: Option<bool>,
  #[serde(default)]
  pub property_id: Value,
  #[serde(default)]
  pub property: Value,
  #[serde(default)]
  pub rooms: Vec<ApiRoom>,
  #[serde(default)]
  pub topics: Vec<ApiTopic>,
  #[serde(default)]
  pub user: Value,
  #[serde(default)]
  pub updated_by: Value,
  #[serde(default)]
  pub created_at: Value,
  #[serde(default)]
  pub updated_at: Value,
  #[serde(default)]
  pub completed_at: Value,
  #[serde(default)]
  pub due_date: Value,
}

impl ApiJob {
  pub fn into_job(self) -> Option<Job> {
    let job_id =
      normalize_id(&self.job_id, &["job_id", "id"]).or_else(|| normalize_id(&self.id, &["id"]))?;

    let status = match self.status.as_deref() {
      Some(s) => s.parse().unwrap_or_else(|e: String| {
        warn!(job_id = %job_id, error = %e, "Treating unknown status as pending");
        JobStatus::Pending
      }),
      None => JobStatus::Pending,
    };
    let priority = self
      .priority
      .as_deref()
      .and_then(|p| p.parse::<Priority>().ok())
      .unwrap_or_default();

    let created_at = parse_timestamp(&self.created_at).unwrap_or_default();
    let property_id = normalize_id(&self.property_id, &["property_id", "id"])
      .or_else(|| normalize_id(&self.property, &["property_id", "id"]));

    Some(Job {
      description: self.description.unwrap_or_default(),
      remarks: self.remarks.filter(|r| !r.trim().is_empty()),
      status,
      priority,
      is_defective: self.is_defective.unwrap_or(false),
      is_preventivemaintenance: self.is_preventivemaintenance.unwrap_or(false),
      property_id,
      rooms: self.rooms.into_iter().filter_map(ApiRoom::into_room).collect(),
      topics: self
        .topics
        .into_iter()
        .filter_map(ApiTopic::into_topic)
        .collect(),
      user: normalize_id(&self.user, &["username", "name", "id"]),
      updated_by: normalize_id(&self.updated_by, &["username", "name", "id"]),
      created_at,
      updated_at: parse_timestamp(&self.updated_at).unwrap_or(created_at),
      completed_at: parse_timestamp(&self.completed_at),
      due_date: parse_timestamp(&self.due_date),
      job_id,
    })
  }
}

// ============================================================================
// Preventive maintenance
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiMaintenanceTask {
  #[serde(default)]
  pub pm_id: Value,
  #[serde(default)]
  pub id: Value,
  #[serde(default)]
  pub job_id: Value,
  #[serde(default)]
  pub job: Value,
  #[serde(default)]
  pub property_id: Value,
  #[serde(default)]
  pub scheduled_date: Value,
  #[serde(default)]
  pub completed_date: Value,
  #[serde(default)]
  pub frequency: Option<String>,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub created_at: Value,
  #[serde(default)]
  pub updated_at: Value,
}

impl ApiMaintenanceTask {
  pub fn into_task(self) -> Option<MaintenanceTask> {
    let pm_id =
      normalize_id(&self.pm_id, &["pm_id", "id"]).or_else(|| normalize_id(&self.id, &["id"]))?;
    let completed_date = parse_timestamp(&self.completed_date);

    let status = match self.status.as_deref().map(|s| s.trim().to_lowercase()) {
      Some(s) if s == "completed" => MaintenanceStatus::Completed,
      Some(s) if s == "overdue" => MaintenanceStatus::Overdue,
      Some(s) if s == "cancelled" => MaintenanceStatus::Cancelled,
      Some(s) if s == "pending" => MaintenanceStatus::Pending,
      _ if completed_date.is_some() => MaintenanceStatus::Completed,
      _ => MaintenanceStatus::Pending,
    };

    Some(MaintenanceTask {
      job_id: normalize_id(&self.job_id, &["job_id", "id"])
        .or_else(|| normalize_id(&self.job, &["job_id", "id"])),
      property_id: normalize_id(&self.property_id, &["property_id", "id"]),
      scheduled_date: parse_timestamp(&self.scheduled_date),
      completed_date,
      frequency: self.frequency,
      notes: self.notes.filter(|n| !n.trim().is_empty()),
      status,
      created_at: parse_timestamp(&self.created_at),
      updated_at: parse_timestamp(&self.updated_at),
      pm_id,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_normalize_id_shapes() {
    let keys = &["property_id", "id"];
    assert_eq!(normalize_id(&json!("P1"), keys), Some("P1".to_string()));
    assert_eq!(normalize_id(&json!(42), keys), Some("42".to_string()));
    assert_eq!(
      normalize_id(&json!({"property_id": "P9", "name": "Hotel"}), keys),
      Some("P9".to_string())
    );
    assert_eq!(normalize_id(&json!({"id": 7}), keys), Some("7".to_string()));
    assert_eq!(normalize_id(&json!(""), keys), None);
    assert_eq!(normalize_id(&Value::Null, keys), None);
  }

  #[test]
  fn test_list_accepts_bare_and_paginated() {
    let bare: ApiList = serde_json::from_value(json!([{"a": 1}, {"a": 2}])).unwrap();
    assert_eq!(bare.into_page().0.len(), 2);

    let paged: ApiList = serde_json::from_value(json!({
      "count": 3,
      "next": "https://api.example.com/api/jobs/?page=2",
      "previous": null,
      "results": [{"a": 1}]
    }))
    .unwrap();
    let (items, next) = paged.into_page();
    assert_eq!(items.len(), 1);
    assert!(next.is_some());
  }

  #[test]
  fn test_list_coerces_unexpected_shape_to_empty() {
    let other: ApiList = serde_json::from_value(json!({"detail": "nope"})).unwrap();
    let (items, next) = other.into_page();
    assert!(items.is_empty());
    assert!(next.is_none());
  }

  #[test]
  fn test_job_normalization() {
    let raw = json!({
      "id": 12,
      "job_id": "j24A1B2C3",
      "description": "Replace filter",
      "remarks": "",
      "status": "in_progress",
      "priority": "high",
      "is_preventivemaintenance": true,
      "property": {"property_id": "P1", "name": "Tower"},
      "rooms": [{"room_id": 5, "name": " 101 ", "room_type": "Guest"}],
      "topics": [{"id": 3, "title": "HVAC"}],
      "user": "alice",
      "created_at": "2024-03-01T08:00:00+07:00",
      "updated_at": "2024-03-02T08:00:00Z",
      "due_date": "2024-04-01"
    });

    let jobs = normalize_items(vec![raw], ApiJob::into_job);
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.job_id, "j24A1B2C3");
    assert_eq!(job.status, JobStatus::InProgress);
    assert_eq!(job.priority, Priority::High);
    assert_eq!(job.property_id.as_deref(), Some("P1"));
    assert_eq!(job.rooms[0].room_id, "5");
    assert_eq!(job.rooms[0].name, "101");
    assert_eq!(job.topics[0].id, "3");
    assert_eq!(job.remarks, None);
    assert_eq!(job.user.as_deref(), Some("alice"));
    assert_eq!(job.created_at.to_rfc3339(), "2024-03-01T01:00:00+00:00");
    assert!(job.due_date.is_some());
  }

  #[test]
  fn test_job_without_any_id_is_dropped() {
    let jobs = normalize_items(
      vec![json!({"description": "orphan"}), json!({"id": 1})],
      ApiJob::into_job,
    );
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, "1");
  }

  #[test]
  fn test_unknown_job_status_becomes_pending() {
    let jobs = normalize_items(vec![json!({"job_id": "j1", "status": "archived"})], ApiJob::into_job);
    assert_eq!(jobs[0].status, JobStatus::Pending);
  }

  #[test]
  fn test_maintenance_status_derived_from_completion() {
    let tasks = normalize_items(
      vec![json!({"pm_id": "pm1", "completed_date": "2024-05-01T10:00:00Z"})],
      ApiMaintenanceTask::into_task,
    );
    assert_eq!(tasks[0].status, MaintenanceStatus::Completed);
  }

  #[test]
  fn test_property_prefers_public_code() {
    let props = normalize_items(
      vec![json!({"id": 4, "property_id": "PABCDEF01", "name": "Resort"})],
      ApiProperty::into_property,
    );
    assert_eq!(props[0].id, "PABCDEF01");
  }
}
