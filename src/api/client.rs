use crate::api::api_types::{
  normalize_items, ApiEligibility, ApiJob, ApiList, ApiMaintenanceTask, ApiProperty, ApiRoom,
  ApiTopic, ApiUserProfile,
};
use crate::api::types::{
  Job, JobStatus, JobUpdate, MaintenanceTask, NewJob, Property, Room, ScopeEligibility, Topic,
  UserProfile,
};
use crate::config::Config;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Hard stop for following `next` links on paginated endpoints
const MAX_PAGES: usize = 50;

/// REST API client wrapper
///
/// Attaches the bearer token to every request and turns non-2xx responses
/// into errors carrying a readable message. It never retries.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  token: String,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;
    Self::with_token(config, token)
  }

  pub fn with_token(config: &Config, token: String) -> Result<Self> {
    let base_url = Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .user_agent(concat!("lubd/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      token,
    })
  }

  fn url(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| eyre!("Invalid request path {}: {}", path, e))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    self.http.request(method, url).bearer_auth(&self.token)
  }

  /// Send a request and decode the JSON body. Empty bodies decode to `null`.
  async fn execute(&self, request: RequestBuilder) -> Result<Value> {
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request failed: {}", e))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response body: {}", e))?;

    if !status.is_success() {
      return Err(eyre!(error_message(status, &body)));
    }

    if body.trim().is_empty() {
      return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| eyre!("Invalid JSON in response: {}", e))
  }

  /// GET a path with query parameters
  pub async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
    let url = self.url(path)?;
    debug!(%url, ?params, "GET");
    self
      .execute(self.request(Method::GET, url).query(params))
      .await
  }

  /// Send a JSON body with the given method
  pub async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Value> {
    let url = self.url(path)?;
    debug!(%method, %url, "Sending");
    self.execute(self.request(method, url).json(body)).await
  }

  /// GET a collection, following pagination when no limit was requested.
  async fn get_list(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<Value>> {
    let limited = params.iter().any(|(k, _)| *k == "limit");
    let payload: ApiList = serde_json::from_value(self.get_json(path, params).await?)
      .map_err(|e| eyre!("Failed to parse list from {}: {}", path, e))?;

    let (mut items, mut next) = payload.into_page();
    let mut pages = 1;

    while let Some(next_url) = next.take() {
      if limited || pages >= MAX_PAGES {
        break;
      }
      let url = Url::parse(&next_url).map_err(|e| eyre!("Invalid next page url: {}", e))?;
      let value = self.execute(self.request(Method::GET, url)).await?;
      let page: ApiList =
        serde_json::from_value(value).map_err(|e| eyre!("Failed to parse list page: {}", e))?;
      let (page_items, page_next) = page.into_page();
      items.extend(page_items);
      next = page_next;
      pages += 1;
    }

    Ok(items)
  }

  /// Get jobs, optionally scoped to a property and restricted to preventive maintenance
  pub async fn get_jobs(
    &self,
    property_id: Option<&str>,
    limit: Option<u32>,
    preventive_only: bool,
  ) -> Result<Vec<Job>> {
    let mut params = scope_params(property_id, limit);
    if preventive_only {
      params.push(("is_preventivemaintenance", "true".to_string()));
    }

    let items = self
      .get_list("/api/jobs/", &params)
      .await
      .map_err(|e| eyre!("Failed to get jobs: {}", e))?;
    Ok(normalize_items(items, ApiJob::into_job))
  }

  /// Get a single job by id
  pub async fn get_job(&self, job_id: &str) -> Result<Job> {
    let value = self
      .get_json(&format!("/api/jobs/{}/", job_id), &[])
      .await
      .map_err(|e| eyre!("Failed to get job {}: {}", job_id, e))?;
    decode_job(value, job_id)
  }

  /// Create a job, returning the server's copy with its assigned id
  pub async fn create_job(&self, job: &NewJob) -> Result<Job> {
    job
      .validate()
      .map_err(|e| eyre!("Invalid job: {}", e))?;
    let body = serde_json::to_value(job).map_err(|e| eyre!("Failed to encode job: {}", e))?;
    let value = self
      .send_json(Method::POST, "/api/jobs/", &body)
      .await
      .map_err(|e| eyre!("Failed to create job: {}", e))?;
    decode_job(value, "(new)")
  }

  /// Apply a partial update to a job, returning the server's copy
  pub async fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<Job> {
    let body = serde_json::to_value(update).map_err(|e| eyre!("Failed to encode update: {}", e))?;
    let value = self
      .send_json(Method::PATCH, &format!("/api/jobs/{}/", job_id), &body)
      .await
      .map_err(|e| eyre!("Failed to update job {}: {}", job_id, e))?;
    decode_job(value, job_id)
  }

  /// Change a job's status through the backend's status action
  pub async fn update_job_status(&self, job_id: &str, status: JobStatus) -> Result<Job> {
    let body = serde_json::json!({ "status": status.as_str() });
    let value = self
      .send_json(
        Method::PATCH,
        &format!("/api/jobs/{}/update_status/", job_id),
        &body,
      )
      .await
      .map_err(|e| eyre!("Failed to update status of job {}: {}", job_id, e))?;
    decode_job(value, job_id)
  }

  /// Delete a job
  pub async fn delete_job(&self, job_id: &str) -> Result<()> {
    let url = self.url(&format!("/api/jobs/{}/", job_id))?;
    self
      .execute(self.request(Method::DELETE, url))
      .await
      .map_err(|e| eyre!("Failed to delete job {}: {}", job_id, e))?;
    Ok(())
  }

  /// Get preventive maintenance tasks
  pub async fn get_maintenance_tasks(
    &self,
    property_id: Option<&str>,
    limit: Option<u32>,
    pending_only: bool,
  ) -> Result<Vec<MaintenanceTask>> {
    let mut params = scope_params(property_id, limit);
    if pending_only {
      params.push(("status", "pending".to_string()));
    }

    let items = self
      .get_list("/api/preventive-maintenance/", &params)
      .await
      .map_err(|e| eyre!("Failed to get preventive maintenance: {}", e))?;
    Ok(normalize_items(items, ApiMaintenanceTask::into_task))
  }

  /// Mark a preventive maintenance task as done
  pub async fn complete_maintenance(
    &self,
    pm_id: &str,
    notes: Option<&str>,
  ) -> Result<MaintenanceTask> {
    let body = match notes {
      Some(n) => serde_json::json!({ "completion_notes": n }),
      None => serde_json::json!({}),
    };
    let value = self
      .send_json(
        Method::POST,
        &format!("/api/preventive-maintenance/{}/complete/", pm_id),
        &body,
      )
      .await
      .map_err(|e| eyre!("Failed to complete maintenance {}: {}", pm_id, e))?;

    let raw: ApiMaintenanceTask = serde_json::from_value(value)
      .map_err(|e| eyre!("Failed to parse maintenance {}: {}", pm_id, e))?;
    raw
      .into_task()
      .ok_or_else(|| eyre!("Maintenance {} response has no id", pm_id))
  }

  /// Ask whether a property runs preventive maintenance
  pub async fn check_pm_eligibility(&self, property_id: &str) -> Result<ScopeEligibility> {
    let value = self
      .get_json(
        &format!("/api/properties/{}/is_preventivemaintenance/", property_id),
        &[],
      )
      .await?;
    let raw: ApiEligibility = serde_json::from_value(value)
      .map_err(|e| eyre!("Failed to parse eligibility for {}: {}", property_id, e))?;
    Ok(raw.into_eligibility(property_id))
  }

  /// Eligibility as a plain flag, logged for both collection kinds
  pub(super) async fn pm_eligible(&self, property_id: &str) -> Result<bool> {
    let eligibility = self.check_pm_eligibility(property_id).await?;
    debug!(
      property = %eligibility.property_id,
      eligible = eligibility.is_preventivemaintenance,
      "Checked preventive maintenance eligibility"
    );
    Ok(eligibility.is_preventivemaintenance)
  }

  /// Get the properties visible to the current user
  pub async fn get_properties(&self) -> Result<Vec<Property>> {
    let items = self
      .get_list("/api/properties/", &[])
      .await
      .map_err(|e| eyre!("Failed to get properties: {}", e))?;
    Ok(normalize_items(items, ApiProperty::into_property))
  }

  /// Get rooms, optionally for one property
  pub async fn get_rooms(&self, property_id: Option<&str>) -> Result<Vec<Room>> {
    let params = scope_params(property_id, None);
    let items = self
      .get_list("/api/rooms/", &params)
      .await
      .map_err(|e| eyre!("Failed to get rooms: {}", e))?;
    Ok(normalize_items(items, ApiRoom::into_room))
  }

  /// Get all topics
  pub async fn get_topics(&self) -> Result<Vec<Topic>> {
    let items = self
      .get_list("/api/topics/", &[])
      .await
      .map_err(|e| eyre!("Failed to get topics: {}", e))?;
    Ok(normalize_items(items, ApiTopic::into_topic))
  }

  /// Get the profile of the token's owner
  pub async fn get_profile(&self) -> Result<UserProfile> {
    let value = self
      .get_json("/api/user-profiles/me/", &[])
      .await
      .map_err(|e| eyre!("Failed to get user profile: {}", e))?;
    let raw: ApiUserProfile =
      serde_json::from_value(value).map_err(|e| eyre!("Failed to parse user profile: {}", e))?;
    Ok(raw.into_profile())
  }

  /// Check that the backend is reachable
  pub async fn health(&self) -> Result<()> {
    self.get_json("/api/health/", &[]).await?;
    Ok(())
  }
}

fn scope_params(property_id: Option<&str>, limit: Option<u32>) -> Vec<(&'static str, String)> {
  let mut params = Vec::new();
  if let Some(p) = property_id {
    params.push(("property_id", p.to_string()));
  }
  if let Some(l) = limit {
    params.push(("limit", l.to_string()));
  }
  params
}

fn decode_job(value: Value, job_id: &str) -> Result<Job> {
  let raw: ApiJob =
    serde_json::from_value(value).map_err(|e| eyre!("Failed to parse job {}: {}", job_id, e))?;
  raw
    .into_job()
    .ok_or_else(|| eyre!("Job {} response has no id", job_id))
}

/// Build a readable message from an error response.
///
/// Understands the backend's `{"detail": ...}`, `{"error": ...}` and
/// per-field validation maps; falls back to the status line.
pub fn error_message(status: StatusCode, body: &str) -> String {
  let fallback = || {
    format!(
      "{} {}",
      status.as_u16(),
      status.canonical_reason().unwrap_or("Error")
    )
  };

  let Ok(value) = serde_json::from_str::<Value>(body) else {
    let text = body.trim();
    if text.is_empty() || text.starts_with('<') || text.len() > 200 {
      return fallback();
    }
    return format!("{}: {}", fallback(), text);
  };

  let detail = match &value {
    Value::Object(map) => ["detail", "error", "message"]
      .iter()
      .find_map(|k| map.get(*k).and_then(flatten_messages))
      .or_else(|| {
        let fields: Vec<String> = map
          .iter()
          .filter_map(|(field, v)| flatten_messages(v).map(|m| format!("{}: {}", field, m)))
          .collect();
        (!fields.is_empty()).then(|| fields.join("; "))
      }),
    other => flatten_messages(other),
  };

  match detail {
    Some(d) => format!("{}: {}", fallback(), d),
    None => fallback(),
  }
}

fn flatten_messages(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Value::Array(items) => {
      let parts: Vec<String> = items.iter().filter_map(flatten_messages).collect();
      (!parts.is_empty()).then(|| parts.join(", "))
    }
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_message_uses_detail() {
    let msg = error_message(
      StatusCode::UNAUTHORIZED,
      r#"{"detail": "Given token not valid for any token type"}"#,
    );
    assert_eq!(
      msg,
      "401 Unauthorized: Given token not valid for any token type"
    );
  }

  #[test]
  fn test_error_message_flattens_field_errors() {
    let msg = error_message(
      StatusCode::BAD_REQUEST,
      r#"{"status": ["\"done\" is not a valid choice."]}"#,
    );
    assert_eq!(msg, "400 Bad Request: status: \"done\" is not a valid choice.");
  }

  #[test]
  fn test_error_message_ignores_html_bodies() {
    let msg = error_message(
      StatusCode::BAD_GATEWAY,
      "<html><body>Bad gateway</body></html>",
    );
    assert_eq!(msg, "502 Bad Gateway");
  }

  #[test]
  fn test_error_message_keeps_short_plain_text() {
    let msg = error_message(StatusCode::SERVICE_UNAVAILABLE, "maintenance window");
    assert_eq!(msg, "503 Service Unavailable: maintenance window");
  }

  #[test]
  fn test_scope_params() {
    assert!(scope_params(None, None).is_empty());
    assert_eq!(
      scope_params(Some("P1"), Some(10)),
      vec![("property_id", "P1".to_string()), ("limit", "10".to_string())]
    );
  }
  #[tokio::test]
  async fn test_create_job_rejects_incomplete_pm_job_before_sending() {
    let config: Config =
      serde_yaml::from_str("api:\n  url: http://127.0.0.1:9\n  timeout_secs: 2\n").unwrap();
    let client = ApiClient::with_token(&config, "token".to_string()).unwrap();
    let job = NewJob {
      description: "Quarterly chiller service".to_string(),
      status: JobStatus::Pending,
      priority: crate::api::types::Priority::Medium,
      remarks: None,
      is_defective: false,
      is_preventivemaintenance: true,
      property_id: Some("P1".to_string()),
      room_id: None,
      topic_data: None,
    };

    let err = client.create_job(&job).await.unwrap_err();

    assert_eq!(
      err.to_string(),
      "Invalid job: preventive maintenance jobs need a room"
    );
  }
}
