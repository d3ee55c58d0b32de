//! REST API types with schemars annotations for OpenAPI generation

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::{QueryFilters, ScoredTransaction};

// Envelope
// ========

/// Envelope around every API payload
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BaseResponse<T> {
  /// Version the request resolved to
  pub versioning: VersionInfo,

  /// Request id, matching the `request_id` of this request's log lines.
  /// Unrelated to financial transaction ids.
  pub transaction_id: Uuid,

  /// Empty on success
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub errors: Vec<ApiError>,

  /// Endpoint payload, flattened into the envelope
  #[serde(flatten)]
  pub data: T,
}

/// Latest, requested and resolved API versions
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct VersionInfo {
  pub latest: String,
  pub requested: String,
  pub resolved: String,
}

/// One failure reported by an endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiError {
  /// Error key, stable per failure kind
  pub key: String,

  pub message: String,

  /// Structured details such as limits or ids; null when there are none
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub context: serde_json::Value,
}

// Status/Version Endpoints
// =======================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct VersionResponse {
  pub version: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiInfoResponse {
  pub latest: String,
  pub versions: ApiVersions,
  /// Routes served by this build
  pub endpoints: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiVersions {
  pub latest: String,
  pub active: Vec<String>,
}

/// Response for /api/v1/health
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
  /// "ready" once an index is live, "initializing" before
  pub status: String,
  pub index_built: bool,
  pub index_size: usize,
  pub dimension: Option<usize>,
  pub model: Option<String>,
  pub built_at: Option<DateTime<Utc>>,
  pub transactions: usize,
  pub dropped_stale_ids: u64,
}

// Logs Endpoint
// =============

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LogsResponse {
  pub logs: Vec<LogEntry>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LogsQuery {
  pub limit: Option<usize>,
  pub level: Option<String>,
}

pub type LogEntry = ledgerlog::service_logs::LogEntry;

pub type LogContext = ledgerlog::service_logs::LogContext;

// Search Endpoints
// ================

/// Query string of /api/v1/search
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
  /// Natural-language query text
  pub query: Option<String>,
  pub user_id: Option<String>,
  pub top_k: Option<usize>,
  pub category: Option<String>,
  #[serde(rename = "type")]
  pub txn_type: Option<String>,
  pub min_amount: Option<f64>,
  pub max_amount: Option<f64>,
  pub month: Option<String>,
  pub description_contains: Option<String>,
  /// Similarity floor for this request, within -1..=1
  pub min_score: Option<f32>,
}

/// Response for /api/v1/search
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchResponse {
  pub query: String,
  pub top_k: usize,
  pub user_id: Option<String>,
  #[serde(skip_serializing_if = "QueryFilters::is_empty", default)]
  pub filters: QueryFilters,
  pub results_found: usize,
  pub results: Vec<ScoredTransaction>,
  pub dropped_ids: Vec<String>,
  pub candidates_examined: usize,
  pub retried: bool,
}

// Helper Functions
// ================

fn version_info() -> VersionInfo {
  let version = env!("CARGO_PKG_VERSION");
  VersionInfo {
    latest: version.to_string(),
    requested: version.to_string(),
    resolved: version.to_string(),
  }
}

impl<T> BaseResponse<T> {
  /// Create a successful response
  pub fn success(data: T, transaction_id: Uuid) -> Self {
    Self { versioning: version_info(), transaction_id, errors: Vec::new(), data }
  }

  /// Create an error response
  pub fn error(errors: Vec<ApiError>, transaction_id: Uuid) -> BaseResponse<()> {
    BaseResponse { versioning: version_info(), transaction_id, errors, data: () }
  }
}

impl ApiError {
  pub fn new(key: &str, message: &str) -> Self {
    Self { key: key.to_string(), message: message.to_string(), context: serde_json::Value::Null }
  }

  pub fn with_context(mut self, context: serde_json::Value) -> Self {
    self.context = context;
    self
  }
}
