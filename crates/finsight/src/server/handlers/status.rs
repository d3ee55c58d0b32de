//! Status, health and version endpoint handlers

use axum::{extract::State, response::Json};
use uuid::Uuid;

use crate::server::routing::ENDPOINTS;
use crate::server::state::AppState;
use crate::server::types::{ApiInfoResponse, ApiVersions, BaseResponse, HealthResponse, VersionResponse};

/// GET /api/v1/health - Index and store status, no side effects
pub async fn health(State(state): State<AppState>) -> Json<BaseResponse<HealthResponse>> {
  let stats = state.index.stats();

  let response = HealthResponse {
    status: if stats.built { "ready" } else { "initializing" }.to_string(),
    index_built: stats.built,
    index_size: stats.size,
    dimension: stats.dimension,
    model: stats.model,
    built_at: stats.built_at,
    transactions: state.store.len(),
    dropped_stale_ids: state.pipeline.dropped_stale_ids(),
  };

  Json(BaseResponse::success(response, Uuid::new_v4()))
}

/// GET /version - Returns current API version
pub async fn version() -> Json<BaseResponse<VersionResponse>> {
  let response = VersionResponse { version: env!("CARGO_PKG_VERSION").to_string() };
  Json(BaseResponse::success(response, Uuid::new_v4()))
}

/// GET /api - Returns API information and supported versions
pub async fn api_info() -> Json<BaseResponse<ApiInfoResponse>> {
  let version = env!("CARGO_PKG_VERSION");
  let response = ApiInfoResponse {
    latest: version.to_string(),
    versions: ApiVersions { latest: version.to_string(), active: vec![version.to_string()] },
    endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
  };

  Json(BaseResponse::success(response, Uuid::new_v4()))
}
