//! Axum router configuration for all endpoints

use axum::{
  middleware::from_fn_with_state,
  routing::{get, post},
  Router,
};

use crate::server::handlers::{index, logs, search, status};
use crate::server::middleware::request_context_middleware;
use crate::server::state::AppState;

/// Route paths, also reported by `GET /api`
pub const ENDPOINTS: &[&str] = &[
  "GET /version",
  "GET /api",
  "GET /logs",
  "GET /api/v1/health",
  "GET /api/v1/search",
  "POST /api/v1/index/rebuild",
];

/// Create the application router over shared state
pub fn create_router(state: AppState) -> Router {
  Router::new()
    // Status and version endpoints
    .route("/version", get(status::version))
    .route("/api", get(status::api_info))
    .route("/logs", get(logs::get_logs))
    // Search service
    .route("/api/v1/health", get(status::health))
    .route("/api/v1/search", get(search::search))
    .route("/api/v1/index/rebuild", post(index::rebuild))
    .layer(from_fn_with_state(state.clone(), request_context_middleware))
    .with_state(state)
}
