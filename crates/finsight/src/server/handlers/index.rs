//! Index maintenance handler

use axum::{
  extract::{Extension, State},
  response::Json,
};

use crate::index::RebuildReport;
use crate::server::handlers::{error_response, HandlerError};
use crate::server::middleware::RequestContext;
use crate::server::state::AppState;
use crate::server::types::BaseResponse;

/// POST /api/v1/index/rebuild - Re-embed the store and swap in a new index
pub async fn rebuild(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> Result<Json<BaseResponse<RebuildReport>>, HandlerError> {
  let transaction_id = context.request_id;
  context.log_info("Index rebuild requested", "index-api").await;

  match state.index.rebuild(&state.store, state.provider.as_ref()).await {
    Ok(report) => {
      context
        .log_success(
          &format!("Indexed {} transactions in {}ms", report.indexed, report.duration_ms),
          "index-api",
        )
        .await;
      Ok(Json(BaseResponse::success(report, transaction_id)))
    }
    Err(e) => {
      context.log_error(&format!("Index rebuild failed: {e}"), "index-api").await;
      Err(error_response(&e, transaction_id))
    }
  }
}
