//! Logs endpoint handler

use axum::{
  extract::{Extension, Query},
  http::StatusCode,
  response::Json,
};

use crate::server::handlers::HandlerError;
use crate::server::middleware::RequestContext;
use crate::server::types::{ApiError, BaseResponse, LogsQuery, LogsResponse};

const DEFAULT_LIMIT: usize = 100;

/// GET /logs - Recent structured service logs
pub async fn get_logs(
  Extension(context): Extension<RequestContext>,
  Query(query): Query<LogsQuery>,
) -> Result<Json<BaseResponse<LogsResponse>>, HandlerError> {
  let transaction_id = context.request_id;
  let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

  match context.logger.entries(Some(limit), query.level.as_deref()).await {
    Ok(logs) => Ok(Json(BaseResponse::success(LogsResponse { logs }, transaction_id))),
    Err(e) => {
      let error = ApiError::new("logs_read_failed", &format!("Failed to read logs: {e}"));
      Err((StatusCode::INTERNAL_SERVER_ERROR, Json(BaseResponse::<()>::error(vec![error], transaction_id))))
    }
  }
}
