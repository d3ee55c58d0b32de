//! Endpoint handlers

pub mod index;
pub mod logs;
pub mod search;
pub mod status;

use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{EmbeddingError, SearchError};
use crate::server::types::{ApiError, BaseResponse};

pub type HandlerError = (StatusCode, Json<BaseResponse<()>>);

/// HTTP status for each failure kind
pub fn status_for(err: &SearchError) -> StatusCode {
  match err {
    SearchError::InvalidArgument(_) | SearchError::Embedding(EmbeddingError::EmptyInput) => {
      StatusCode::BAD_REQUEST
    }
    SearchError::Embedding(EmbeddingError::Timeout(_)) | SearchError::RebuildTimeout(_) => {
      StatusCode::GATEWAY_TIMEOUT
    }
    SearchError::Embedding(_) => StatusCode::BAD_GATEWAY,
    SearchError::IndexNotBuilt | SearchError::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    SearchError::RebuildInProgress => StatusCode::CONFLICT,
    SearchError::InconsistentIndex { .. }
    | SearchError::DimensionMismatch { .. }
    | SearchError::Snapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

/// Structured details worth more than the message text
fn error_context(err: &SearchError) -> Value {
  match err {
    SearchError::Embedding(EmbeddingError::Timeout(limit)) | SearchError::RebuildTimeout(limit) => {
      json!({ "timeout_ms": limit.as_millis() as u64 })
    }
    SearchError::DimensionMismatch { expected, actual }
    | SearchError::Embedding(EmbeddingError::DimensionMismatch { expected, actual }) => {
      json!({ "expected": expected, "actual": actual })
    }
    SearchError::InconsistentIndex { transaction_id } => json!({ "transaction_id": transaction_id }),
    _ => Value::Null,
  }
}

/// Error envelope for a domain failure
pub fn error_response(err: &SearchError, transaction_id: Uuid) -> HandlerError {
  let error = ApiError::new(err.key(), &err.to_string()).with_context(error_context(err));
  (status_for(err), Json(BaseResponse::<()>::error(vec![error], transaction_id)))
}

/// 400 envelope for malformed request input
pub fn bad_request(message: &str, transaction_id: Uuid) -> HandlerError {
  let error = ApiError::new("invalid_argument", message);
  (StatusCode::BAD_REQUEST, Json(BaseResponse::<()>::error(vec![error], transaction_id)))
}
