//! Search endpoint handler

use axum::{
  extract::{rejection::QueryRejection, Extension, Query, State},
  response::Json,
};

use crate::pipeline::{QueryFilters, QueryRequest};
use crate::server::handlers::{bad_request, error_response, HandlerError};
use crate::server::middleware::RequestContext;
use crate::server::state::AppState;
use crate::server::types::{BaseResponse, SearchParams, SearchResponse};
use crate::transaction::TxnType;

const MAX_QUERY_CHARS: usize = 200;

fn non_empty(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Turn raw query-string params into a pipeline request
pub fn parse_params(params: SearchParams, default_top_k: usize) -> Result<QueryRequest, String> {
  let text = non_empty(params.query).ok_or("query must not be empty")?;
  if text.chars().count() > MAX_QUERY_CHARS {
    return Err(format!("query must be at most {MAX_QUERY_CHARS} characters"));
  }

  let txn_type = match non_empty(params.txn_type) {
    Some(raw) => Some(TxnType::parse(&raw).ok_or_else(|| format!("unknown transaction type '{raw}'"))?),
    None => None,
  };

  let filters = QueryFilters {
    category: non_empty(params.category),
    txn_type,
    min_amount: params.min_amount,
    max_amount: params.max_amount,
    month: non_empty(params.month),
    description_contains: non_empty(params.description_contains),
  };

  Ok(QueryRequest {
    text,
    user_id: non_empty(params.user_id),
    top_k: params.top_k.unwrap_or(default_top_k),
    filters,
    min_score: params.min_score,
  })
}

/// GET /api/v1/search - Ranked transactions for a natural-language query
pub async fn search(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<BaseResponse<SearchResponse>>, HandlerError> {
  let transaction_id = context.request_id;

  let Query(params) = params.map_err(|e| bad_request(&e.body_text(), transaction_id))?;
  let request = parse_params(params, state.config.search.default_top_k)
    .map_err(|message| bad_request(&message, transaction_id))?;

  match state.pipeline.query(&request).await {
    Ok(outcome) => {
      context
        .log_info(
          &format!("'{}' returned {} results", request.text, outcome.results.len()),
          "search-api",
        )
        .await;

      let response = SearchResponse {
        query: request.text,
        top_k: request.top_k,
        user_id: request.user_id,
        filters: request.filters,
        results_found: outcome.results.len(),
        results: outcome.results,
        dropped_ids: outcome.dropped_ids,
        candidates_examined: outcome.candidates_examined,
        retried: outcome.retried,
      };
      Ok(Json(BaseResponse::success(response, transaction_id)))
    }
    Err(e) => {
      context.log_warn(&format!("Search failed: {e}"), "search-api").await;
      Err(error_response(&e, transaction_id))
    }
  }
}
