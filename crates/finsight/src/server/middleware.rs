//! Request context and middleware for the REST API
//!
//! Every request gets a [`RequestContext`] carrying a request id and the
//! shared service log, injected as an extension before the handler runs.

use std::time::Instant;

use axum::{
  extract::{Request, State},
  http::{Method, Uri},
  middleware::Next,
  response::Response,
};
use ledgerlog::service_logs::{LogContext, ServiceLogs};
use ledgerlog::Level;
use uuid::Uuid;

use crate::server::state::AppState;

/// Request metadata plus the logger handlers write through
#[derive(Clone)]
pub struct RequestContext {
  pub request_id: Uuid,
  pub method: Method,
  pub uri: Uri,
  pub logger: ServiceLogs,
}

impl RequestContext {
  pub fn new(method: Method, uri: Uri, logger: ServiceLogs) -> Self {
    Self { request_id: Uuid::new_v4(), method, uri, logger }
  }

  pub async fn log_info(&self, message: &str, component: &str) {
    self.log_with_context(Level::Info, message, component, None, None).await;
  }

  pub async fn log_success(&self, message: &str, component: &str) {
    self.log_with_context(Level::Success, message, component, None, None).await;
  }

  pub async fn log_warn(&self, message: &str, component: &str) {
    self.log_with_context(Level::Warn, message, component, None, None).await;
  }

  pub async fn log_error(&self, message: &str, component: &str) {
    self.log_with_context(Level::Error, message, component, None, None).await;
  }

  pub async fn log_with_context(
    &self,
    level: Level,
    message: &str,
    component: &str,
    status_code: Option<u16>,
    duration_ms: Option<f64>,
  ) {
    let context = LogContext {
      request_id: Some(self.request_id.to_string()),
      method: Some(self.method.to_string()),
      path: Some(self.uri.path().to_string()),
      duration_ms,
      status_code,
    };

    let message = format!("[{}] {} {} - {}", self.request_id, self.method, self.uri.path(), message);
    self.logger.record(level, &message, component, Some(context)).await;
  }
}

/// Inject a [`RequestContext`] and log request start and completion
pub async fn request_context_middleware(
  State(state): State<AppState>,
  mut request: Request,
  next: Next,
) -> Response {
  let context =
    RequestContext::new(request.method().clone(), request.uri().clone(), state.logs.clone());

  let started = Instant::now();
  context.log_info("Request started", "http-request").await;
  request.extensions_mut().insert(context.clone());

  let response = next.run(request).await;

  let status = response.status().as_u16();
  let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
  let level = if status >= 500 { Level::Error } else { Level::Info };
  context
    .log_with_context(level, "Request completed", "http-request", Some(status), Some(duration_ms))
    .await;
  tracing::debug!(request_id = %context.request_id, status, duration_ms, "request completed");

  response
}
