//! HTTP client for the finsight REST API

use anyhow::{anyhow, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::index::RebuildReport;
use crate::server::types::{BaseResponse, HealthResponse, SearchResponse};

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone)]
pub struct ClientConfig {
  /// Base URL of the server (e.g. "http://127.0.0.1:8000")
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self { base_url: DEFAULT_SERVER.to_string(), timeout_secs: 30 }
  }
}

/// Search parameters sent as the query string
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
  pub query: String,
  pub user_id: Option<String>,
  pub top_k: Option<usize>,
  pub category: Option<String>,
  pub txn_type: Option<String>,
  pub min_amount: Option<f64>,
  pub max_amount: Option<f64>,
  pub month: Option<String>,
  pub min_score: Option<f32>,
}

impl SearchArgs {
  fn pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = vec![("query", self.query.clone())];
    let optional = [
      ("user_id", self.user_id.clone()),
      ("top_k", self.top_k.map(|k| k.to_string())),
      ("category", self.category.clone()),
      ("type", self.txn_type.clone()),
      ("min_amount", self.min_amount.map(|v| v.to_string())),
      ("max_amount", self.max_amount.map(|v| v.to_string())),
      ("month", self.month.clone()),
      ("min_score", self.min_score.map(|v| v.to_string())),
    ];
    pairs.extend(optional.into_iter().filter_map(|(key, value)| value.map(|v| (key, v))));
    pairs
  }
}

pub struct FinsightClient {
  client: Client,
  config: ClientConfig,
}

impl FinsightClient {
  pub fn new(config: ClientConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  pub async fn search(&self, args: &SearchArgs) -> Result<SearchResponse> {
    let response = self.client.get(self.url("/api/v1/search")).query(&args.pairs()).send().await?;
    Self::parse(response, "Search failed").await
  }

  pub async fn rebuild(&self) -> Result<RebuildReport> {
    let response = self.client.post(self.url("/api/v1/index/rebuild")).send().await?;
    Self::parse(response, "Rebuild failed").await
  }

  pub async fn health(&self) -> Result<HealthResponse> {
    let response = self.client.get(self.url("/api/v1/health")).send().await?;
    Self::parse(response, "Health check failed").await
  }

  async fn parse<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await?;
      return Err(anyhow!("{} ({}): {}", what, status, error_message(&body)));
    }

    let result: BaseResponse<T> = response.json().await?;
    Ok(result.data)
  }
}

/// First error message from an error envelope, or the raw body
fn error_message(body: &str) -> String {
  serde_json::from_str::<serde_json::Value>(body)
    .ok()
    .and_then(|v| v["errors"][0]["message"].as_str().map(str::to_string))
    .unwrap_or_else(|| body.to_string())
}
