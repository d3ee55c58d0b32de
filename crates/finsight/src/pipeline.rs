//! Query to ranked results
//!
//! Embeds the query, searches the index, applies user and structured
//! filters, then joins hits back to the transactions of the same index
//! generation. Filtered queries overfetch candidates and retry once against
//! the whole index when the first pass comes up short. Results are never
//! padded, and hits below the similarity floor are not results at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::embedding::{embed_with_timeout, EmbeddingProvider};
use crate::error::{Result, SearchError};
use crate::index::{Generation, SearchHit, VectorIndex};
use crate::store::Ledger;
use crate::transaction::{Transaction, TxnType};

/// Optional constraints ANDed with the user filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryFilters {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
  pub txn_type: Option<TxnType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min_amount: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_amount: Option<f64>,
  /// `YYYY-MM` (or any prefix of `YYYY-MM-DD`)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub month: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description_contains: Option<String>,
}

impl QueryFilters {
  pub fn is_empty(&self) -> bool {
    self == &QueryFilters::default()
  }

  pub fn validate(&self) -> Result<()> {
    for (name, value) in [("min_amount", self.min_amount), ("max_amount", self.max_amount)] {
      if value.is_some_and(|v| !v.is_finite()) {
        return Err(SearchError::InvalidArgument(format!("{name} must be a finite number")));
      }
    }
    if let (Some(min), Some(max)) = (self.min_amount, self.max_amount) {
      if min > max {
        return Err(SearchError::InvalidArgument(format!(
          "min_amount ({min}) is greater than max_amount ({max})"
        )));
      }
    }
    Ok(())
  }

  pub fn matches(&self, txn: &Transaction) -> bool {
    if let Some(category) = &self.category {
      if !txn.category.eq_ignore_ascii_case(category.trim()) {
        return false;
      }
    }
    if self.txn_type.is_some_and(|t| t != txn.txn_type) {
      return false;
    }
    if self.min_amount.is_some_and(|min| txn.amount < min) {
      return false;
    }
    if self.max_amount.is_some_and(|max| txn.amount > max) {
      return false;
    }
    if let Some(month) = &self.month {
      if !txn.date.format("%Y-%m-%d").to_string().starts_with(month.trim()) {
        return false;
      }
    }
    if let Some(needle) = &self.description_contains {
      if !txn.description.to_lowercase().contains(&needle.trim().to_lowercase()) {
        return false;
      }
    }
    true
  }
}

/// A search request as seen by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
  pub text: String,
  pub user_id: Option<String>,
  pub top_k: usize,
  pub filters: QueryFilters,
  /// Overrides the configured similarity floor
  pub min_score: Option<f32>,
}

impl QueryRequest {
  pub fn new(text: impl Into<String>, top_k: usize) -> Self {
    Self { text: text.into(), user_id: None, top_k, filters: QueryFilters::default(), min_score: None }
  }

  pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
    self.user_id = Some(user_id.into());
    self
  }

  pub fn with_filters(mut self, filters: QueryFilters) -> Self {
    self.filters = filters;
    self
  }

  pub fn with_min_score(mut self, min_score: f32) -> Self {
    self.min_score = Some(min_score);
    self
  }

  fn is_filtered(&self) -> bool {
    self.user_id.is_some() || !self.filters.is_empty()
  }

  fn accepts(&self, txn: &Transaction) -> bool {
    self.user_id.as_ref().map_or(true, |user| &txn.user_id == user) && self.filters.matches(txn)
  }
}

/// A transaction with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoredTransaction {
  #[serde(flatten)]
  pub transaction: Transaction,
  pub score: f32,
}

/// Ranked results plus what it took to produce them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryOutcome {
  pub results: Vec<ScoredTransaction>,
  /// Index entries whose transaction is gone from the store
  pub dropped_ids: Vec<String>,
  pub candidates_examined: usize,
  pub retried: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
  pub embed_timeout: Duration,
  pub overfetch_factor: usize,
  pub min_score: f32,
}

impl PipelineSettings {
  pub fn from_config(config: &ServiceConfig) -> Self {
    Self {
      embed_timeout: config.embedding.timeout(),
      overfetch_factor: config.search.overfetch_factor,
      min_score: config.search.min_score,
    }
  }
}

impl Default for PipelineSettings {
  fn default() -> Self {
    Self { embed_timeout: Duration::from_secs(10), overfetch_factor: 3, min_score: 0.1 }
  }
}

pub struct QueryPipeline {
  index: Arc<VectorIndex>,
  provider: Arc<dyn EmbeddingProvider>,
  settings: PipelineSettings,
  dropped_stale_ids: AtomicU64,
}

impl QueryPipeline {
  pub fn new(
    index: Arc<VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    settings: PipelineSettings,
  ) -> Self {
    Self { index, provider, settings, dropped_stale_ids: AtomicU64::new(0) }
  }

  /// Total stale index entries skipped since startup
  pub fn dropped_stale_ids(&self) -> u64 {
    self.dropped_stale_ids.load(Ordering::Relaxed)
  }

  pub async fn query(&self, request: &QueryRequest) -> Result<QueryOutcome> {
    self.index.check_k(request.top_k)?;
    request.filters.validate()?;
    let min_score = request.min_score.unwrap_or(self.settings.min_score);
    if !(-1.0..=1.0).contains(&min_score) {
      return Err(SearchError::InvalidArgument(format!("min_score must be within -1..=1, got {min_score}")));
    }

    let vector =
      embed_with_timeout(self.provider.as_ref(), &request.text, self.settings.embed_timeout).await?;

    // one generation for the whole query, however many passes it takes
    let generation = self.index.generation().ok_or(SearchError::IndexNotBuilt)?;
    let outcome = if request.is_filtered() {
      filtered(request, &vector, &generation, self.settings.overfetch_factor, min_score)?
    } else {
      let hits = generation.snapshot.candidates(&vector, request.top_k)?;
      let candidates_examined = hits.len();
      let (results, dropped_ids) = assemble(&hits, &generation.ledger, request, min_score);
      QueryOutcome { results, dropped_ids, candidates_examined, retried: false }
    };

    self.report_dropped(&outcome.dropped_ids);
    Ok(outcome)
  }

  fn report_dropped(&self, dropped_ids: &[String]) {
    if dropped_ids.is_empty() {
      return;
    }

    self.dropped_stale_ids.fetch_add(dropped_ids.len() as u64, Ordering::Relaxed);
    for id in dropped_ids {
      let err = SearchError::InconsistentIndex { transaction_id: id.clone() };
      ledgerlog::warn!("{err}; rebuild the index to repair it");
    }
  }
}

/// Overfetch for a filtered query, then retry once over the whole snapshot
fn filtered(
  request: &QueryRequest,
  vector: &[f32],
  generation: &Generation,
  overfetch_factor: usize,
  min_score: f32,
) -> Result<QueryOutcome> {
  let (snapshot, ledger) = (&generation.snapshot, &generation.ledger);
  let size = snapshot.len();
  if size == 0 {
    return Ok(QueryOutcome::default());
  }

  let fetch = request.top_k.saturating_mul(overfetch_factor.max(1)).min(size);
  let hits = snapshot.candidates(vector, fetch)?;
  let (results, dropped_ids) = assemble(&hits, ledger, request, min_score);

  // past the floor already, so a wider pass cannot add anything
  let below_floor = hits.last().is_some_and(|hit| hit.score < min_score);
  if results.len() >= request.top_k || fetch >= size || below_floor {
    return Ok(QueryOutcome { results, dropped_ids, candidates_examined: hits.len(), retried: false });
  }

  // one retry over everything; whatever survives is the answer
  let hits = snapshot.candidates(vector, size)?;
  let (results, dropped_ids) = assemble(&hits, ledger, request, min_score);
  Ok(QueryOutcome { results, dropped_ids, candidates_examined: hits.len(), retried: true })
}

/// Join hits to transactions, keeping filter matches above the floor up to `top_k`
fn assemble(
  hits: &[SearchHit],
  ledger: &Ledger,
  request: &QueryRequest,
  min_score: f32,
) -> (Vec<ScoredTransaction>, Vec<String>) {
  let mut results = Vec::with_capacity(request.top_k.min(hits.len()));
  let mut dropped = Vec::new();

  // hits arrive best first
  for hit in hits {
    if results.len() == request.top_k || hit.score < min_score {
      break;
    }
    match ledger.get(&hit.transaction_id) {
      Some(txn) if request.accepts(txn) => {
        results.push(ScoredTransaction { transaction: txn.clone(), score: hit.score })
      }
      Some(_) => {}
      None => dropped.push(hit.transaction_id.clone()),
    }
  }

  (results, dropped)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::EmbeddingError;
  use crate::index::{EmbeddingRecord, IndexSettings};
  use async_trait::async_trait;
  use chrono::NaiveDate;

  /// One axis per keyword so scores are predictable
  struct AxisEmbedder;

  fn axis_vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    let mut v = vec![0.0; 4];
    for (axis, word) in ["food", "rent", "travel"].iter().enumerate() {
      if text.contains(word) {
        v[axis] = 1.0;
      }
    }
    v[3] = 0.1;
    v
  }

  #[async_trait]
  impl EmbeddingProvider for AxisEmbedder {
    fn model_name(&self) -> &str {
      "axis"
    }
    fn dimension(&self) -> usize {
      4
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
      Ok(axis_vector(text))
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      Ok(texts.iter().map(|t| axis_vector(t)).collect())
    }
  }

  fn txn(id: &str, user: &str, category: &str, amount: f64, day: u32) -> Transaction {
    Transaction {
      id: id.to_string(),
      user_id: user.to_string(),
      date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
      description: format!("{category} spend"),
      amount,
      txn_type: TxnType::Debit,
      category: category.to_string(),
      balance: 1000.0,
      method: None,
    }
  }

  fn pipeline(transactions: Vec<Transaction>, indexed: &[Transaction]) -> QueryPipeline {
    pipeline_with(transactions, indexed, PipelineSettings::default())
  }

  fn pipeline_with(
    transactions: Vec<Transaction>,
    indexed: &[Transaction],
    settings: PipelineSettings,
  ) -> QueryPipeline {
    let ledger = Arc::new(Ledger::new(transactions).unwrap());
    let index = VectorIndex::new(IndexSettings::default());
    let records = indexed
      .iter()
      .map(|t| EmbeddingRecord {
        transaction_id: t.id.clone(),
        user_id: t.user_id.clone(),
        vector: axis_vector(&t.embedding_text()),
      })
      .collect();
    index.build(ledger, "axis", 4, records).unwrap();

    QueryPipeline::new(Arc::new(index), Arc::new(AxisEmbedder), settings)
  }

  fn sample() -> Vec<Transaction> {
    vec![
      txn("t1", "u1", "Food", 450.0, 1),
      txn("t2", "u1", "Rent", 12000.0, 2),
      txn("t3", "u2", "Travel", 3000.0, 3),
      txn("t4", "u1", "Food", 90.0, 4),
    ]
  }

  fn ids(outcome: &QueryOutcome) -> Vec<&str> {
    outcome.results.iter().map(|r| r.transaction.id.as_str()).collect()
  }

  #[tokio::test]
  async fn test_food_query_ranks_food_first() {
    let data = sample();
    let pipeline = pipeline(data.clone(), &data);

    let outcome = pipeline.query(&QueryRequest::new("food expenses", 2)).await.unwrap();
    assert_eq!(ids(&outcome), vec!["t1", "t4"]);
    assert!(outcome.results[0].score > 0.3);
    assert!(!outcome.retried);
  }

  #[tokio::test]
  async fn test_user_filter_never_pads() {
    let data = sample();
    let pipeline = pipeline(data.clone(), &data);

    // u2 has no food spending; u1's food rows must not stand in for it
    let outcome = pipeline.query(&QueryRequest::new("food expenses", 3).for_user("u2")).await.unwrap();
    assert!(outcome.results.is_empty());
    // 3 * 3 covers all four entries, so no retry was needed
    assert_eq!(outcome.candidates_examined, 4);
    assert!(!outcome.retried);

    let outcome = pipeline.query(&QueryRequest::new("travel", 3).for_user("u2")).await.unwrap();
    assert_eq!(ids(&outcome), vec!["t3"]);
    assert!(outcome.results.iter().all(|r| r.transaction.user_id == "u2"));

    let outcome = pipeline.query(&QueryRequest::new("food", 5).for_user("nobody")).await.unwrap();
    assert!(outcome.results.is_empty());
  }

  #[tokio::test]
  async fn test_short_first_pass_retries_once_over_everything() {
    let mut data: Vec<Transaction> =
      (1..=20).map(|d| txn(&format!("f{d:02}"), "u1", "Food", 100.0, d)).collect();
    data.push(txn("r1", "u2", "Rent", 9000.0, 21));
    let pipeline = pipeline(data.clone(), &data);

    // rent and food score the same, and the f.. ids sort first
    let outcome = pipeline.query(&QueryRequest::new("food rent", 1).for_user("u2")).await.unwrap();
    assert!(outcome.retried);
    assert_eq!(outcome.candidates_examined, 21);
    assert_eq!(ids(&outcome), vec!["r1"]);
  }

  #[tokio::test]
  async fn test_structured_filters() {
    let data = sample();
    let pipeline = pipeline(data.clone(), &data);

    let filters = QueryFilters { category: Some("food".to_string()), max_amount: Some(100.0), ..Default::default() };
    let outcome = pipeline.query(&QueryRequest::new("food spend", 5).with_filters(filters)).await.unwrap();
    assert_eq!(ids(&outcome), vec!["t4"]);

    let filters = QueryFilters { month: Some("2024-04".to_string()), ..Default::default() };
    let outcome = pipeline.query(&QueryRequest::new("food spend", 5).with_filters(filters)).await.unwrap();
    assert!(outcome.results.is_empty());

    let filters = QueryFilters { min_amount: Some(10.0), max_amount: Some(1.0), ..Default::default() };
    let err = pipeline.query(&QueryRequest::new("spend", 5).with_filters(filters)).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidArgument(_)));
  }

  #[tokio::test]
  async fn test_stale_ids_are_dropped_and_counted() {
    let data = sample();
    // the index still knows a transaction the store no longer has
    let mut indexed = data.clone();
    indexed.push(txn("gone", "u1", "Food", 10.0, 9));
    let pipeline = pipeline(data, &indexed);

    let outcome = pipeline.query(&QueryRequest::new("food", 5)).await.unwrap();
    assert_eq!(outcome.dropped_ids, vec!["gone".to_string()]);
    assert!(outcome.results.iter().all(|r| r.transaction.id != "gone"));
    assert_eq!(pipeline.dropped_stale_ids(), 1);

    pipeline.query(&QueryRequest::new("food", 5)).await.unwrap();
    assert_eq!(pipeline.dropped_stale_ids(), 2);
  }

  #[tokio::test]
  async fn test_invalid_top_k_and_empty_text() {
    let data = sample();
    let pipeline = pipeline(data.clone(), &data);

    for k in [0, 201] {
      let err = pipeline.query(&QueryRequest::new("food", k)).await.unwrap_err();
      assert!(matches!(err, SearchError::InvalidArgument(_)));
    }

    let err = pipeline.query(&QueryRequest::new("  ", 5)).await.unwrap_err();
    assert!(matches!(err, SearchError::Embedding(EmbeddingError::EmptyInput)));

    let err = pipeline.query(&QueryRequest::new("food", 5).with_min_score(1.5)).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidArgument(_)));
  }

  #[tokio::test]
  async fn test_min_score_floor() {
    let data = sample();
    let pipeline = pipeline(data.clone(), &data);
    let outcome = pipeline.query(&QueryRequest::new("food", 10)).await.unwrap();
    assert_eq!(ids(&outcome), vec!["t1", "t4"]);

    // without a floor every entry comes back
    let open = PipelineSettings { min_score: -1.0, ..PipelineSettings::default() };
    let pipeline = pipeline_with(data.clone(), &data, open);
    let outcome = pipeline.query(&QueryRequest::new("food", 10)).await.unwrap();
    assert_eq!(outcome.results.len(), 4);
    assert!(outcome.results.windows(2).all(|w| w[0].score >= w[1].score));
  }
}
