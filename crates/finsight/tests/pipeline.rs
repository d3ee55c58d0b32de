use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use tempfile::TempDir;

use finsight::config::EmbeddingConfig;
use finsight::embedding::{provider_from_config, EmbeddingProvider, HashingEmbedder};
use finsight::index::{IndexSettings, VectorIndex};
use finsight::pipeline::{PipelineSettings, QueryPipeline, QueryRequest};
use finsight::store::{self, TransactionStore};
use finsight::transaction::{Transaction, TxnType};
use finsight::{EmbeddingError, SearchError};

const CONCEPTS: &[&[&str]] = &[
  &["food", "swiggy", "zomato", "restaurant", "grocery"],
  &["salary", "income"],
  &["rent", "landlord"],
  &["travel", "uber", "flight"],
];

/// Scores by shared concept, with a small constant axis so no vector is zero
struct ConceptEmbedder {
  batch_delay: Duration,
}

impl ConceptEmbedder {
  fn new() -> Self {
    Self { batch_delay: Duration::ZERO }
  }

  fn slow(batch_delay: Duration) -> Self {
    Self { batch_delay }
  }

  fn vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    let mut vector: Vec<f32> = CONCEPTS
      .iter()
      .map(|words| if words.iter().any(|w| text.contains(w)) { 1.0 } else { 0.0 })
      .collect();
    vector.push(0.1);
    vector
  }
}

#[async_trait]
impl EmbeddingProvider for ConceptEmbedder {
  fn model_name(&self) -> &str {
    "concepts"
  }

  fn dimension(&self) -> usize {
    CONCEPTS.len() + 1
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    Ok(Self::vector(text))
  }

  async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if !self.batch_delay.is_zero() {
      tokio::time::sleep(self.batch_delay).await;
    }
    Ok(texts.iter().map(|t| Self::vector(t)).collect())
  }
}

/// Never answers a query in time
struct StalledEmbedder;

#[async_trait]
impl EmbeddingProvider for StalledEmbedder {
  fn model_name(&self) -> &str {
    "concepts"
  }

  fn dimension(&self) -> usize {
    CONCEPTS.len() + 1
  }

  async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(vec![0.0; self.dimension()])
  }

  async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    Ok(texts.iter().map(|t| ConceptEmbedder::vector(t)).collect())
  }
}

fn txn(id: &str, user: &str, description: &str, category: &str, txn_type: TxnType, amount: f64) -> Transaction {
  Transaction {
    id: id.to_string(),
    user_id: user.to_string(),
    date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
    description: description.to_string(),
    amount,
    txn_type,
    category: category.to_string(),
    balance: 25000.0,
    method: Some("UPI".to_string()),
  }
}

fn two_users() -> Vec<Transaction> {
  vec![
    txn("txn_1", "u1", "Swiggy order", "Food", TxnType::Debit, 450.0),
    txn("txn_2", "u2", "Salary credit", "Income", TxnType::Credit, 85000.0),
  ]
}

fn write_data(dir: &Path, transactions: &[Transaction]) -> PathBuf {
  let path = dir.join("transactions.json");
  store::save(&path, transactions).unwrap();
  path
}

fn settings(dir: &Path) -> IndexSettings {
  IndexSettings { snapshot_path: Some(dir.join("index.json")), ..IndexSettings::default() }
}

struct Fixture {
  _dir: TempDir,
  store: Arc<TransactionStore>,
  index: Arc<VectorIndex>,
  pipeline: QueryPipeline,
}

async fn ready_with(
  transactions: &[Transaction],
  provider: Arc<dyn EmbeddingProvider>,
  pipeline_settings: PipelineSettings,
) -> Fixture {
  let dir = TempDir::new().unwrap();
  let data = write_data(dir.path(), transactions);
  let store = Arc::new(TransactionStore::open(&data).unwrap());
  let index = Arc::new(VectorIndex::new(settings(dir.path())));
  index.rebuild(&store, provider.as_ref()).await.unwrap();

  let pipeline = QueryPipeline::new(index.clone(), provider, pipeline_settings);
  Fixture { _dir: dir, store, index, pipeline }
}

async fn ready(transactions: &[Transaction]) -> Fixture {
  ready_with(transactions, Arc::new(ConceptEmbedder::new()), PipelineSettings::default()).await
}

fn ids(results: &[finsight::pipeline::ScoredTransaction]) -> Vec<&str> {
  results.iter().map(|r| r.transaction.id.as_str()).collect()
}

#[tokio::test]
async fn test_food_query_is_scoped_to_the_requesting_user() {
  let fixture = ready(&two_users()).await;

  let outcome =
    fixture.pipeline.query(&QueryRequest::new("food expenses", 5).for_user("u1")).await.unwrap();
  assert_eq!(ids(&outcome.results), vec!["txn_1"]);
  assert!(outcome.results[0].score > 0.9);

  // u2 only has income; nothing of theirs is about food
  let outcome =
    fixture.pipeline.query(&QueryRequest::new("food expenses", 5).for_user("u2")).await.unwrap();
  assert!(outcome.results.is_empty());

  let outcome = fixture.pipeline.query(&QueryRequest::new("salary", 5).for_user("u2")).await.unwrap();
  assert_eq!(ids(&outcome.results), vec!["txn_2"]);
}

#[tokio::test]
async fn test_food_query_with_the_configured_default_provider() {
  let transactions = vec![
    txn("txn_1", "u1", "UPI payment to Swiggy", "Food", TxnType::Debit, 450.0),
    txn("txn_2", "u2", "Salary credit", "Income", TxnType::Credit, 85000.0),
  ];
  let provider = provider_from_config(&EmbeddingConfig::default()).await.unwrap();
  let fixture = ready_with(&transactions, provider, PipelineSettings::default()).await;

  let outcome = fixture.pipeline.query(&QueryRequest::new("food expenses", 1)).await.unwrap();
  assert_eq!(ids(&outcome.results), vec!["txn_1"]);
  assert!(outcome.results[0].score > 0.3, "score {}", outcome.results[0].score);

  let outcome =
    fixture.pipeline.query(&QueryRequest::new("food expenses", 1).for_user("u2")).await.unwrap();
  assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn test_top_k_bounds() {
  let fixture = ready(&two_users()).await;

  for k in [0, 201] {
    let err = fixture.pipeline.query(&QueryRequest::new("food", k)).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidArgument(_)), "k={k}");
  }

  let outcome =
    fixture.pipeline.query(&QueryRequest::new("food", 200).with_min_score(-1.0)).await.unwrap();
  assert_eq!(outcome.results.len(), 2);

  let outcome = fixture.pipeline.query(&QueryRequest::new("food", 1).with_min_score(-1.0)).await.unwrap();
  assert_eq!(ids(&outcome.results), vec!["txn_1"]);
}

#[tokio::test]
async fn test_transaction_text_finds_itself_first() {
  let transactions = vec![
    txn("a1", "u1", "Swiggy order from Meghana Foods", "Food", TxnType::Debit, 640.0),
    txn("a2", "u1", "House rent to landlord", "Rent", TxnType::Debit, 18000.0),
    txn("a3", "u1", "Uber ride to airport", "Travel", TxnType::Debit, 720.0),
    txn("a4", "u1", "Monthly salary from Acme", "Income", TxnType::Credit, 92000.0),
    txn("a5", "u1", "Electricity bill BESCOM", "Utilities", TxnType::Debit, 1430.0),
  ];
  let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(256));
  let fixture = ready_with(&transactions, provider, PipelineSettings::default()).await;

  for transaction in &transactions {
    let request = QueryRequest::new(transaction.embedding_text(), 1).for_user("u1");
    let outcome = fixture.pipeline.query(&request).await.unwrap();
    assert_eq!(ids(&outcome.results), vec![transaction.id.as_str()]);
    assert!((outcome.results[0].score - 1.0).abs() < 1e-4);
  }
}

#[tokio::test]
async fn test_removed_transactions_are_dropped_not_returned() {
  let fixture = ready(&two_users()).await;

  // the data file moves on without txn_1 and a restart pairs it with the old snapshot
  let remaining = vec![two_users().remove(1)];
  store::save(fixture.store.path(), &remaining).unwrap();
  let ledger = fixture.store.reload().unwrap();
  let snapshot_path = fixture._dir.path().join("index.json");
  let fit = fixture.index.load_compatible(&snapshot_path, &ConceptEmbedder::new(), ledger).unwrap();
  assert_eq!((fit.missing_from_store, fit.missing_from_index), (1, 0));

  let outcome = fixture.pipeline.query(&QueryRequest::new("swiggy food", 5)).await.unwrap();
  assert!(outcome.results.is_empty());
  assert_eq!(outcome.dropped_ids, vec!["txn_1".to_string()]);
  assert_eq!(fixture.pipeline.dropped_stale_ids(), 1);

  // a rebuild brings the index back in line
  fixture.index.rebuild(&fixture.store, &ConceptEmbedder::new()).await.unwrap();
  let outcome = fixture.pipeline.query(&QueryRequest::new("swiggy food", 5)).await.unwrap();
  assert!(outcome.dropped_ids.is_empty());
  assert_eq!(fixture.index.size(), 1);
}

#[tokio::test]
async fn test_query_embedding_timeout() {
  let settings = PipelineSettings { embed_timeout: Duration::from_millis(50), ..PipelineSettings::default() };
  let fixture = ready_with(&two_users(), Arc::new(StalledEmbedder), settings).await;

  let err = fixture.pipeline.query(&QueryRequest::new("food", 5)).await.unwrap_err();
  assert!(matches!(err, SearchError::Embedding(EmbeddingError::Timeout(_))));
}

#[tokio::test]
async fn test_queries_see_whole_snapshots_during_rebuild() {
  let fixture = ready(&two_users()).await;
  assert_eq!(fixture.index.size(), 2);

  let mut grown = two_users();
  for i in 3..=8 {
    grown.push(txn(&format!("txn_{i}"), "u1", "Zomato dinner", "Food", TxnType::Debit, 300.0 + i as f64));
  }
  store::save(fixture.store.path(), &grown).unwrap();

  let slow = ConceptEmbedder::slow(Duration::from_millis(40));
  let rebuild = fixture.index.rebuild(&fixture.store, &slow);

  let queries = async {
    let mut sizes = Vec::new();
    let mut second_rebuild = None;
    for round in 0..10 {
      if round == 1 {
        second_rebuild = Some(fixture.index.rebuild(&fixture.store, &ConceptEmbedder::new()).await);
      }
      let request = QueryRequest::new("food", 200).with_min_score(-1.0);
      let burst = join_all((0..4).map(|_| fixture.pipeline.query(&request))).await;
      for outcome in burst {
        sizes.push(outcome.unwrap().candidates_examined);
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    (sizes, second_rebuild)
  };

  let (report, (sizes, second_rebuild)) = tokio::join!(rebuild, queries);

  assert_eq!(report.unwrap().indexed, 8);
  assert!(matches!(second_rebuild, Some(Err(SearchError::RebuildInProgress))));
  assert!(sizes.iter().all(|&n| n == 2 || n == 8), "saw a partial index: {sizes:?}");
  assert_eq!(fixture.index.size(), 8);
  assert_eq!(fixture.store.len(), 8);
}

fn food_rows(prefix: &str, merchant: &str) -> Vec<Transaction> {
  (0..50)
    .map(|i| {
      let user = if i % 2 == 0 { "u1" } else { "u2" };
      let description = format!("{merchant} order");
      txn(&format!("{prefix}{i:02}"), user, &description, "Food", TxnType::Debit, 100.0 + i as f64)
    })
    .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rebuilds_between_disjoint_datasets_never_drop_ids() {
  let (swiggy, zomato) = (food_rows("a", "Swiggy"), food_rows("b", "Zomato"));
  let fixture = ready(&swiggy).await;
  let pipeline = Arc::new(fixture.pipeline);
  let stop = Arc::new(AtomicBool::new(false));

  let readers: Vec<_> = (0..3)
    .map(|reader| {
      let (pipeline, stop) = (pipeline.clone(), stop.clone());
      tokio::spawn(async move {
        let mut queries = 0;
        while !stop.load(Ordering::Relaxed) {
          let request = match reader {
            0 => QueryRequest::new("swiggy food", 10),
            _ => QueryRequest::new("swiggy food", 10).for_user("u2"),
          };
          let outcome = pipeline.query(&request).await.unwrap();
          assert!(outcome.dropped_ids.is_empty(), "dropped {:?}", outcome.dropped_ids);
          assert_eq!(outcome.results.len(), 10);
          queries += 1;
          tokio::task::yield_now().await;
        }
        queries
      })
    })
    .collect();

  let provider = ConceptEmbedder::new();
  for round in 0..100 {
    let data = if round % 2 == 0 { &zomato } else { &swiggy };
    store::save(fixture.store.path(), data).unwrap();
    fixture.index.rebuild(&fixture.store, &provider).await.unwrap();
  }
  stop.store(true, Ordering::Relaxed);

  for reader in readers {
    assert!(reader.await.unwrap() > 0);
  }
  assert_eq!(pipeline.dropped_stale_ids(), 0);
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_index() {
  let fixture = ready(&two_users()).await;
  let before = fixture.index.snapshot().unwrap();

  let mut grown = two_users();
  grown.push(txn("txn_3", "u1", "Flight to Goa", "Travel", TxnType::Debit, 5400.0));
  store::save(fixture.store.path(), &grown).unwrap();

  let dir = TempDir::new().unwrap();
  let index = VectorIndex::new(IndexSettings {
    rebuild_timeout: Duration::from_millis(30),
    ..settings(dir.path())
  });
  index.install(fixture.store.ledger(), before.as_ref().clone());

  let err = index.rebuild(&fixture.store, &ConceptEmbedder::slow(Duration::from_secs(5))).await.unwrap_err();
  assert!(matches!(err, SearchError::RebuildTimeout(_)));
  assert_eq!(index.size(), 2);
  assert_eq!(index.snapshot().unwrap().built_at, before.built_at);
  // the store keeps serving the ledger the live index was built from
  assert_eq!(fixture.store.len(), 2);
  assert!(!dir.path().join("index.json").exists());
}

#[tokio::test]
async fn test_missing_data_file_fails_rebuild() {
  let fixture = ready(&two_users()).await;
  std::fs::remove_file(fixture.store.path()).unwrap();

  let err = fixture.index.rebuild(&fixture.store, &ConceptEmbedder::new()).await.unwrap_err();
  assert!(matches!(err, SearchError::DataUnavailable(_)));
  assert_eq!(fixture.index.size(), 2);
}

#[tokio::test]
async fn test_persisted_snapshot_round_trips() {
  let fixture = ready(&two_users()).await;
  let path = fixture._dir.path().join("index.json");
  assert!(path.exists());

  let provider = ConceptEmbedder::new();
  let restored = VectorIndex::new(IndexSettings::default());
  let fit = restored.load_compatible(&path, &provider, fixture.store.ledger()).unwrap();
  assert_eq!(fit.indexed, 2);
  assert!(fit.is_exact());
  assert_eq!(restored.snapshot().unwrap().entries, fixture.index.snapshot().unwrap().entries);

  // a different model's snapshot is not reused
  let other = HashingEmbedder::new(CONCEPTS.len() + 1);
  assert!(VectorIndex::new(IndexSettings::default())
    .load_compatible(&path, &other, fixture.store.ledger())
    .is_err());
}
