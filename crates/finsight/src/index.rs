//! Exact cosine vector index
//!
//! The index holds one immutable [`Generation`] behind a swappable `Arc`: a
//! snapshot of vectors together with the ledger its hits are joined against.
//! Builds happen out of place and are published with a single pointer swap,
//! so a query sees either the whole old generation or the whole new one.
//! Vectors are normalised on the way in, which turns cosine into a dot product.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::embedding::{embed_batch_with_timeout, normalize, EmbeddingProvider};
use crate::error::{Result, SearchError};
use crate::store::{Ledger, TransactionStore};

/// One indexed vector and the transaction it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
  pub transaction_id: String,
  pub user_id: String,
  pub vector: Vec<f32>,
}

/// A scored index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
  pub transaction_id: String,
  pub score: f32,
}

/// Fully built, immutable generation of the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
  pub model: String,
  pub dimension: usize,
  pub built_at: DateTime<Utc>,
  pub entries: Vec<EmbeddingRecord>,
}

impl IndexSnapshot {
  /// Validate dimensions and ids, then normalise every vector
  pub fn new(model: &str, dimension: usize, entries: Vec<EmbeddingRecord>) -> Result<Self> {
    Self::assemble(model.to_string(), dimension, Utc::now(), entries, true)
  }

  fn assemble(
    model: String,
    dimension: usize,
    built_at: DateTime<Utc>,
    entries: Vec<EmbeddingRecord>,
    normalize_vectors: bool,
  ) -> Result<Self> {
    if dimension == 0 {
      return Err(SearchError::Snapshot("index dimension must be positive".to_string()));
    }

    let mut seen = HashSet::with_capacity(entries.len());
    let mut normalized = Vec::with_capacity(entries.len());
    for mut record in entries {
      if record.vector.len() != dimension {
        return Err(SearchError::DimensionMismatch { expected: dimension, actual: record.vector.len() });
      }
      if !seen.insert(record.transaction_id.clone()) {
        return Err(SearchError::Snapshot(format!(
          "duplicate transaction id {} in index",
          record.transaction_id
        )));
      }
      if normalize_vectors {
        record.vector = normalize(record.vector);
      }
      normalized.push(record);
    }

    Ok(Self { model, dimension, built_at, entries: normalized })
  }

  /// Read a persisted snapshot, re-validating it; vectors were normalised when saved
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)
      .map_err(|e| SearchError::Snapshot(format!("failed to read {}: {e}", path.display())))?;
    let raw: IndexSnapshot = serde_json::from_str(&content)
      .map_err(|e| SearchError::Snapshot(format!("corrupt snapshot {}: {e}", path.display())))?;
    Self::assemble(raw.model, raw.dimension, raw.built_at, raw.entries, false)
  }

  /// Write as JSON through a temp file so a crash never leaves half a snapshot
  pub fn save(&self, path: &Path) -> Result<()> {
    let snapshot_error = |e: std::io::Error| SearchError::Snapshot(format!("{}: {e}", path.display()));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).map_err(snapshot_error)?;
    }

    let json = serde_json::to_string(self).map_err(|e| SearchError::Snapshot(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(snapshot_error)?;
    std::fs::rename(&tmp, path).map_err(snapshot_error)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Top `k` entries for a raw query vector, with no `max_top_k` cap
  pub fn candidates(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
    if query.len() != self.dimension {
      return Err(SearchError::DimensionMismatch { expected: self.dimension, actual: query.len() });
    }
    Ok(self.top_k(&normalize(query.to_vec()), k))
  }

  /// Exact top-k by dot product; ties broken by ascending transaction id
  fn top_k(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = self
      .entries
      .iter()
      .map(|record| SearchHit {
        transaction_id: record.transaction_id.clone(),
        score: dot(query, &record.vector).clamp(-1.0, 1.0),
      })
      .collect();

    hits.sort_by(|a, b| {
      b.score.total_cmp(&a.score).then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });
    hits.truncate(k);
    hits
  }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
  a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// A snapshot and the ledger it was built from, published together
#[derive(Debug)]
pub struct Generation {
  pub ledger: Arc<Ledger>,
  pub snapshot: Arc<IndexSnapshot>,
}

/// Summary reported by the health endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexStats {
  pub built: bool,
  pub size: usize,
  pub dimension: Option<usize>,
  pub model: Option<String>,
  pub built_at: Option<DateTime<Utc>>,
}

/// Outcome of a completed rebuild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RebuildReport {
  pub indexed: usize,
  pub duration_ms: u64,
  pub persisted: bool,
}

/// How a persisted snapshot lines up with the ledger it is installed next to
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotFit {
  pub indexed: usize,
  pub transactions: usize,
  /// Indexed ids the ledger does not have
  pub missing_from_store: usize,
  /// Ledger transactions the snapshot never saw
  pub missing_from_index: usize,
}

impl SnapshotFit {
  fn compare(snapshot: &IndexSnapshot, ledger: &Ledger) -> Self {
    let indexed: HashSet<&str> = snapshot.entries.iter().map(|e| e.transaction_id.as_str()).collect();
    let missing_from_store = indexed.iter().filter(|id| ledger.get(id).is_none()).count();
    let missing_from_index =
      ledger.all().iter().filter(|txn| !indexed.contains(txn.id.as_str())).count();

    Self { indexed: snapshot.len(), transactions: ledger.len(), missing_from_store, missing_from_index }
  }

  pub fn is_exact(&self) -> bool {
    self.missing_from_store == 0 && self.missing_from_index == 0
  }
}

/// Limits and paths the index works with
#[derive(Debug, Clone)]
pub struct IndexSettings {
  pub max_top_k: usize,
  pub batch_size: usize,
  pub batch_timeout: Duration,
  pub rebuild_timeout: Duration,
  pub snapshot_path: Option<PathBuf>,
}

impl IndexSettings {
  pub fn from_config(config: &ServiceConfig) -> Self {
    Self {
      max_top_k: config.search.max_top_k,
      batch_size: config.embedding.batch_size,
      batch_timeout: config.embedding.timeout(),
      rebuild_timeout: config.search.rebuild_timeout(),
      snapshot_path: Some(config.data.index_path.clone()),
    }
  }
}

impl Default for IndexSettings {
  fn default() -> Self {
    Self {
      max_top_k: 200,
      batch_size: 128,
      batch_timeout: Duration::from_secs(10),
      rebuild_timeout: Duration::from_secs(300),
      snapshot_path: None,
    }
  }
}

/// Swappable exact-search index with exclusive rebuilds
pub struct VectorIndex {
  current: RwLock<Option<Arc<Generation>>>,
  rebuild_lock: tokio::sync::Mutex<()>,
  settings: IndexSettings,
}

impl VectorIndex {
  pub fn new(settings: IndexSettings) -> Self {
    Self { current: RwLock::new(None), rebuild_lock: tokio::sync::Mutex::new(()), settings }
  }

  pub fn settings(&self) -> &IndexSettings {
    &self.settings
  }

  /// The live generation, if any build has succeeded
  ///
  /// Callers that join hits to transactions must take both from one
  /// generation.
  pub fn generation(&self) -> Option<Arc<Generation>> {
    match self.current.read() {
      Ok(guard) => guard.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  /// The live snapshot, if any build has succeeded
  pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
    self.generation().map(|generation| generation.snapshot.clone())
  }

  /// Build a new snapshot from records and publish it with `ledger`
  pub fn build(
    &self,
    ledger: Arc<Ledger>,
    model: &str,
    dimension: usize,
    records: Vec<EmbeddingRecord>,
  ) -> Result<()> {
    let snapshot = IndexSnapshot::new(model, dimension, records)?;
    self.install(ledger, snapshot);
    Ok(())
  }

  /// Publish an already validated snapshot paired with `ledger`
  pub fn install(&self, ledger: Arc<Ledger>, snapshot: IndexSnapshot) {
    let generation = Some(Arc::new(Generation { ledger, snapshot: Arc::new(snapshot) }));
    match self.current.write() {
      Ok(mut guard) => *guard = generation,
      Err(poisoned) => *poisoned.into_inner() = generation,
    }
  }

  /// Exact cosine search over the live snapshot
  pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
    self.check_k(k)?;
    self.candidates(query, k)
  }

  /// Like [`VectorIndex::search`] without the `max_top_k` cap, for overfetching
  pub fn candidates(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
    self.snapshot().ok_or(SearchError::IndexNotBuilt)?.candidates(query, k)
  }

  /// Reject `k` outside `1..=max_top_k`
  pub fn check_k(&self, k: usize) -> Result<()> {
    if k == 0 || k > self.settings.max_top_k {
      return Err(SearchError::InvalidArgument(format!(
        "top_k must be between 1 and {}, got {k}",
        self.settings.max_top_k
      )));
    }
    Ok(())
  }

  /// Entry count of the live snapshot, 0 when unbuilt
  pub fn size(&self) -> usize {
    self.snapshot().map(|s| s.len()).unwrap_or(0)
  }

  pub fn is_built(&self) -> bool {
    self.snapshot().is_some()
  }

  pub fn stats(&self) -> IndexStats {
    match self.snapshot() {
      Some(snapshot) => IndexStats {
        built: true,
        size: snapshot.len(),
        dimension: Some(snapshot.dimension),
        model: Some(snapshot.model.clone()),
        built_at: Some(snapshot.built_at),
      },
      None => IndexStats { built: false, size: 0, dimension: None, model: None, built_at: None },
    }
  }

  /// Persist the live snapshot
  pub fn save(&self, path: &Path) -> Result<()> {
    self.snapshot().ok_or(SearchError::IndexNotBuilt)?.save(path)
  }

  /// Install a persisted snapshot if it was built by `provider`'s model
  ///
  /// The snapshot is paired with `ledger` as is; ids the ledger lacks are
  /// dropped at query time until the next rebuild.
  pub fn load_compatible(
    &self,
    path: &Path,
    provider: &dyn EmbeddingProvider,
    ledger: Arc<Ledger>,
  ) -> Result<SnapshotFit> {
    let snapshot = IndexSnapshot::load(path)?;

    if snapshot.dimension != provider.dimension() {
      return Err(SearchError::DimensionMismatch {
        expected: provider.dimension(),
        actual: snapshot.dimension,
      });
    }
    if snapshot.model != provider.model_name() {
      return Err(SearchError::Snapshot(format!(
        "snapshot built with {}, provider is {}",
        snapshot.model,
        provider.model_name()
      )));
    }

    let fit = SnapshotFit::compare(&snapshot, &ledger);
    self.install(ledger, snapshot);
    Ok(fit)
  }

  /// Reload the store, re-embed everything and swap in the result
  ///
  /// Fails fast with [`SearchError::RebuildInProgress`] if another rebuild
  /// holds the lock. On any failure the previous snapshot stays live.
  pub async fn rebuild(
    &self,
    store: &TransactionStore,
    provider: &dyn EmbeddingProvider,
  ) -> Result<RebuildReport> {
    let _guard = self.rebuild_lock.try_lock().map_err(|_| SearchError::RebuildInProgress)?;

    let timeout = self.settings.rebuild_timeout;
    tokio::time::timeout(timeout, self.rebuild_locked(store, provider))
      .await
      .map_err(|_| SearchError::RebuildTimeout(timeout))?
  }

  async fn rebuild_locked(
    &self,
    store: &TransactionStore,
    provider: &dyn EmbeddingProvider,
  ) -> Result<RebuildReport> {
    let started = Instant::now();
    let ledger = Ledger::load(store.path())?;

    ledgerlog::info!("embedding {} transactions with {}", ledger.len(), provider.model_name());

    let mut records = Vec::with_capacity(ledger.len());
    for batch in ledger.all().chunks(self.settings.batch_size.max(1)) {
      let texts: Vec<String> = batch.iter().map(|txn| txn.embedding_text()).collect();
      let vectors = embed_batch_with_timeout(provider, &texts, self.settings.batch_timeout).await?;

      records.extend(batch.iter().zip(vectors).map(|(txn, vector)| EmbeddingRecord {
        transaction_id: txn.id.clone(),
        user_id: txn.user_id.clone(),
        vector,
      }));
    }

    let snapshot = IndexSnapshot::new(provider.model_name(), provider.dimension(), records)?;
    let indexed = snapshot.len();

    let persisted = match &self.settings.snapshot_path {
      Some(path) => match snapshot.save(path) {
        Ok(()) => true,
        Err(e) => {
          ledgerlog::warn!("index rebuilt but not persisted: {e}");
          false
        }
      },
      None => false,
    };

    // the store's copy is for lookups; queries only see the pair installed below
    let ledger = store.replace(ledger);
    self.install(ledger, snapshot);

    let duration_ms = started.elapsed().as_millis() as u64;
    ledgerlog::success!("indexed {indexed} transactions in {duration_ms}ms");

    Ok(RebuildReport { indexed, duration_ms, persisted })
  }
}
