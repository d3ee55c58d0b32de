//! Service configuration
//!
//! Loaded from `finsight.json` / `.finsight.json` in the working directory
//! (or an explicit path), falling back to defaults for anything missing.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
  #[serde(default)]
  pub data: DataConfig,
  #[serde(default)]
  pub embedding: EmbeddingConfig,
  #[serde(default)]
  pub search: SearchConfig,
  #[serde(default)]
  pub server: ServerConfig,
}

/// Where transaction data and the index snapshot live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
  #[serde(default = "default_data_path")]
  pub data_path: PathBuf,
  #[serde(default = "default_index_path")]
  pub index_path: PathBuf,
  #[serde(default)]
  pub generator: GeneratorConfig,
}

/// Sample data generation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
  #[serde(default = "default_num_users")]
  pub num_users: usize,
  #[serde(default = "default_min_transactions")]
  pub min_transactions: usize,
  #[serde(default = "default_max_transactions")]
  pub max_transactions: usize,
  #[serde(default = "default_history_days")]
  pub history_days: i64,
  #[serde(default)]
  pub seed: Option<u64>,
}

/// Which embedding provider backs the service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
  Hashing,
  Onnx,
}

/// Embedding provider settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
  #[serde(default = "default_provider")]
  pub provider: ProviderKind,
  #[serde(default = "default_model")]
  pub model: String,
  #[serde(default = "default_dimension")]
  pub dimension: usize,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  #[serde(default = "default_batch_size")]
  pub batch_size: usize,
}

/// Query pipeline and rebuild limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
  #[serde(default = "default_top_k")]
  pub default_top_k: usize,
  #[serde(default = "default_max_top_k")]
  pub max_top_k: usize,
  #[serde(default = "default_overfetch_factor")]
  pub overfetch_factor: usize,
  #[serde(default = "default_rebuild_timeout_secs")]
  pub rebuild_timeout_secs: u64,
  /// Results scoring below this are not relevant enough to return
  #[serde(default = "default_min_score")]
  pub min_score: f32,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
  #[serde(default = "default_bind")]
  pub bind: SocketAddr,
  #[serde(default)]
  pub logs_path: Option<PathBuf>,
}

fn default_data_path() -> PathBuf {
  PathBuf::from("data/transactions.json")
}
fn default_index_path() -> PathBuf {
  PathBuf::from("embeddings/vector_store.json")
}
fn default_num_users() -> usize {
  5
}
fn default_min_transactions() -> usize {
  100
}
fn default_max_transactions() -> usize {
  300
}
fn default_history_days() -> i64 {
  180
}
fn default_provider() -> ProviderKind {
  ProviderKind::Hashing
}
fn default_model() -> String {
  "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_dimension() -> usize {
  384
}
fn default_timeout_ms() -> u64 {
  10_000
}
fn default_batch_size() -> usize {
  128
}
fn default_top_k() -> usize {
  5
}
fn default_max_top_k() -> usize {
  200
}
fn default_overfetch_factor() -> usize {
  3
}
fn default_rebuild_timeout_secs() -> u64 {
  300
}
fn default_min_score() -> f32 {
  0.1
}
fn default_bind() -> SocketAddr {
  SocketAddr::from(([127, 0, 0, 1], 8000))
}

impl Default for DataConfig {
  fn default() -> Self {
    Self {
      data_path: default_data_path(),
      index_path: default_index_path(),
      generator: GeneratorConfig::default(),
    }
  }
}

impl Default for GeneratorConfig {
  fn default() -> Self {
    Self {
      num_users: default_num_users(),
      min_transactions: default_min_transactions(),
      max_transactions: default_max_transactions(),
      history_days: default_history_days(),
      seed: None,
    }
  }
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: default_provider(),
      model: default_model(),
      dimension: default_dimension(),
      timeout_ms: default_timeout_ms(),
      batch_size: default_batch_size(),
    }
  }
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      default_top_k: default_top_k(),
      max_top_k: default_max_top_k(),
      overfetch_factor: default_overfetch_factor(),
      rebuild_timeout_secs: default_rebuild_timeout_secs(),
      min_score: default_min_score(),
    }
  }
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self { bind: default_bind(), logs_path: None }
  }
}

impl EmbeddingConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

impl SearchConfig {
  pub fn rebuild_timeout(&self) -> Duration {
    Duration::from_secs(self.rebuild_timeout_secs)
  }
}

impl ServerConfig {
  /// Configured logs path, or `~/.finsight/server.logs.jsonl`
  pub fn logs_path(&self) -> PathBuf {
    self.logs_path.clone().unwrap_or_else(|| {
      dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".finsight")
        .join("server.logs.jsonl")
    })
  }
}

impl ServiceConfig {
  /// Load configuration from a file
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ServiceConfig = serde_json::from_str(&content)
      .with_context(|| format!("Invalid config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
  }

  /// Load from an explicit path, the working directory, or defaults
  pub fn load(explicit: Option<&Path>) -> Result<Self> {
    if let Some(path) = explicit {
      return Self::load_from_file(path);
    }

    for candidate in ["finsight.json", ".finsight.json"] {
      if Path::new(candidate).exists() {
        return Self::load_from_file(candidate);
      }
    }

    Ok(Self::default())
  }

  /// Save configuration to a file
  pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let content = serde_json::to_string_pretty(self)?;
    std::fs::write(path, content)?;
    Ok(())
  }

  /// Reject settings the pipeline cannot honour
  pub fn validate(&self) -> Result<()> {
    if self.embedding.dimension == 0 {
      return Err(anyhow!("embedding.dimension must be positive"));
    }
    if self.embedding.batch_size == 0 {
      return Err(anyhow!("embedding.batch_size must be positive"));
    }
    if self.search.max_top_k == 0 {
      return Err(anyhow!("search.max_top_k must be positive"));
    }
    if !(1..=self.search.max_top_k).contains(&self.search.default_top_k) {
      return Err(anyhow!("search.default_top_k must be within 1..={}", self.search.max_top_k));
    }
    if self.search.overfetch_factor == 0 {
      return Err(anyhow!("search.overfetch_factor must be at least 1"));
    }
    if !(-1.0..=1.0).contains(&self.search.min_score) {
      return Err(anyhow!("search.min_score must be within -1..=1"));
    }
    Ok(())
  }
}
