//! Error taxonomy for the search service

use std::time::Duration;
use thiserror::Error;

/// Failures reading or validating the transaction data file
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Transaction data not found at {path}")]
  Missing { path: String },

  #[error("Failed to read transaction data at {path}: {message}")]
  Unreadable { path: String, message: String },

  #[error("Transaction data at {path} is not valid JSON: {message}")]
  Malformed { path: String, message: String },

  #[error("Transaction {id} is invalid: {reason}")]
  Invalid { id: String, reason: String },

  #[error("Duplicate transaction id {id}")]
  DuplicateId { id: String },

  #[error("Failed to write transaction data to {path}: {message}")]
  Write { path: String, message: String },
}

/// Failures from an embedding provider
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmbeddingError {
  #[error("Cannot embed empty text")]
  EmptyInput,

  #[error("Embedding provider unavailable: {0}")]
  Unavailable(String),

  #[error("Embedding provider timed out after {0:?}")]
  Timeout(Duration),

  #[error("Embedding has {actual} dimensions, expected {expected}")]
  DimensionMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the index and the query pipeline
#[derive(Debug, Error)]
pub enum SearchError {
  #[error("Transaction data unavailable: {0}")]
  DataUnavailable(#[from] StoreError),

  #[error(transparent)]
  Embedding(#[from] EmbeddingError),

  #[error("Vector index has not been built")]
  IndexNotBuilt,

  #[error("Index references transaction {transaction_id} which is not in the store")]
  InconsistentIndex { transaction_id: String },

  #[error("Invalid argument: {0}")]
  InvalidArgument(String),

  #[error("An index rebuild is already in progress")]
  RebuildInProgress,

  #[error("Rebuild did not finish within {0:?}")]
  RebuildTimeout(Duration),

  #[error("Vector has {actual} dimensions, index expects {expected}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("Index snapshot error: {0}")]
  Snapshot(String),
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;

impl SearchError {
  /// Stable machine-readable key used in API error payloads
  pub fn key(&self) -> &'static str {
    match self {
      SearchError::DataUnavailable(_) => "data_unavailable",
      SearchError::Embedding(EmbeddingError::EmptyInput) => "invalid_argument",
      SearchError::Embedding(EmbeddingError::Timeout(_)) => "embedding_timeout",
      SearchError::Embedding(_) => "embedding_error",
      SearchError::IndexNotBuilt => "index_not_built",
      SearchError::InconsistentIndex { .. } => "inconsistent_index",
      SearchError::InvalidArgument(_) => "invalid_argument",
      SearchError::RebuildInProgress => "rebuild_in_progress",
      SearchError::RebuildTimeout(_) => "rebuild_timeout",
      SearchError::DimensionMismatch { .. } => "dimension_mismatch",
      SearchError::Snapshot(_) => "snapshot_error",
    }
  }
}
