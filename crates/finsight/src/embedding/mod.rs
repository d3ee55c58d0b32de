//! Embedding providers
//!
//! Everything that turns text into vectors sits behind [`EmbeddingProvider`]
//! so the index and query pipeline never know which model is in use.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::EmbeddingError;

mod hashing;
#[cfg(feature = "ml-features")]
mod onnx;

pub use hashing::HashingEmbedder;
#[cfg(feature = "ml-features")]
pub use onnx::OnnxEmbedder;

/// Text to fixed-dimension vector
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  /// Identifier recorded in index snapshots
  fn model_name(&self) -> &str;

  /// Length of every vector this provider returns
  fn dimension(&self) -> usize;

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

  async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Build the provider selected in config
pub async fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
  match config.provider {
    ProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
    #[cfg(feature = "ml-features")]
    ProviderKind::Onnx => Ok(Arc::new(OnnxEmbedder::load(&config.model, config.dimension).await?)),
    #[cfg(not(feature = "ml-features"))]
    ProviderKind::Onnx => {
      Err(anyhow::anyhow!("ONNX embeddings need a build with the `ml-features` feature"))
    }
  }
}

/// Embed one query text, bounded by `timeout` and checked for length
pub async fn embed_with_timeout(
  provider: &dyn EmbeddingProvider,
  text: &str,
  timeout: Duration,
) -> Result<Vec<f32>, EmbeddingError> {
  if text.trim().is_empty() {
    return Err(EmbeddingError::EmptyInput);
  }

  let vector = tokio::time::timeout(timeout, provider.embed(text))
    .await
    .map_err(|_| EmbeddingError::Timeout(timeout))??;

  check_dimension(provider.dimension(), &vector)?;
  Ok(vector)
}

/// Embed a batch, bounded by `timeout`; every vector is length-checked
pub async fn embed_batch_with_timeout(
  provider: &dyn EmbeddingProvider,
  texts: &[String],
  timeout: Duration,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
  let vectors = tokio::time::timeout(timeout, provider.embed_batch(texts))
    .await
    .map_err(|_| EmbeddingError::Timeout(timeout))??;

  if vectors.len() != texts.len() {
    return Err(EmbeddingError::Unavailable(format!(
      "provider returned {} vectors for {} texts",
      vectors.len(),
      texts.len()
    )));
  }

  for vector in &vectors {
    check_dimension(provider.dimension(), vector)?;
  }
  Ok(vectors)
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), EmbeddingError> {
  if vector.len() != expected {
    return Err(EmbeddingError::DimensionMismatch { expected, actual: vector.len() });
  }
  Ok(())
}

/// Scale to unit length; zero vectors are returned unchanged
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
  let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();

  if magnitude < f32::EPSILON {
    return vector;
  }

  for value in vector.iter_mut() {
    *value /= magnitude;
  }
  vector
}

/// Cosine similarity in [-1, 1]; 0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 0.0;
  }

  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
    return 0.0;
  }

  (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Mean of token embeddings, counting only positions where `mask` is set
///
/// `shape` is `[batch, sequence, hidden]`; only the first batch row is pooled.
pub fn mean_pool(shape: &[i64], data: &[f32], mask: &[u32]) -> Result<Vec<f32>, EmbeddingError> {
  if shape.len() != 3 {
    return Err(EmbeddingError::Unavailable(format!("unexpected output shape {shape:?}")));
  }

  let seq_length = shape[1] as usize;
  let hidden_size = shape[2] as usize;
  if data.len() < seq_length * hidden_size {
    return Err(EmbeddingError::Unavailable("model output shorter than its shape".to_string()));
  }

  let mut pooled = vec![0.0f32; hidden_size];
  let mut counted = 0usize;
  for token_idx in 0..seq_length {
    if mask.get(token_idx).copied().unwrap_or(0) == 0 {
      continue;
    }
    let start = token_idx * hidden_size;
    for (i, &value) in data[start..start + hidden_size].iter().enumerate() {
      pooled[i] += value;
    }
    counted += 1;
  }

  if counted > 0 {
    for value in pooled.iter_mut() {
      *value /= counted as f32;
    }
  }

  Ok(pooled)
}
