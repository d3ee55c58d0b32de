//! Feature-hashing embedder
//!
//! Deterministic and dependency-free: word tokens and character trigrams are
//! hashed (FNV-1a) into signed buckets, then the vector is L2-normalised.
//! Texts sharing words or word fragments land close together, which is
//! enough for keyword-flavoured search without downloading a model.
//!
//! Each distinct word counts once. Tokens carrying digits (amounts, dates,
//! user ids) get a single light feature so the words of a description
//! dominate the vector.

use std::collections::HashSet;

use async_trait::async_trait;

use super::{normalize, EmbeddingProvider};
use crate::error::EmbeddingError;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.35;
const NUMBER_WEIGHT: f32 = 0.2;

// template glue plus the filler words people put around a query
const STOP_WORDS: &[&str] = &[
  "a", "an", "and", "are", "as", "at", "by", "category", "expense", "expenses", "for", "from", "in",
  "is", "me", "my", "of", "on", "or", "show", "spend", "spending", "spent", "the", "to",
  "transaction", "transactions", "under", "user", "via", "what", "with",
];

fn fnv1a(bytes: &[u8]) -> u64 {
  bytes.iter().fold(FNV_OFFSET, |hash, &byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

fn tokenize(text: &str) -> Vec<String> {
  text
    .to_lowercase()
    .split(|c: char| !c.is_alphanumeric())
    .filter(|token| !token.is_empty())
    .map(str::to_string)
    .collect()
}

/// Bag-of-features embedder with a fixed dimension
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
  dimension: usize,
  model_name: String,
}

impl HashingEmbedder {
  pub fn new(dimension: usize) -> Self {
    let dimension = dimension.max(1);
    Self { dimension, model_name: format!("hashing-fnv1a-{dimension}") }
  }

  /// Synchronous core shared by `embed` and `embed_batch`
  pub fn vectorize(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    if text.trim().is_empty() {
      return Err(EmbeddingError::EmptyInput);
    }

    let tokens = tokenize(text);
    let mut words: Vec<&str> =
      tokens.iter().map(String::as_str).filter(|t| !STOP_WORDS.contains(t)).collect();
    if words.is_empty() {
      // nothing but stop words; better than a zero vector
      words = tokens.iter().map(String::as_str).collect();
    }

    let mut vector = vec![0.0f32; self.dimension];
    if words.is_empty() {
      self.add_feature(&mut vector, text.trim().as_bytes(), WORD_WEIGHT);
      return Ok(normalize(vector));
    }

    let mut seen = HashSet::with_capacity(words.len());
    for word in words {
      if !seen.insert(word) {
        continue;
      }
      if word.chars().any(|c| c.is_ascii_digit()) {
        self.add_feature(&mut vector, word.as_bytes(), NUMBER_WEIGHT);
        continue;
      }

      self.add_feature(&mut vector, word.as_bytes(), WORD_WEIGHT);

      let padded: Vec<char> = format!("#{word}#").chars().collect();
      for trigram in padded.windows(3) {
        let trigram: String = trigram.iter().collect();
        self.add_feature(&mut vector, trigram.as_bytes(), TRIGRAM_WEIGHT);
      }
    }

    Ok(normalize(vector))
  }

  fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
    let hash = fnv1a(feature);
    let bucket = (hash % self.dimension as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign * weight;
  }
}

impl Default for HashingEmbedder {
  fn default() -> Self {
    Self::new(384)
  }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
  fn model_name(&self) -> &str {
    &self.model_name
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.vectorize(text)
  }

  async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    texts.iter().map(|text| self.vectorize(text)).collect()
  }
}
