//! Sentence-transformer embeddings through ONNX Runtime
//!
//! Downloads the tokenizer and ONNX export from the HuggingFace hub on first
//! load, then runs inference on a blocking thread. Output is mean-pooled over
//! the attention mask and L2-normalised.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hf_hub::api::tokio::Api;
use ndarray::Array2;
use ort::{
  execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch},
  session::Session,
  value::Value,
};
use tokenizers::Tokenizer;

use super::{mean_pool, normalize, EmbeddingProvider};
use crate::error::EmbeddingError;

const TOKENIZER_FILE: &str = "tokenizer.json";
const MODEL_FILE: &str = "onnx/model.onnx";

fn unavailable(e: impl Display) -> EmbeddingError {
  EmbeddingError::Unavailable(e.to_string())
}

struct Model {
  session: Session,
  tokenizer: Tokenizer,
  input_names: Vec<String>,
}

impl Model {
  fn embed(&mut self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let encoding = self.tokenizer.encode(text, true).map_err(unavailable)?;

    let mut input = HashMap::new();
    input.insert("input_ids".to_string(), to_tensor(encoding.get_ids())?);
    input.insert("attention_mask".to_string(), to_tensor(encoding.get_attention_mask())?);
    if self.input_names.iter().any(|name| name == "token_type_ids") {
      input.insert("token_type_ids".to_string(), to_tensor(encoding.get_type_ids())?);
    }

    let output = self.session.run(input).map_err(unavailable)?;
    let tensor = output
      .get("last_hidden_state")
      .or_else(|| output.get("0"))
      .ok_or_else(|| unavailable("model produced no last_hidden_state output"))?;
    let (shape, data) = tensor.try_extract_tensor::<f32>().map_err(unavailable)?;

    let pooled = mean_pool(shape.as_ref(), data, encoding.get_attention_mask())?;
    Ok(normalize(pooled))
  }
}

fn to_tensor(values: &[u32]) -> Result<Value, EmbeddingError> {
  let ids: Vec<i64> = values.iter().map(|&x| i64::from(x)).collect();
  let array = Array2::from_shape_vec((1, ids.len()), ids).map_err(unavailable)?;
  Ok(Value::from_array(array).map_err(unavailable)?.into())
}

/// Embedding provider backed by an ONNX sentence-transformer
pub struct OnnxEmbedder {
  model: Arc<Mutex<Model>>,
  model_name: String,
  dimension: usize,
}

#[cfg(not(tarpaulin_include))]
impl OnnxEmbedder {
  /// Download (or reuse the cached) model and check its output dimension
  pub async fn load(model_name: &str, dimension: usize) -> Result<Self> {
    ledgerlog::info!("loading embedding model {model_name}...");

    let (tokenizer_file, model_path) = Self::download(model_name).await?;
    let tokenizer =
      Tokenizer::from_file(tokenizer_file).map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

    let providers: Vec<ExecutionProviderDispatch> = vec![CPUExecutionProvider::default().into()];
    let session =
      Session::builder()?.with_execution_providers(providers)?.commit_from_file(model_path)?;
    let input_names = session.inputs.iter().map(|input| input.name.to_string()).collect();

    let embedder = Self {
      model: Arc::new(Mutex::new(Model { session, tokenizer, input_names })),
      model_name: model_name.to_string(),
      dimension,
    };

    let probe = embedder.run_blocking("dimension probe".to_string()).await?;
    if probe.len() != dimension {
      return Err(anyhow!(
        "Model {} produces {} dimensions, config expects {}",
        model_name,
        probe.len(),
        dimension
      ));
    }

    ledgerlog::success!("embedding model ready ({dimension} dimensions)");
    Ok(embedder)
  }

  async fn download(model_name: &str) -> Result<(PathBuf, PathBuf)> {
    let api = Api::new().map_err(|e| anyhow!("HF API initialization failed: {}", e))?;
    let repo = api.model(model_name.to_string());

    let tokenizer_file =
      repo.get(TOKENIZER_FILE).await.map_err(|e| anyhow!("Failed to download tokenizer: {}", e))?;
    let model_path =
      repo.get(MODEL_FILE).await.map_err(|e| anyhow!("Failed to download ONNX model: {}", e))?;

    Ok((tokenizer_file, model_path))
  }
}

impl OnnxEmbedder {
  async fn run_blocking(&self, text: String) -> Result<Vec<f32>, EmbeddingError> {
    let model = self.model.clone();
    tokio::task::spawn_blocking(move || {
      let mut guard = model.lock().map_err(|_| unavailable("embedding model lock poisoned"))?;
      guard.embed(&text)
    })
    .await
    .map_err(unavailable)?
  }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbedder {
  fn model_name(&self) -> &str {
    &self.model_name
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    if text.trim().is_empty() {
      return Err(EmbeddingError::EmptyInput);
    }
    self.run_blocking(text.to_string()).await
  }

  async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut vectors = Vec::with_capacity(texts.len());
    for text in texts {
      vectors.push(self.embed(text).await?);
    }
    Ok(vectors)
  }
}
