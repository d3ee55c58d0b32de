//! Shared application state handed to every handler

use std::sync::Arc;

use ledgerlog::service_logs::ServiceLogs;

use crate::config::ServiceConfig;
use crate::embedding::EmbeddingProvider;
use crate::index::{IndexSettings, VectorIndex};
use crate::pipeline::{PipelineSettings, QueryPipeline};
use crate::store::TransactionStore;

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<ServiceConfig>,
  pub store: Arc<TransactionStore>,
  pub index: Arc<VectorIndex>,
  pub provider: Arc<dyn EmbeddingProvider>,
  pub pipeline: Arc<QueryPipeline>,
  pub logs: ServiceLogs,
}

impl AppState {
  /// Wire the store, an empty index and the pipeline together
  pub fn new(
    config: ServiceConfig,
    store: TransactionStore,
    provider: Arc<dyn EmbeddingProvider>,
    logs: ServiceLogs,
  ) -> Self {
    let store = Arc::new(store);
    let index = Arc::new(VectorIndex::new(IndexSettings::from_config(&config)));
    let pipeline = Arc::new(QueryPipeline::new(
      index.clone(),
      provider.clone(),
      PipelineSettings::from_config(&config),
    ));

    Self { config: Arc::new(config), store, index, provider, pipeline, logs }
  }
}
