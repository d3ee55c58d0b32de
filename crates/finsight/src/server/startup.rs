//! REST server startup and configuration

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::serve;
use chrono::Utc;
use ledgerlog::service_logs::ServiceLogs;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServiceConfig;
use crate::embedding::{provider_from_config, EmbeddingProvider};
use crate::error::SearchError;
use crate::generator::TransactionGenerator;
use crate::server::routing::create_router;
use crate::server::state::AppState;
use crate::store::{self, TransactionStore};

const COMPONENT: &str = "finsight-server";

/// Write sample data if the data file does not exist yet
pub async fn ensure_sample_data(config: &ServiceConfig, logs: &ServiceLogs) -> Result<()> {
  let path = &config.data.data_path;
  if path.exists() {
    return Ok(());
  }

  let transactions =
    TransactionGenerator::new(config.data.generator.clone()).generate(Utc::now().date_naive());
  store::save(path, &transactions)?;
  logs
    .info(&format!("Generated {} sample transactions at {}", transactions.len(), path.display()), COMPONENT)
    .await;
  Ok(())
}

/// Install the persisted index if it matches the provider, otherwise rebuild
pub async fn warm_index(state: &AppState) -> Result<()> {
  let path = &state.config.data.index_path;

  if path.exists() {
    match state.index.load_compatible(path, state.provider.as_ref(), state.store.ledger()) {
      Ok(fit) if fit.is_exact() => {
        state.logs.info(&format!("Loaded index snapshot with {} entries", fit.indexed), COMPONENT).await;
        return Ok(());
      }
      Ok(fit) => {
        // still serves; stale ids are dropped per query until a rebuild
        state
          .logs
          .warn(
            &format!(
              "Index snapshot does not match the data file: {} indexed, {} transactions, \
               {} indexed ids missing from the store, {} transactions not indexed; \
               POST /api/v1/index/rebuild to repair it",
              fit.indexed, fit.transactions, fit.missing_from_store, fit.missing_from_index
            ),
            COMPONENT,
          )
          .await;
        return Ok(());
      }
      Err(e) => {
        state.logs.warn(&format!("Ignoring index snapshot ({e}); rebuilding"), COMPONENT).await;
      }
    }
  }

  match state.index.rebuild(&state.store, state.provider.as_ref()).await {
    Ok(report) => {
      state
        .logs
        .success(&format!("Built index of {} transactions in {}ms", report.indexed, report.duration_ms), COMPONENT)
        .await;
      Ok(())
    }
    Err(e @ SearchError::DataUnavailable(_)) => Err(e.into()),
    Err(e) => {
      // serve anyway; health reports "initializing" until a rebuild succeeds
      state.logs.error(&format!("Initial index build failed: {e}"), COMPONENT).await;
      Ok(())
    }
  }
}

/// Load data, provider and index into shared state
pub async fn prepare_state(
  config: ServiceConfig,
  provider: Arc<dyn EmbeddingProvider>,
  logs: ServiceLogs,
) -> Result<AppState> {
  ensure_sample_data(&config, &logs).await?;

  let store = TransactionStore::open(&config.data.data_path)
    .with_context(|| "Transaction data is required to start the server")?;
  logs.info(&format!("Loaded {} transactions", store.len()), COMPONENT).await;

  let state = AppState::new(config, store, provider, logs);
  warm_index(&state).await?;
  Ok(state)
}

/// Start the REST server
pub async fn start_server(config: ServiceConfig) -> Result<()> {
  let logs = ServiceLogs::new(config.server.logs_path())?;
  let addr = config.server.bind;
  logs.info(&format!("Starting finsight REST server on {addr}"), COMPONENT).await;

  let provider = provider_from_config(&config.embedding).await?;
  let state = prepare_state(config, provider, logs.clone()).await?;

  let app = create_router(state)
    .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()));

  let listener = TcpListener::bind(addr).await?;
  logs.info(&format!("Server listening on {addr}"), COMPONENT).await;

  match serve(listener, app).await {
    Ok(_) => {
      logs.info("Server shutdown gracefully", COMPONENT).await;
      Ok(())
    }
    Err(e) => {
      logs.error(&format!("Server error: {e}"), COMPONENT).await;
      Err(anyhow::anyhow!("Server error: {}", e))
    }
  }
}
