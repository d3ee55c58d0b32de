use anyhow::{anyhow, Result};
use chrono::Utc;
use colored::*;
use std::path::PathBuf;

use crate::cli::client::{ClientConfig, FinsightClient, SearchArgs};
use crate::cli::display::{display_health, display_rebuild, display_search};
use crate::config::{GeneratorConfig, ServiceConfig};
use crate::generator::TransactionGenerator;
use crate::store;

/// Options for `finsight generate`
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
  pub out: Option<PathBuf>,
  pub seed: Option<u64>,
  pub users: Option<usize>,
  pub force: bool,
}

fn client(server: &str) -> Result<FinsightClient> {
  FinsightClient::new(ClientConfig { base_url: server.to_string(), ..ClientConfig::default() })
}

/// Write sample transactions locally; no server needed
pub fn generate(config: &ServiceConfig, options: GenerateOptions) -> Result<()> {
  let out = options.out.unwrap_or_else(|| config.data.data_path.clone());
  if out.exists() && !options.force {
    return Err(anyhow!("{} already exists (use --force to overwrite)", out.display()));
  }

  let generator_config = GeneratorConfig {
    num_users: options.users.unwrap_or(config.data.generator.num_users),
    seed: options.seed.or(config.data.generator.seed),
    ..config.data.generator.clone()
  };
  if generator_config.num_users == 0 {
    return Err(anyhow!("--users must be at least 1"));
  }

  let transactions = TransactionGenerator::new(generator_config).generate(Utc::now().date_naive());
  store::save(&out, &transactions)?;

  println!(
    "{} Generated {} transactions at {}",
    "✓".green(),
    transactions.len(),
    out.display().to_string().cyan()
  );
  Ok(())
}

pub async fn search(server: &str, args: SearchArgs) -> Result<()> {
  let response = client(server)?.search(&args).await?;
  display_search(&response);
  Ok(())
}

pub async fn rebuild(server: &str) -> Result<()> {
  println!("Rebuilding index...");
  let report = client(server)?.rebuild().await?;
  display_rebuild(&report);
  Ok(())
}

pub async fn health(server: &str) -> Result<()> {
  let health = client(server)?.health().await?;
  display_health(&health);
  Ok(())
}
