//! finsight REST Server
//!
//! Loads (or generates) transaction data, builds the vector index and serves
//! the search API.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use finsight::config::ServiceConfig;
use finsight::server::startup::start_server;

#[derive(Parser)]
#[command(name = "finsight_server")]
#[command(about = "finsight transaction search REST server")]
#[command(version)]
struct Args {
  /// Config file (defaults to ./finsight.json or ./.finsight.json)
  #[arg(short, long, env = "FINSIGHT_CONFIG")]
  config: Option<PathBuf>,

  /// Server bind address, overrides the config file
  #[arg(long)]
  bind: Option<SocketAddr>,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  let filter = if args.verbose {
    EnvFilter::new("finsight=debug,tower_http=debug,info")
  } else {
    EnvFilter::new("finsight=info,warn")
  };
  tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

  let mut config = ServiceConfig::load(args.config.as_deref())?;
  if let Some(bind) = args.bind {
    config.server.bind = bind;
  }

  ledgerlog::info!("Starting finsight server v{}", env!("CARGO_PKG_VERSION"));
  ledgerlog::info!("Binding to address: {}", config.server.bind);

  start_server(config).await
}
