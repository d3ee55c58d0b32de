use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use finsight::cli::client::{SearchArgs, DEFAULT_SERVER};
use finsight::cli::commands::{self, GenerateOptions};
use finsight::config::ServiceConfig;

#[derive(Parser)]
#[command(name = "finsight")]
#[command(about = "finsight - semantic search over financial transactions")]
#[command(version)]
struct Cli {
  /// Server base URL
  #[arg(long, global = true, env = "FINSIGHT_SERVER", default_value = DEFAULT_SERVER)]
  server: String,

  /// Config file (defaults to ./finsight.json or ./.finsight.json)
  #[arg(short, long, global = true, env = "FINSIGHT_CONFIG")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

/// Structured filters for search
#[derive(Args)]
struct FilterArgs {
  /// Only this category (case-insensitive)
  #[arg(long)]
  category: Option<String>,
  /// Only Debit or Credit
  #[arg(long = "type")]
  txn_type: Option<String>,
  #[arg(long)]
  min_amount: Option<f64>,
  #[arg(long)]
  max_amount: Option<f64>,
  /// Only this month, as YYYY-MM
  #[arg(long)]
  month: Option<String>,
  /// Drop results scoring below this similarity
  #[arg(long)]
  min_score: Option<f32>,
}

#[derive(Subcommand)]
enum Command {
  /// Generate sample transaction data locally
  Generate {
    /// Output file (defaults to the configured data path)
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Seed for reproducible data
    #[arg(long)]
    seed: Option<u64>,
    /// Number of users
    #[arg(long)]
    users: Option<usize>,
    /// Overwrite an existing file
    #[arg(short, long)]
    force: bool,
  },
  /// Search transactions with a natural-language query
  Search {
    /// Query text
    #[arg(required = true)]
    query: Vec<String>,
    /// Restrict to one user
    #[arg(short, long)]
    user: Option<String>,
    /// Number of results (1-200)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,
    #[command(flatten)]
    filters: FilterArgs,
  },
  /// Rebuild the server's vector index
  Rebuild,
  /// Show server and index status
  Health,
}

async fn handle(cli: Cli) -> Result<()> {
  match cli.command {
    Command::Generate { out, seed, users, force } => {
      let config = ServiceConfig::load(cli.config.as_deref())?;
      commands::generate(&config, GenerateOptions { out, seed, users, force })
    }
    Command::Search { query, user, top_k, filters } => {
      let args = SearchArgs {
        query: query.join(" "),
        user_id: user,
        top_k,
        category: filters.category,
        txn_type: filters.txn_type,
        min_amount: filters.min_amount,
        max_amount: filters.max_amount,
        month: filters.month,
        min_score: filters.min_score,
      };
      commands::search(&cli.server, args).await
    }
    Command::Rebuild => commands::rebuild(&cli.server).await,
    Command::Health => commands::health(&cli.server).await,
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  handle(cli).await?;
  Ok(())
}
