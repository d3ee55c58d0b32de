//! Display formatting utilities for CLI output

use colored::*;

use crate::index::RebuildReport;
use crate::pipeline::ScoredTransaction;
use crate::server::types::{HealthResponse, SearchResponse};
use crate::transaction::{format_amount, TxnType};

/// Bold-yellow every word of `text` that matches a query term
pub fn highlight_keywords(text: &str, terms: &[String]) -> String {
  let terms: Vec<String> =
    terms.iter().map(|t| t.to_lowercase()).filter(|t| !t.is_empty()).collect();

  text
    .split(' ')
    .map(|word| {
      let bare: String = word.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
      if !bare.is_empty() && terms.contains(&bare) {
        word.yellow().bold().to_string()
      } else {
        word.to_string()
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// One ranked line per result
pub fn format_result(rank: usize, result: &ScoredTransaction, terms: &[String]) -> String {
  let txn = &result.transaction;
  let amount = format!("₹{}", format_amount(txn.amount));
  let amount = match txn.txn_type {
    TxnType::Credit => amount.green(),
    TxnType::Debit => amount.red(),
  };

  format!(
    "{:>2}. [{:.3}] {} {} {} {} ({}, {})",
    rank,
    result.score,
    txn.date,
    txn.id.dimmed(),
    amount,
    highlight_keywords(&txn.description, terms),
    txn.category.cyan(),
    txn.user_id.blue()
  )
}

pub fn display_search(response: &SearchResponse) {
  let terms: Vec<String> = response.query.split_whitespace().map(str::to_string).collect();

  if response.results.is_empty() {
    println!("No matching transactions for '{}'.", response.query.yellow());
  } else {
    println!("{} result(s) for '{}':", response.results_found, response.query.yellow());
    for (i, result) in response.results.iter().enumerate() {
      println!("{}", format_result(i + 1, result, &terms));
    }
  }

  if response.retried {
    println!("{}", format!("(searched all {} candidates)", response.candidates_examined).dimmed());
  }
  if !response.dropped_ids.is_empty() {
    println!(
      "{} {} stale index entries skipped; consider `finsight rebuild`",
      "⚠".yellow(),
      response.dropped_ids.len()
    );
  }
}

pub fn display_rebuild(report: &RebuildReport) {
  println!("{} Indexed {} transactions in {}ms", "✓".green(), report.indexed, report.duration_ms);
  if !report.persisted {
    println!("{}", "Index snapshot was not written to disk".dimmed());
  }
}

pub fn display_health(health: &HealthResponse) {
  let status = if health.index_built { health.status.green() } else { health.status.yellow() };
  println!("Status:       {status}");
  println!("Transactions: {}", health.transactions);
  println!("Index size:   {}", health.index_size);
  if let Some(model) = &health.model {
    println!("Model:        {} ({} dims)", model, health.dimension.unwrap_or_default());
  }
  if let Some(built_at) = health.built_at {
    println!("Built at:     {}", built_at.to_rfc3339());
  }
  if health.dropped_stale_ids > 0 {
    println!("Stale ids:    {}", health.dropped_stale_ids.to_string().yellow());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn test_highlight_keeps_text_when_no_terms_match() {
    colored::control::set_override(false);
    let text = "UPI payment to Swiggy";
    assert_eq!(highlight_keywords(text, &["rent".to_string()]), text);
    assert_eq!(highlight_keywords(text, &["swiggy".to_string()]), text);
    colored::control::unset_override();
  }

  #[test]
  #[serial]
  fn test_highlight_marks_matching_words() {
    colored::control::set_override(true);
    let out = highlight_keywords("Card payment at Swiggy!", &["SWIGGY".to_string()]);
    assert!(out.contains("\u{1b}["));
    assert!(out.starts_with("Card payment at "));
    colored::control::unset_override();
  }
}
