//! Synthetic transaction generator
//!
//! Produces per-user chronological transaction histories with running
//! balances. A seed makes the output reproducible; the reference date is
//! injectable so tests do not depend on the wall clock.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::GeneratorConfig;
use crate::transaction::{Transaction, TxnType};

const DEBIT_CATEGORIES: &[&str] =
  &["Food", "Shopping", "Rent", "Utilities", "Entertainment", "Travel", "Others"];

const PAYMENT_METHODS: &[&str] = &["UPI payment to", "Card payment at", "Online payment to", "Cash at"];

const SALARY_PAYERS: &[&str] = &["Company XYZ", "Employer Corp"];

const REFUND_SOURCES: &[&str] = &["Amazon", "Swiggy", "Utility"];

const FIRST_TXN_NUMBER: u64 = 1001;

fn merchants(category: &str) -> &'static [&'static str] {
  match category {
    "Food" => &["Swiggy", "Zomato", "McDonald's", "Domino's", "Local Restaurant"],
    "Shopping" => &["Amazon", "Flipkart", "Myntra", "Shopping Mall"],
    "Rent" => &["Landlord", "Property Manager"],
    "Utilities" => &["Electricity Co", "Internet Provider", "Water Dept"],
    "Entertainment" => &["Netflix", "Movie Theater", "Concert"],
    "Travel" => &["Uber", "IRCTC", "Hotel Booking"],
    _ => &["ATM", "Bank Transfer", "Friend"],
  }
}

fn amount_range(category: &str) -> (u32, u32) {
  match category {
    "Food" => (50, 1500),
    "Shopping" => (100, 5000),
    "Rent" => (8000, 20000),
    "Utilities" => (500, 3000),
    "Entertainment" => (200, 2000),
    "Travel" => (1000, 10000),
    _ => (50, 2000),
  }
}

/// Payment method implied by a generated description
pub fn infer_method(description: &str, txn_type: TxnType) -> &'static str {
  let lower = description.to_lowercase();
  if lower.contains("upi") {
    "UPI"
  } else if lower.contains("card") {
    "Card"
  } else if lower.contains("online") {
    "Online"
  } else if lower.contains("cash") {
    "Cash"
  } else if txn_type == TxnType::Credit && lower.contains("refund") {
    "Refund"
  } else {
    "Other"
  }
}

/// Seedable generator of sample transactions
pub struct TransactionGenerator {
  rng: StdRng,
  config: GeneratorConfig,
}

impl TransactionGenerator {
  pub fn new(config: GeneratorConfig) -> Self {
    let rng = match config.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    Self { rng, config }
  }

  /// Generate histories for every user, dated relative to `today`
  pub fn generate(&mut self, today: NaiveDate) -> Vec<Transaction> {
    let mut transactions = Vec::new();
    let mut next_number = FIRST_TXN_NUMBER;
    let min = self.config.min_transactions.min(self.config.max_transactions);
    let max = self.config.max_transactions.max(min);

    for user_index in 1..=self.config.num_users {
      let user_id = format!("user_{user_index}");
      let mut balance = f64::from(self.rng.gen_range(20_000..=50_000u32));
      let count = self.rng.gen_range(min..=max);

      // oldest first so the running balance is chronological
      let mut days_ago: Vec<i64> =
        (0..count).map(|_| self.rng.gen_range(1..=self.config.history_days.max(1))).collect();
      days_ago.sort_unstable_by(|a, b| b.cmp(a));

      for offset in days_ago {
        let (txn_type, category, amount) = self.pick_kind();
        let description = self.describe(category, txn_type);
        let method = infer_method(&description, txn_type);

        match txn_type {
          TxnType::Credit => balance += amount,
          TxnType::Debit => balance -= amount,
        }

        transactions.push(Transaction {
          id: format!("txn_{next_number}"),
          user_id: user_id.clone(),
          date: today - Duration::days(offset),
          description,
          amount,
          txn_type,
          category: category.to_string(),
          balance,
          method: Some(method.to_string()),
        });
        next_number += 1;
      }
    }

    transactions
  }

  fn pick_kind(&mut self) -> (TxnType, &'static str, f64) {
    if self.rng.gen_bool(0.15) {
      if self.rng.gen_bool(0.7) {
        (TxnType::Credit, "Salary", f64::from(self.rng.gen_range(2000..=15_000u32)))
      } else {
        (TxnType::Credit, "Others", f64::from(self.rng.gen_range(500..=2000u32)))
      }
    } else {
      let category = DEBIT_CATEGORIES.choose(&mut self.rng).copied().unwrap_or("Others");
      let (low, high) = amount_range(category);
      (TxnType::Debit, category, f64::from(self.rng.gen_range(low..=high)))
    }
  }

  fn describe(&mut self, category: &str, txn_type: TxnType) -> String {
    let pick = |rng: &mut StdRng, options: &[&'static str]| options.choose(rng).copied().unwrap_or("Unknown");

    match (txn_type, category) {
      (TxnType::Credit, "Salary") => format!("Salary credit from {}", pick(&mut self.rng, SALARY_PAYERS)),
      (TxnType::Credit, _) => format!("Refund from {}", pick(&mut self.rng, REFUND_SOURCES)),
      (TxnType::Debit, _) => {
        let method = pick(&mut self.rng, PAYMENT_METHODS);
        let merchant = pick(&mut self.rng, merchants(category));
        format!("{method} {merchant}")
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  fn config(seed: u64) -> GeneratorConfig {
    GeneratorConfig { num_users: 3, min_transactions: 20, max_transactions: 40, history_days: 180, seed: Some(seed) }
  }

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
  }

  #[test]
  fn test_same_seed_same_output() {
    let a = TransactionGenerator::new(config(42)).generate(today());
    let b = TransactionGenerator::new(config(42)).generate(today());
    assert_eq!(a, b);
  }

  #[test]
  fn test_counts_and_unique_ids() {
    let txns = TransactionGenerator::new(config(7)).generate(today());
    let ids: HashSet<_> = txns.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids.len(), txns.len());
    assert_eq!(txns[0].id, "txn_1001");

    for user in ["user_1", "user_2", "user_3"] {
      let count = txns.iter().filter(|t| t.user_id == user).count();
      assert!((20..=40).contains(&count), "{user} has {count}");
    }
  }

  #[test]
  fn test_histories_are_chronological_with_consistent_balances() {
    let txns = TransactionGenerator::new(config(3)).generate(today());

    for user in ["user_1", "user_2", "user_3"] {
      let history: Vec<_> = txns.iter().filter(|t| t.user_id == user).collect();
      for pair in history.windows(2) {
        assert!(pair[0].date <= pair[1].date);
        let delta = match pair[1].txn_type {
          TxnType::Credit => pair[1].amount,
          TxnType::Debit => -pair[1].amount,
        };
        assert!((pair[0].balance + delta - pair[1].balance).abs() < 1e-6);
      }
    }
  }

  #[test]
  fn test_records_are_valid_and_in_range() {
    let txns = TransactionGenerator::new(config(11)).generate(today());
    for txn in &txns {
      txn.validate().unwrap();
      assert!(txn.date < today());
      assert!(txn.date >= today() - Duration::days(180));
      if txn.category == "Salary" {
        assert_eq!(txn.txn_type, TxnType::Credit);
        assert!(txn.description.starts_with("Salary credit from"));
      }
    }
  }

  #[test]
  fn test_infer_method() {
    assert_eq!(infer_method("UPI payment to Swiggy", TxnType::Debit), "UPI");
    assert_eq!(infer_method("Card payment at Myntra", TxnType::Debit), "Card");
    assert_eq!(infer_method("Refund from Amazon", TxnType::Credit), "Refund");
    assert_eq!(infer_method("Salary credit from Employer Corp", TxnType::Credit), "Other");
  }
}
