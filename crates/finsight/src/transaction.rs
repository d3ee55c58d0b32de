//! Transaction records and their canonical embedding text

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StoreError;

/// Direction of money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TxnType {
  Debit,
  Credit,
}

impl TxnType {
  pub fn as_str(self) -> &'static str {
    match self {
      TxnType::Debit => "Debit",
      TxnType::Credit => "Credit",
    }
  }

  /// Case-insensitive parse used by query filters
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "debit" => Some(TxnType::Debit),
      "credit" => Some(TxnType::Credit),
      _ => None,
    }
  }
}

impl fmt::Display for TxnType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single immutable transaction, owned by exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
  pub id: String,
  pub user_id: String,
  pub date: NaiveDate,
  pub description: String,
  pub amount: f64,
  #[serde(rename = "type")]
  pub txn_type: TxnType,
  pub category: String,
  pub balance: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,
}

impl Transaction {
  /// Check the fixed-shape invariants enforced at load time
  pub fn validate(&self) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::Invalid { id: self.id.clone(), reason: reason.to_string() };

    if self.id.trim().is_empty() {
      return Err(invalid("empty id"));
    }
    if self.user_id.trim().is_empty() {
      return Err(invalid("empty userId"));
    }
    if self.description.trim().is_empty() {
      return Err(invalid("empty description"));
    }
    if self.category.trim().is_empty() {
      return Err(invalid("empty category"));
    }
    if !self.amount.is_finite() || self.amount < 0.0 {
      return Err(invalid("amount must be a finite, non-negative number"));
    }
    if !self.balance.is_finite() {
      return Err(invalid("balance must be finite"));
    }

    Ok(())
  }

  /// Canonical text fed to the embedding provider
  pub fn embedding_text(&self) -> String {
    let mut parts = vec![
      format!("{} of ₹{}", self.txn_type, format_amount(self.amount)),
      format!("on {}", self.date.format("%Y-%m-%d")),
      format!("for {}", self.description),
      format!("under {} category", self.category),
    ];

    if let Some(method) = self.method.as_deref().filter(|m| !m.is_empty()) {
      parts.push(format!("via {method}"));
    }
    if !self.user_id.is_empty() {
      parts.push(format!("user {}", self.user_id));
    }

    format!("{}.", parts.join(" "))
  }

  /// `YYYY-MM` of the transaction date
  pub fn month(&self) -> String {
    self.date.format("%Y-%m").to_string()
  }
}

/// Whole amounts print without decimals, everything else with two
pub fn format_amount(amount: f64) -> String {
  if amount.fract() == 0.0 {
    format!("{amount:.0}")
  } else {
    format!("{amount:.2}")
  }
}

/// Round to two decimal places
pub fn round_currency(amount: f64) -> f64 {
  (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Transaction {
    Transaction {
      id: "txn_1".to_string(),
      user_id: "u1".to_string(),
      date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
      description: "UPI payment to Swiggy".to_string(),
      amount: 450.0,
      txn_type: TxnType::Debit,
      category: "Food".to_string(),
      balance: 12_000.0,
      method: Some("UPI".to_string()),
    }
  }

  #[test]
  fn test_embedding_text_includes_all_fields() {
    assert_eq!(
      sample().embedding_text(),
      "Debit of ₹450 on 2024-03-09 for UPI payment to Swiggy under Food category via UPI user u1."
    );
  }

  #[test]
  fn test_embedding_text_omits_missing_method() {
    let txn = Transaction { method: None, amount: 12.5, ..sample() };
    assert_eq!(
      txn.embedding_text(),
      "Debit of ₹12.50 on 2024-03-09 for UPI payment to Swiggy under Food category user u1."
    );
  }

  #[test]
  fn test_json_uses_original_field_names() {
    let json = serde_json::to_value(sample()).unwrap();
    assert_eq!(json["userId"], "u1");
    assert_eq!(json["type"], "Debit");
    assert_eq!(json["date"], "2024-03-09");

    let back: Transaction = serde_json::from_value(json).unwrap();
    assert_eq!(back, sample());
  }

  #[test]
  fn test_method_is_optional_on_input() {
    let json = r#"{"id":"t","userId":"u","date":"2024-01-01","description":"d",
      "amount":5,"type":"Credit","category":"Salary","balance":10}"#;
    let txn: Transaction = serde_json::from_str(json).unwrap();
    assert_eq!(txn.method, None);
    assert_eq!(txn.txn_type, TxnType::Credit);
  }

  #[test]
  fn test_validate_rejects_bad_records() {
    assert!(sample().validate().is_ok());
    assert!(Transaction { user_id: " ".to_string(), ..sample() }.validate().is_err());
    assert!(Transaction { amount: -1.0, ..sample() }.validate().is_err());
    assert!(Transaction { balance: f64::NAN, ..sample() }.validate().is_err());
    assert!(Transaction { category: String::new(), ..sample() }.validate().is_err());
  }

  #[test]
  fn test_txn_type_parse_is_case_insensitive() {
    assert_eq!(TxnType::parse("DEBIT"), Some(TxnType::Debit));
    assert_eq!(TxnType::parse(" credit "), Some(TxnType::Credit));
    assert_eq!(TxnType::parse("refund"), None);
  }

  #[test]
  fn test_month_and_rounding() {
    assert_eq!(sample().month(), "2024-03");
    assert_eq!(round_currency(10.005_f64 + 0.001), 10.01);
    assert_eq!(format_amount(7.0), "7");
  }
}
