//! Transaction store backed by a JSON data file
//!
//! The store keeps an immutable [`Ledger`] snapshot behind a swappable
//! reference. Queries read the current snapshot; only an explicit
//! [`TransactionStore::reload`] replaces it.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::StoreError;
use crate::transaction::Transaction;

/// Validated, indexed set of transactions
#[derive(Debug, Default)]
pub struct Ledger {
  transactions: Vec<Transaction>,
  by_id: HashMap<String, usize>,
  by_user: HashMap<String, Vec<usize>>,
}

impl Ledger {
  /// Validate every record and build the lookup tables
  pub fn new(transactions: Vec<Transaction>) -> Result<Self, StoreError> {
    let mut by_id = HashMap::with_capacity(transactions.len());
    let mut by_user: HashMap<String, Vec<usize>> = HashMap::new();

    for (position, txn) in transactions.iter().enumerate() {
      txn.validate()?;
      if by_id.insert(txn.id.clone(), position).is_some() {
        return Err(StoreError::DuplicateId { id: txn.id.clone() });
      }
      by_user.entry(txn.user_id.clone()).or_default().push(position);
    }

    Ok(Self { transactions, by_id, by_user })
  }

  /// Read and validate a JSON array of transactions
  pub fn load(path: &Path) -> Result<Self, StoreError> {
    let display = path.display().to_string();

    if !path.exists() {
      return Err(StoreError::Missing { path: display });
    }

    let content = std::fs::read_to_string(path)
      .map_err(|e| StoreError::Unreadable { path: display.clone(), message: e.to_string() })?;

    let transactions: Vec<Transaction> = serde_json::from_str(&content)
      .map_err(|e| StoreError::Malformed { path: display, message: e.to_string() })?;

    Self::new(transactions)
  }

  pub fn all(&self) -> &[Transaction] {
    &self.transactions
  }

  pub fn get(&self, id: &str) -> Option<&Transaction> {
    self.by_id.get(id).map(|&position| &self.transactions[position])
  }

  /// Transactions owned by `user_id`, in file order; empty for unknown users
  pub fn by_user(&self, user_id: &str) -> Vec<&Transaction> {
    self
      .by_user
      .get(user_id)
      .map(|positions| positions.iter().map(|&p| &self.transactions[p]).collect())
      .unwrap_or_default()
  }

  /// Sorted distinct user ids
  pub fn users(&self) -> Vec<String> {
    self.by_user.keys().cloned().collect::<BTreeSet<_>>().into_iter().collect()
  }

  pub fn len(&self) -> usize {
    self.transactions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.transactions.is_empty()
  }
}

/// File-backed transaction store with an atomically swappable ledger
pub struct TransactionStore {
  path: PathBuf,
  current: RwLock<Arc<Ledger>>,
}

impl TransactionStore {
  /// Load the data file; fails with a store error if missing or corrupt
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
    let path = path.as_ref().to_path_buf();
    let ledger = Ledger::load(&path)?;
    Ok(Self { path, current: RwLock::new(Arc::new(ledger)) })
  }

  /// Wrap an in-memory ledger; `reload` will read from `path`
  pub fn from_ledger<P: AsRef<Path>>(path: P, ledger: Ledger) -> Self {
    Self { path: path.as_ref().to_path_buf(), current: RwLock::new(Arc::new(ledger)) }
  }

  /// The current ledger snapshot
  pub fn ledger(&self) -> Arc<Ledger> {
    match self.current.read() {
      Ok(guard) => guard.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  /// Re-read the data file and swap it in; the old ledger stays on failure
  pub fn reload(&self) -> Result<Arc<Ledger>, StoreError> {
    let ledger = Ledger::load(&self.path)?;
    Ok(self.replace(ledger))
  }

  /// Swap in an already validated ledger
  pub fn replace(&self, ledger: Ledger) -> Arc<Ledger> {
    let ledger = Arc::new(ledger);
    match self.current.write() {
      Ok(mut guard) => *guard = ledger.clone(),
      Err(poisoned) => *poisoned.into_inner() = ledger.clone(),
    }
    ledger
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn all(&self) -> Vec<Transaction> {
    self.ledger().all().to_vec()
  }

  pub fn get(&self, id: &str) -> Option<Transaction> {
    self.ledger().get(id).cloned()
  }

  pub fn by_user(&self, user_id: &str) -> Vec<Transaction> {
    self.ledger().by_user(user_id).into_iter().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.ledger().len()
  }

  pub fn is_empty(&self) -> bool {
    self.ledger().is_empty()
  }
}

/// Write transactions as a pretty-printed JSON array, creating parent directories
pub fn save(path: &Path, transactions: &[Transaction]) -> Result<(), StoreError> {
  let write_error = |message: String| StoreError::Write { path: path.display().to_string(), message };

  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
  }

  let json = serde_json::to_string_pretty(transactions).map_err(|e| write_error(e.to_string()))?;
  std::fs::write(path, json).map_err(|e| write_error(e.to_string()))
}
