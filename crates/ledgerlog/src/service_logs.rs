//! Persistent service logs
//!
//! Structured, append-only JSONL logging for long-running services:
//! - one JSON object per line, never truncated
//! - async locking so handlers can log concurrently
//! - optional console echo through the level helpers (silent mode for tests)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

#[cfg(feature = "schemars")]
use schemars::JsonSchema;

use crate::Level;

/// Request metadata attached to a log line
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
pub struct LogContext {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub request_id: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<f64>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub status_code: Option<u16>,
}

/// One line of the JSONL log file
#[derive(Debug, Serialize, Deserialize, Clone)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
pub struct LogEntry {
  pub timestamp: DateTime<Utc>,
  pub level: String,
  pub message: String,
  pub component: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub context: Option<LogContext>,
}

struct Sink {
  path: PathBuf,
  silent: bool,
}

impl Sink {
  fn open(path: &Path, silent: bool) -> std::io::Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    // create without truncating an existing log
    OpenOptions::new().create(true).append(true).open(path)?;

    Ok(Self { path: path.to_path_buf(), silent })
  }

  fn append(&self, entry: &LogEntry) -> std::io::Result<()> {
    let line = serde_json::to_string(entry)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    writeln!(file, "{line}")?;
    file.flush()
  }

  fn read(&self, limit: Option<usize>, level: Option<&str>) -> std::io::Result<Vec<LogEntry>> {
    if !self.path.exists() {
      return Ok(Vec::new());
    }

    let reader = BufReader::new(std::fs::File::open(&self.path)?);
    let mut entries = Vec::new();

    for line in reader.lines() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }

      // malformed lines are skipped, not fatal
      let Ok(entry) = serde_json::from_str::<LogEntry>(&line) else {
        continue;
      };

      if level.map_or(true, |filter| filter == "all" || entry.level == filter) {
        entries.push(entry);
      }
    }

    // keep the newest `limit` entries, returned oldest first
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    if let Some(limit) = limit {
      let skip = entries.len().saturating_sub(limit);
      entries.drain(..skip);
    }

    Ok(entries)
  }
}

/// Thread-safe JSONL log storage shared by a service and its handlers
#[derive(Clone)]
pub struct ServiceLogs {
  sink: Arc<Mutex<Sink>>,
}

impl ServiceLogs {
  /// Open (or create) the log file at `path`, echoing to the console
  pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
    Self::new_with_silent(path, false)
  }

  /// Open (or create) the log file; `silent` disables console echo
  pub fn new_with_silent<P: AsRef<Path>>(path: P, silent: bool) -> std::io::Result<Self> {
    let sink = Sink::open(path.as_ref(), silent)?;
    Ok(Self { sink: Arc::new(Mutex::new(sink)) })
  }

  /// Append an entry, reporting I/O failures
  pub async fn append(
    &self,
    level: Level,
    message: &str,
    component: &str,
    context: Option<LogContext>,
  ) -> std::io::Result<()> {
    let entry = LogEntry {
      timestamp: Utc::now(),
      level: level.as_str().to_string(),
      message: message.to_string(),
      component: component.to_string(),
      context,
    };

    let sink = self.sink.lock().await;
    sink.append(&entry)?;
    if !sink.silent {
      crate::log(level, message);
    }
    Ok(())
  }

  /// Append an entry; a failed write falls back to the console only
  pub async fn record(
    &self,
    level: Level,
    message: &str,
    component: &str,
    context: Option<LogContext>,
  ) {
    if let Err(e) = self.append(level, message, component, context).await {
      crate::warn!("Failed to persist log line ({e}): {message}");
    }
  }

  pub async fn info(&self, message: &str, component: &str) {
    self.record(Level::Info, message, component, None).await;
  }

  pub async fn success(&self, message: &str, component: &str) {
    self.record(Level::Success, message, component, None).await;
  }

  pub async fn warn(&self, message: &str, component: &str) {
    self.record(Level::Warn, message, component, None).await;
  }

  pub async fn error(&self, message: &str, component: &str) {
    self.record(Level::Error, message, component, None).await;
  }

  /// Read entries, newest `limit` kept, optional exact level filter ("all" matches everything)
  pub async fn entries(
    &self,
    limit: Option<usize>,
    level: Option<&str>,
  ) -> std::io::Result<Vec<LogEntry>> {
    self.sink.lock().await.read(limit, level)
  }

  pub async fn path(&self) -> PathBuf {
    self.sink.lock().await.path.clone()
  }
}
