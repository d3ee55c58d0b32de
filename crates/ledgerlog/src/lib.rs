//! ## Features
//!
//! - Leveled console logging (info, warn, error, debug, verbose, success)
//! - Multi-line message support with a consistent prefix per line
//! - `format!`-style macros for every level
//! - Persistent JSONL service logs behind the `service-logs` feature
//!
//! All console output goes to stderr so stdout stays clean for CLI results.

use colored::*;
use std::fmt;

#[cfg(feature = "service-logs")]
pub mod service_logs;

/// Severity of a log line, shared by console and service logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
  Verbose,
  Debug,
  Info,
  Success,
  Warn,
  Error,
}

impl Level {
  /// Lowercase name used in JSONL entries and level filters
  pub fn as_str(self) -> &'static str {
    match self {
      Level::Verbose => "verbose",
      Level::Debug => "debug",
      Level::Info => "info",
      Level::Success => "success",
      Level::Warn => "warn",
      Level::Error => "error",
    }
  }

  /// Parse a level name; unknown names yield `None`
  pub fn parse(name: &str) -> Option<Self> {
    match name.to_ascii_lowercase().as_str() {
      "verbose" => Some(Level::Verbose),
      "debug" => Some(Level::Debug),
      "info" => Some(Level::Info),
      "success" => Some(Level::Success),
      "warn" | "warning" => Some(Level::Warn),
      "error" => Some(Level::Error),
      _ => None,
    }
  }

  fn tag(self) -> &'static str {
    match self {
      Level::Verbose => "verb",
      Level::Debug => "debug",
      Level::Info => "info",
      Level::Success => "sccs",
      Level::Warn => "warn",
      Level::Error => "error",
    }
  }

  fn color(self) -> Color {
    match self {
      Level::Verbose => Color::Cyan,
      Level::Debug => Color::Magenta,
      Level::Info => Color::Blue,
      Level::Success => Color::Green,
      Level::Warn => Color::Yellow,
      Level::Error => Color::Red,
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Render the bracketed, padded prefix for a level
pub fn prefix(level: Level) -> String {
  let tag = level.tag();
  format!("[{}]{:<width$}", tag.color(level.color()).bold(), "", width = 7 - tag.len() - 2)
}

/// Write a message to stderr, one prefixed line per input line
pub fn log(level: Level, message: &str) {
  let prefix = prefix(level);
  for line in message.lines() {
    eprintln!("{prefix} {line}");
  }
}

pub fn verbose(message: &str) {
  log(Level::Verbose, message);
}

/// Diagnostic detail
pub fn debug(message: &str) {
  log(Level::Debug, message);
}

/// General information
pub fn info(message: &str) {
  log(Level::Info, message);
}

/// Something completed
pub fn success(message: &str) {
  log(Level::Success, message);
}

/// Something needs attention
pub fn warn(message: &str) {
  log(Level::Warn, message);
}

/// Something went wrong
pub fn error(message: &str) {
  log(Level::Error, message);
}

#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => {
    $crate::info(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! warn {
  ($($arg:tt)*) => {
    $crate::warn(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => {
    $crate::error(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! verbose {
  ($($arg:tt)*) => {
    $crate::verbose(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! debug {
  ($($arg:tt)*) => {
    $crate::debug(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => {
    $crate::success(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}
