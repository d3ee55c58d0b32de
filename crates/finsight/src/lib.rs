//! finsight - semantic search over financial transactions
//!
//! Generates sample transactions, embeds them, keeps an exact cosine index
//! and answers natural-language queries with ranked, optionally per-user
//! results over a small REST API.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod index;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod transaction;

pub use error::{EmbeddingError, SearchError, StoreError};
