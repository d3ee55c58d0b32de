//! Command-line client: local data generation plus thin HTTP calls

pub mod client;
pub mod commands;
pub mod display;
