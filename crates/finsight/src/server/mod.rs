//! REST API for the search service
//!
//! axum routes over a shared [`state::AppState`]; request/response shapes
//! live in [`types`] and carry schemars annotations.

pub mod handlers;
pub mod middleware;
pub mod routing;
pub mod startup;
pub mod state;
pub mod types;
