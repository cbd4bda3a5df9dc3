//! Engram - Namespaced Semantic Memory
//!
//! A persistent memory service for AI assistants: namespaced storage with
//! semantic search, learned query expansion, relevance scoring, and
//! cross-namespace aggregation, exposed over REST and MCP.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;
