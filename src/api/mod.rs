//! API Routes for Engram
//!
//! This module combines all API routes into a single router.
//!
//! Route structure:
//! - /memories/* - Memory CRUD and search
//! - /namespaces/* - Namespace enumeration and bulk deletion
//! - /mcp - MCP JSON-RPC endpoint
//! - /health, /status - Health checks

pub mod mcp;
mod memories;
mod namespaces;
pub mod status;

use axum::Router;

use crate::AppState;

/// Build the complete API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .nest("/memories", memories::routes())
        .nest("/namespaces", namespaces::routes())
        .nest("/mcp", mcp::routes())
}
