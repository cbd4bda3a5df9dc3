//! Status Routes
//!
//! Health checks and status endpoints.
//!
//! Routes:
//! - GET /health - Basic health check
//! - GET /status - Detailed system status

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{AppState, Result};

static STARTUP_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize startup time. Call this once at server start.
pub fn init_startup_time() {
    let _ = STARTUP_TIME.get_or_init(Instant::now);
}

fn get_uptime_seconds() -> u64 {
    STARTUP_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(system_status))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// System status response.
#[derive(Debug, Serialize)]
pub struct SystemStatusResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: DatabaseStatus,
    pub memories: MemoryStats,
}

#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    pub connected: bool,
    pub pool_size: u32,
    pub active_connections: u32,
}

#[derive(Debug, Serialize)]
pub struct MemoryStats {
    pub active: i64,
    pub namespaces: usize,
}

/// Basic health check.
///
/// GET /health
///
/// Returns 200 if the server is running.
#[axum::debug_handler]
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: Utc::now(),
    })
}

/// Detailed system status.
///
/// GET /status
#[axum::debug_handler]
async fn system_status(State(state): State<AppState>) -> Result<Json<SystemStatusResponse>> {
    let connected = sqlx::query_as::<_, (i64,)>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();

    let active = crate::db::count_all_active(&state.db).await.unwrap_or(0);
    let namespaces = crate::db::distinct_namespaces(&state.db)
        .await
        .map(|ns| ns.len())
        .unwrap_or(0);

    Ok(Json(SystemStatusResponse {
        status: if connected { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: get_uptime_seconds(),
        database: DatabaseStatus {
            connected,
            pool_size: state.db.options().get_max_connections(),
            active_connections: state.db.size(),
        },
        memories: MemoryStats { active, namespaces },
    }))
}
