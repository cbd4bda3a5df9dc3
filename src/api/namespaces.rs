//! Namespace Routes
//!
//! Enumeration and bulk deletion of namespaces.
//!
//! Routes:
//! - GET / - List known namespaces (user/project buckets)
//! - DELETE /:namespace - Soft-delete every memory in a namespace

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;

use crate::models::{validate_namespace, NamespaceListing};
use crate::{AppState, Result};

/// Build namespace routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_namespaces))
        .route("/:namespace", delete(delete_namespace))
}

#[derive(Debug, Serialize)]
pub struct DeleteNamespaceResponse {
    pub namespace: String,
    pub deleted_count: u64,
}

/// List known namespaces.
///
/// GET /namespaces
#[axum::debug_handler]
async fn list_namespaces(State(state): State<AppState>) -> Result<Json<NamespaceListing>> {
    let listing = state.memory.list_namespaces().await?;
    Ok(Json(listing))
}

/// Delete every memory in a namespace.
///
/// DELETE /namespaces/:namespace
///
/// Idempotent: deleting an empty or unknown namespace reports zero.
#[axum::debug_handler]
async fn delete_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<DeleteNamespaceResponse>> {
    validate_namespace(&namespace)?;

    let deleted_count = state.memory.delete_namespace(&namespace).await?;

    Ok(Json(DeleteNamespaceResponse {
        namespace,
        deleted_count,
    }))
}
