//! Memory Routes
//!
//! CRUD and search over namespaced memories.
//!
//! Routes:
//! - POST / - Store a memory
//! - GET / - List active memories in a namespace
//! - GET /search - Search one namespace (expansion + relevance scoring)
//! - GET /search/all - Fan a query out across all namespaces
//! - GET /:id - Fetch a single memory
//! - PUT /:id - Update a memory's content
//! - DELETE /:id - Soft-delete a memory

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{self, MemoryRow};
use crate::models::{validate_namespace, NamespaceMatches, ScoredMatch};
use crate::services::{Session, DEFAULT_SEARCH_LIMIT};
use crate::{AppState, Error, Result};

/// Build memory routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_memory).get(list_memories))
        .route("/search", get(search_memories))
        .route("/search/all", get(search_all_namespaces))
        .route("/:id", get(get_memory).put(update_memory).delete(delete_memory))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateMemoryRequest {
    pub content: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MemoryResponse {
    pub id: String,
    pub namespace: String,
    pub content: String,
    pub metadata: Value,
    pub created_at: String,
    pub updated_at: String,
}

impl From<MemoryRow> for MemoryResponse {
    fn from(row: MemoryRow) -> Self {
        Self {
            metadata: row.metadata_json(),
            id: row.id,
            namespace: row.namespace,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListMemoriesQuery {
    pub namespace: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListMemoriesResponse {
    pub namespace: String,
    pub total: i64,
    pub memories: Vec<MemoryResponse>,
}

#[derive(Debug, Deserialize)]
pub struct GetMemoryQuery {
    pub namespace: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub namespace: Option<String>,
    pub limit: Option<usize>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub namespace: String,
    pub count: usize,
    pub results: Vec<ScoredMatch>,
    /// Topic suggestions derived from session history; only present when
    /// the request carried a session id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_topics: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchAllQuery {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchAllResponse {
    pub count: usize,
    pub namespaces: Vec<NamespaceMatches>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemoryRequest {
    pub content: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMemoryQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
    pub id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Store a memory.
///
/// POST /memories
#[axum::debug_handler]
async fn create_memory(
    State(state): State<AppState>,
    Json(request): Json<CreateMemoryRequest>,
) -> Result<(StatusCode, Json<MemoryResponse>)> {
    let namespace = state.resolve_namespace(request.namespace);
    validate_namespace(&namespace)?;

    let row = state.memory.store(&request.content, &namespace).await?;

    Ok((StatusCode::CREATED, Json(row.into())))
}

/// List active memories in a namespace, newest first.
///
/// GET /memories?namespace=...&limit=...&offset=...
#[axum::debug_handler]
async fn list_memories(
    State(state): State<AppState>,
    Query(query): Query<ListMemoriesQuery>,
) -> Result<Json<ListMemoriesResponse>> {
    let namespace = state.resolve_namespace(query.namespace);
    validate_namespace(&namespace)?;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let rows = db::list_active_memories(&state.db, &namespace, limit, offset).await?;
    let total = db::count_active(&state.db, &namespace).await?;

    Ok(Json(ListMemoriesResponse {
        namespace,
        total,
        memories: rows.into_iter().map(Into::into).collect(),
    }))
}

/// Fetch a single memory. When a session id is supplied the view is
/// recorded against that session.
///
/// GET /memories/:id?namespace=...&session_id=...
#[axum::debug_handler]
async fn get_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GetMemoryQuery>,
) -> Result<Json<MemoryResponse>> {
    let namespace = state.resolve_namespace(query.namespace);
    validate_namespace(&namespace)?;

    let row = db::get_active_memory(&state.db, &id, &namespace)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Memory not found: {}", id)))?;

    if let Some(session_id) = &query.session_id {
        let mut session = Session::load(&state.db, session_id)
            .await?
            .unwrap_or_else(|| Session::new(session_id.clone()));
        if let Err(e) = session.record_memory_view(&state.db, &row.id).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to record memory view");
        }
    }

    Ok(Json(row.into()))
}

/// Search one namespace with expansion and relevance scoring.
///
/// GET /memories/search?query=...&namespace=...&limit=...&session_id=...
#[axum::debug_handler]
async fn search_memories(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let namespace = state.resolve_namespace(query.namespace);
    validate_namespace(&namespace)?;
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

    // An expired or unknown session id starts a fresh session
    let mut session = match &query.session_id {
        Some(id) => Some(
            Session::load(&state.db, id)
                .await?
                .unwrap_or_else(|| Session::new(id.clone())),
        ),
        None => None,
    };

    let results = state
        .retrieval
        .search(&query.query, &namespace, limit, session.as_mut())
        .await?;

    let suggested_topics = session.as_ref().map(|s| s.unexplored_topics());

    Ok(Json(SearchResponse {
        namespace,
        count: results.len(),
        results,
        suggested_topics,
    }))
}

/// Fan a query out across every known namespace.
///
/// GET /memories/search/all?query=...
#[axum::debug_handler]
async fn search_all_namespaces(
    State(state): State<AppState>,
    Query(query): Query<SearchAllQuery>,
) -> Result<Json<SearchAllResponse>> {
    let namespaces = state.aggregator.search_all(&query.query).await?;

    Ok(Json(SearchAllResponse {
        count: namespaces.len(),
        namespaces,
    }))
}

/// Update a memory's content.
///
/// PUT /memories/:id
#[axum::debug_handler]
async fn update_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateMemoryRequest>,
) -> Result<StatusCode> {
    let namespace = state.resolve_namespace(request.namespace);
    validate_namespace(&namespace)?;

    state.memory.update(&id, &namespace, &request.content).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Soft-delete a memory.
///
/// DELETE /memories/:id?namespace=...
#[axum::debug_handler]
async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteMemoryQuery>,
) -> Result<Json<DeletedResponse>> {
    let namespace = state.resolve_namespace(query.namespace);
    validate_namespace(&namespace)?;

    state.memory.delete(&id, &namespace).await?;

    Ok(Json(DeletedResponse { deleted: true, id }))
}
