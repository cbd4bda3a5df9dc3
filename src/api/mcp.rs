//! MCP Routes
//!
//! Model Context Protocol (MCP) Streamable HTTP endpoint for AI assistant integration.
//!
//! Routes:
//! - GET /mcp - SSE stream for server-to-client messages
//! - POST /mcp - JSON-RPC 2.0 requests from client

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::stream::StreamExt;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;

use crate::models::validate_namespace;
use crate::services::{Session, DEFAULT_SEARCH_LIMIT};
use crate::{AppState, Result};

// ============================================================================
// Session Management
// ============================================================================

/// An active MCP session with a broadcast channel for SSE events.
struct McpSession {
    created_at: Instant,
    tx: broadcast::Sender<String>,
}

/// Global session storage for MCP connections.
static MCP_SESSIONS: Lazy<RwLock<HashMap<String, McpSession>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Session expiry time (1 hour).
const SESSION_TTL_SECS: u64 = 3600;

/// Cleanup interval (5 minutes).
const CLEANUP_INTERVAL_SECS: u64 = 300;

/// Start background task to clean up expired sessions.
pub fn start_session_cleanup() {
    tokio::spawn(async {
        loop {
            tokio::time::sleep(Duration::from_secs(CLEANUP_INTERVAL_SECS)).await;

            let mut sessions = MCP_SESSIONS.write().await;
            let now = Instant::now();
            let before = sessions.len();

            sessions.retain(|_, session| {
                now.duration_since(session.created_at) < Duration::from_secs(SESSION_TTL_SECS)
            });

            let removed = before - sessions.len();
            if removed > 0 {
                tracing::debug!(removed, remaining = sessions.len(), "Cleaned up MCP sessions");
            }
        }
    });
}

/// Build MCP routes.
///
/// Supports MCP Streamable HTTP transport:
/// - GET /mcp - SSE stream for server-to-client messages
/// - POST /mcp - JSON-RPC 2.0 requests
pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(handle_mcp_sse).post(handle_mcp_post))
}

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data }),
        }
    }
}

// JSON-RPC error codes
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

// ============================================================================
// MCP Tool Types
// ============================================================================

/// MCP tools/list response.
#[derive(Debug, Serialize)]
struct ToolsListResponse {
    tools: Vec<ToolDefinition>,
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    name: String,
    description: String,
    input_schema: Value,
}

/// MCP tools/call parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// MCP tools/call response.
#[derive(Debug, Serialize)]
struct ToolCallResponse {
    content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_error: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

// ============================================================================
// Handlers
// ============================================================================

/// Handle SSE stream for server-to-client messages.
///
/// GET /mcp
///
/// Opens an SSE stream for the session. Requires valid Mcp-Session-Id header.
#[axum::debug_handler]
async fn handle_mcp_sse(
    headers: HeaderMap,
) -> std::result::Result<
    Sse<impl futures::Stream<Item = std::result::Result<Event, Infallible>>>,
    Response,
> {
    // Extract session ID from header
    let session_id = headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Missing Mcp-Session-Id header"
                })),
            )
                .into_response()
        })?;

    // Get session's broadcast receiver
    let sessions = MCP_SESSIONS.read().await;
    let session = sessions.get(session_id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "Session not found"
            })),
        )
            .into_response()
    })?;

    let rx = session.tx.subscribe();
    drop(sessions); // Release the read lock

    // Convert broadcast receiver to SSE stream
    let stream = BroadcastStream::new(rx).filter_map(|result| async {
        match result {
            Ok(data) => Some(Ok(Event::default().event("message").data(data))),
            Err(_) => None, // Skip lagged messages
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    ))
}

/// Handle MCP JSON-RPC POST request.
///
/// POST /mcp
///
/// Implements the MCP Streamable HTTP protocol.
/// Creates sessions on initialize, validates sessions on other methods.
#[axum::debug_handler]
async fn handle_mcp_post(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    // Validate JSON-RPC version
    if request.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::error(
            request.id,
            INVALID_REQUEST,
            "Invalid JSON-RPC version".into(),
            None,
        ))
        .into_response();
    }

    // Route based on method
    match request.method.as_str() {
        "initialize" => {
            // Create new session
            let session_id = uuid::Uuid::new_v4().to_string();
            let (tx, _) = broadcast::channel(100);

            let session = McpSession {
                created_at: Instant::now(),
                tx,
            };

            MCP_SESSIONS.write().await.insert(session_id.clone(), session);
            tracing::debug!(session_id = %session_id, "Created MCP session");

            // Return response with session ID header
            let response = handle_initialize(request.id);
            (
                [(
                    axum::http::header::HeaderName::from_static("mcp-session-id"),
                    axum::http::header::HeaderValue::from_str(&session_id).unwrap(),
                )],
                Json(response),
            )
                .into_response()
        }
        "notifications/initialized" | "initialized" => {
            // Acknowledge notification - no response body needed
            StatusCode::ACCEPTED.into_response()
        }
        _ => {
            // Validate session ID for all other methods (optional but recommended)
            let session_id = headers.get("mcp-session-id").and_then(|v| v.to_str().ok());

            if let Some(sid) = session_id {
                if !MCP_SESSIONS.read().await.contains_key(sid) {
                    return (
                        StatusCode::NOT_FOUND,
                        Json(serde_json::json!({
                            "error": "Session not found or expired"
                        })),
                    )
                        .into_response();
                }
            }

            let response = match request.method.as_str() {
                "tools/list" => handle_tools_list(request.id.clone()),
                "tools/call" => {
                    handle_tools_call(&state, request.id.clone(), request.params).await
                }
                _ => JsonRpcResponse::error(
                    request.id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", request.method),
                    None,
                ),
            };

            Json(response).into_response()
        }
    }
}

/// Handle MCP initialize.
fn handle_initialize(id: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse::success(
        id,
        serde_json::json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {
                "name": "engram",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {}
            }
        }),
    )
}

/// Handle tools/list method.
fn handle_tools_list(id: Option<Value>) -> JsonRpcResponse {
    let tools = vec![
        ToolDefinition {
            name: "memory_add".into(),
            description: "Store a memory in a namespace".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Memory content" },
                    "namespace": { "type": "string", "description": "Namespace (user:<id> or project:<id>); defaults to the configured namespace" }
                },
                "required": ["content"]
            }),
        },
        ToolDefinition {
            name: "memory_search".into(),
            description: "Search memories in a namespace using semantic similarity".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "namespace": { "type": "string", "description": "Namespace to search; defaults to the configured namespace" },
                    "limit": { "type": "integer", "default": 10, "description": "Max results" },
                    "session_id": { "type": "string", "description": "Session id for personalized scoring" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "memory_search_all".into(),
            description: "Search every known namespace, grouping results per namespace".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "memory_delete".into(),
            description: "Delete a memory by id".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Memory id" },
                    "namespace": { "type": "string", "description": "Namespace the memory lives in; defaults to the configured namespace" }
                },
                "required": ["id"]
            }),
        },
        ToolDefinition {
            name: "namespace_delete".into(),
            description: "Delete every memory in a namespace".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "namespace": { "type": "string", "description": "Namespace to clear" }
                },
                "required": ["namespace"]
            }),
        },
        ToolDefinition {
            name: "namespace_list".into(),
            description: "List known namespaces grouped into user and project buckets".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        },
        ToolDefinition {
            name: "expansion_store".into(),
            description: "Store a learned query association so future searches also try the related queries".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The query to associate from" },
                    "related_queries": { "type": "array", "items": { "type": "string" }, "description": "Queries that should also be tried when the query is searched" }
                },
                "required": ["query", "related_queries"]
            }),
        },
        ToolDefinition {
            name: "preference_add".into(),
            description: "Store a preference signal that boosts matching memories during search scoring".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Preference text to match against memory content" }
                },
                "required": ["content"]
            }),
        },
    ];

    JsonRpcResponse::success(
        id,
        serde_json::to_value(ToolsListResponse { tools }).unwrap(),
    )
}

/// Handle tools/call method.
async fn handle_tools_call(state: &AppState, id: Option<Value>, params: Value) -> JsonRpcResponse {
    let call_params: ToolCallParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!("Invalid params: {}", e),
                None,
            );
        }
    };

    let result = match call_params.name.as_str() {
        "memory_add" => execute_memory_add(state, call_params.arguments).await,
        "memory_search" => execute_memory_search(state, call_params.arguments).await,
        "memory_search_all" => execute_memory_search_all(state, call_params.arguments).await,
        "memory_delete" => execute_memory_delete(state, call_params.arguments).await,
        "namespace_delete" => execute_namespace_delete(state, call_params.arguments).await,
        "namespace_list" => execute_namespace_list(state).await,
        "expansion_store" => execute_expansion_store(state, call_params.arguments).await,
        "preference_add" => execute_preference_add(state, call_params.arguments).await,
        _ => {
            return JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Tool not found: {}", call_params.name),
                None,
            );
        }
    };

    match result {
        Ok(text) => {
            let response = ToolCallResponse {
                content: vec![ToolContent::Text { text }],
                is_error: None,
            };
            JsonRpcResponse::success(id, serde_json::to_value(response).unwrap())
        }
        Err(e) => {
            let response = ToolCallResponse {
                content: vec![ToolContent::Text {
                    text: format!("Error: {}", e),
                }],
                is_error: Some(true),
            };
            JsonRpcResponse::success(id, serde_json::to_value(response).unwrap())
        }
    }
}

// ============================================================================
// Tool Implementations
// ============================================================================

async fn execute_memory_add(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        content: String,
        namespace: Option<String>,
    }

    let params: Params = serde_json::from_value(args)?;
    let namespace = state.resolve_namespace(params.namespace);
    validate_namespace(&namespace)?;

    let row = state.memory.store(&params.content, &namespace).await?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "id": row.id,
        "namespace": row.namespace,
        "created_at": row.created_at
    }))?)
}

async fn execute_memory_search(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        query: String,
        namespace: Option<String>,
        limit: Option<usize>,
        session_id: Option<String>,
    }

    let params: Params = serde_json::from_value(args)?;
    let namespace = state.resolve_namespace(params.namespace);
    validate_namespace(&namespace)?;
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

    let mut session = match &params.session_id {
        Some(id) => Some(
            Session::load(&state.db, id)
                .await?
                .unwrap_or_else(|| Session::new(id.clone())),
        ),
        None => None,
    };

    let results = state
        .retrieval
        .search(&params.query, &namespace, limit, session.as_mut())
        .await?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "namespace": namespace,
        "count": results.len(),
        "results": results
    }))?)
}

async fn execute_memory_search_all(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        query: String,
    }

    let params: Params = serde_json::from_value(args)?;
    let namespaces = state.aggregator.search_all(&params.query).await?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "count": namespaces.len(),
        "namespaces": namespaces
    }))?)
}

async fn execute_memory_delete(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        id: String,
        namespace: Option<String>,
    }

    let params: Params = serde_json::from_value(args)?;
    let namespace = state.resolve_namespace(params.namespace);
    validate_namespace(&namespace)?;

    state.memory.delete(&params.id, &namespace).await?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "deleted": true,
        "id": params.id
    }))?)
}

async fn execute_namespace_delete(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        namespace: String,
    }

    let params: Params = serde_json::from_value(args)?;
    validate_namespace(&params.namespace)?;

    let deleted_count = state.memory.delete_namespace(&params.namespace).await?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "namespace": params.namespace,
        "deleted_count": deleted_count
    }))?)
}

async fn execute_expansion_store(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        query: String,
        related_queries: Vec<String>,
    }

    let params: Params = serde_json::from_value(args)?;
    let related_count = params.related_queries.len();
    let id = state
        .expansion
        .store_expansion(&params.query, params.related_queries)
        .await?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "id": id,
        "query": params.query,
        "related_count": related_count
    }))?)
}

async fn execute_preference_add(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        content: String,
    }

    let params: Params = serde_json::from_value(args)?;
    let id = state.scorer.store_preference(&params.content).await?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "id": id,
        "stored": true
    }))?)
}

async fn execute_namespace_list(state: &AppState) -> Result<String> {
    let listing = state.memory.list_namespaces().await?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "users": listing.users,
        "projects": listing.projects,
        "all": listing.all
    }))?)
}
