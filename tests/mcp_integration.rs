//! MCP endpoint integration tests.
//!
//! Exercises the JSON-RPC 2.0 surface: initialize, tools/list, and the
//! memory tools, over the in-memory fakes.

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use common::setup_test_state;
use engram::api;

async fn setup_server() -> TestServer {
    let (state, _, _) = setup_test_state().await;
    let app = axum::Router::new()
        .merge(api::routes())
        .with_state(state);
    TestServer::new(app).expect("Failed to start test server")
}

fn rpc(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params
    })
}

/// Call an MCP tool and return the parsed text content.
async fn call_tool(server: &TestServer, name: &str, arguments: Value) -> Value {
    let response = server
        .post("/mcp")
        .json(&rpc("tools/call", json!({ "name": name, "arguments": arguments })))
        .await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    let result = &body["result"];
    assert_ne!(
        result["is_error"],
        json!(true),
        "tool call failed: {:?}",
        result
    );
    serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_initialize_creates_session() {
    let server = setup_server().await;

    let response = server.post("/mcp").json(&rpc("initialize", json!({}))).await;
    response.assert_status(StatusCode::OK);

    let session_id = response
        .headers()
        .get("mcp-session-id")
        .expect("missing session header")
        .to_str()
        .unwrap()
        .to_string();
    assert!(!session_id.is_empty());

    let body: Value = response.json();
    assert_eq!(body["result"]["serverInfo"]["name"], "engram");
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_invalid_jsonrpc_version_rejected() {
    let server = setup_server().await;

    let response = server
        .post("/mcp")
        .json(&json!({ "jsonrpc": "1.0", "id": 1, "method": "tools/list" }))
        .await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn test_tools_list() {
    let server = setup_server().await;

    let response = server
        .post("/mcp")
        .json(&rpc("tools/list", json!({})))
        .await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    let tools: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();

    assert_eq!(
        tools,
        vec![
            "memory_add",
            "memory_search",
            "memory_search_all",
            "memory_delete",
            "namespace_delete",
            "namespace_list",
            "expansion_store",
            "preference_add"
        ]
    );
}

#[tokio::test]
async fn test_unknown_method_is_error() {
    let server = setup_server().await;

    let response = server
        .post("/mcp")
        .json(&rpc("tools/nonsense", json!({})))
        .await;
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn test_memory_add_and_search() {
    let server = setup_server().await;

    let added = call_tool(
        &server,
        "memory_add",
        json!({ "content": "The sky is blue", "namespace": "user:alice" }),
    )
    .await;
    assert_eq!(added["namespace"], "user:alice");
    assert!(added["id"].as_str().is_some());

    let found = call_tool(
        &server,
        "memory_search",
        json!({ "query": "sky", "namespace": "user:alice" }),
    )
    .await;
    assert_eq!(found["count"], 1);
    assert_eq!(found["results"][0]["content"], "The sky is blue");
}

#[tokio::test]
async fn test_memory_add_defaults_namespace() {
    let server = setup_server().await;

    let added = call_tool(&server, "memory_add", json!({ "content": "plain" })).await;
    assert_eq!(added["namespace"], "user:default");
}

#[tokio::test]
async fn test_memory_add_reserved_namespace_is_tool_error() {
    let server = setup_server().await;

    let response = server
        .post("/mcp")
        .json(&rpc(
            "tools/call",
            json!({
                "name": "memory_add",
                "arguments": { "content": "x", "namespace": "system:preferences" }
            }),
        ))
        .await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["result"]["is_error"], json!(true));
    assert!(body["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("reserved"));
}

#[tokio::test]
async fn test_memory_search_all() {
    let server = setup_server().await;

    call_tool(
        &server,
        "memory_add",
        json!({ "content": "sky over the bay", "namespace": "user:alice" }),
    )
    .await;
    call_tool(
        &server,
        "memory_add",
        json!({ "content": "sky camera module", "namespace": "project:x" }),
    )
    .await;

    let found = call_tool(&server, "memory_search_all", json!({ "query": "sky" })).await;
    assert_eq!(found["count"], 2);
    assert_eq!(found["namespaces"][0]["namespace"], "user:alice");
    assert_eq!(found["namespaces"][1]["namespace"], "project:x");
}

#[tokio::test]
async fn test_memory_delete_roundtrip() {
    let server = setup_server().await;

    let added = call_tool(
        &server,
        "memory_add",
        json!({ "content": "short lived", "namespace": "user:alice" }),
    )
    .await;
    let id = added["id"].as_str().unwrap();

    let deleted = call_tool(
        &server,
        "memory_delete",
        json!({ "id": id, "namespace": "user:alice" }),
    )
    .await;
    assert_eq!(deleted["deleted"], true);

    // Second delete surfaces as a tool error
    let response = server
        .post("/mcp")
        .json(&rpc(
            "tools/call",
            json!({
                "name": "memory_delete",
                "arguments": { "id": id, "namespace": "user:alice" }
            }),
        ))
        .await;
    let body: Value = response.json();
    assert_eq!(body["result"]["is_error"], json!(true));
}

#[tokio::test]
async fn test_namespace_delete_and_list() {
    let server = setup_server().await;

    for content in ["one", "two", "three"] {
        call_tool(
            &server,
            "memory_add",
            json!({ "content": content, "namespace": "project:x" }),
        )
        .await;
    }
    call_tool(
        &server,
        "memory_add",
        json!({ "content": "kept", "namespace": "user:alice" }),
    )
    .await;

    let listing = call_tool(&server, "namespace_list", json!({})).await;
    assert_eq!(listing["projects"], json!(["x"]));
    assert_eq!(listing["users"], json!(["alice"]));

    let deleted = call_tool(
        &server,
        "namespace_delete",
        json!({ "namespace": "project:x" }),
    )
    .await;
    assert_eq!(deleted["deleted_count"], 3);

    let listing = call_tool(&server, "namespace_list", json!({})).await;
    assert_eq!(listing["projects"], json!([]));

    // Idempotent second pass
    let deleted = call_tool(
        &server,
        "namespace_delete",
        json!({ "namespace": "project:x" }),
    )
    .await;
    assert_eq!(deleted["deleted_count"], 0);
}

#[tokio::test]
async fn test_expansion_store_feeds_later_searches() {
    let server = setup_server().await;

    let stored = call_tool(
        &server,
        "expansion_store",
        json!({ "query": "sky", "related_queries": ["weather"] }),
    )
    .await;
    assert!(stored["id"].as_str().is_some());
    assert_eq!(stored["related_count"], 1);

    // Shares no words with "sky"; only reachable through the learned
    // association
    call_tool(
        &server,
        "memory_add",
        json!({ "content": "weather report today", "namespace": "user:alice" }),
    )
    .await;

    let found = call_tool(
        &server,
        "memory_search",
        json!({ "query": "sky", "namespace": "user:alice" }),
    )
    .await;
    assert_eq!(found["count"], 1);
    assert_eq!(found["results"][0]["content"], "weather report today");
}

#[tokio::test]
async fn test_preference_add_boosts_matching_results() {
    let server = setup_server().await;

    call_tool(
        &server,
        "preference_add",
        json!({ "content": "the sky is blue" }),
    )
    .await;
    call_tool(
        &server,
        "memory_add",
        json!({ "content": "the sky is blue", "namespace": "user:alice" }),
    )
    .await;

    let found = call_tool(
        &server,
        "memory_search",
        json!({ "query": "sky", "namespace": "user:alice" }),
    )
    .await;
    assert_eq!(found["count"], 1);

    // Preference match of 1.0 adds 0.3 on top of the recency-boosted score
    let original = found["results"][0]["original_score"].as_f64().unwrap();
    let adjusted = found["results"][0]["adjusted_score"].as_f64().unwrap();
    let expected = ((original + 0.3) * 1.2).min(1.0);
    assert!((adjusted - expected).abs() < 0.001);
}

#[tokio::test]
async fn test_unknown_tool_is_error() {
    let server = setup_server().await;

    let response = server
        .post("/mcp")
        .json(&rpc(
            "tools/call",
            json!({ "name": "no_such_tool", "arguments": {} }),
        ))
        .await;
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], -32601);
}
