//! Data models for Engram.
//!
//! Defines the core types shared across the service and API layers,
//! plus id and timestamp helpers.

mod namespace;

pub use namespace::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new memory id.
///
/// Random UUIDs are globally unique by construction, never shared across
/// namespaces, which makes the vector index's global delete-by-id safe
/// even though the record store scopes deletion by namespace. Qdrant
/// also requires point ids to be UUIDs.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// A raw search match from the memory service, before relevance adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    pub id: String,
    pub content: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// A match after relevance scoring, carrying both raw and adjusted scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    pub content: String,
    pub original_score: f32,
    pub adjusted_score: f32,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// Matches for a single namespace in a cross-namespace search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceMatches {
    pub namespace: String,
    pub memories: Vec<SearchMatch>,
}
