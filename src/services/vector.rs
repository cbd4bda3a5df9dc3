//! Collaborator contract for the vector index.
//!
//! The core treats the index as a pluggable similarity store: entries are
//! keyed by id, scoped by namespace for queries, and deleted globally by
//! id. Ids are globally unique by construction (see `models::new_id`), so
//! the global delete can never remove another namespace's entry.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Payload key carrying the owning namespace.
pub const PAYLOAD_NAMESPACE: &str = "namespace";

/// Payload key carrying the memory content.
pub const PAYLOAD_CONTENT: &str = "content";

/// A similarity match returned by a vector query.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, Value>,
}

impl VectorMatch {
    /// Content stored in the match payload, if any.
    pub fn content(&self) -> Option<&str> {
        self.payload.get(PAYLOAD_CONTENT).and_then(|v| v.as_str())
    }
}

/// Similarity-searchable store of embedding vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry for `id`.
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        namespace: &str,
        payload: HashMap<String, Value>,
    ) -> Result<()>;

    /// Query for the `top_k` nearest entries within `namespace`.
    ///
    /// When `ids` is given, only those entries are considered.
    async fn query(
        &self,
        vector: Vec<f32>,
        namespace: &str,
        top_k: usize,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<VectorMatch>>;

    /// Delete entries by id, across all namespaces.
    async fn delete_by_ids(&self, ids: Vec<String>) -> Result<()>;
}
