//! Memory service.
//!
//! Orchestrates the record store and vector index for store, search,
//! update, and delete, enforcing namespace consistency and soft-delete
//! semantics.
//!
//! The record store is the durable half: a memory survives even when
//! embedding or indexing fails (it simply stays unsearchable until
//! re-indexed). Read-path index failures degrade to empty results.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::db::{self, DbPool};
use crate::error::{Error, Result};
use crate::models::{classify_namespaces, NamespaceListing, SearchMatch};

use super::embeddings::Embedder;
use super::vector::{VectorIndex, PAYLOAD_CONTENT};

/// Matches with raw similarity at or below this are discarded.
pub const SIMILARITY_THRESHOLD: f32 = 0.3;

/// Default number of matches returned by search.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Service for managing namespaced memories.
#[derive(Clone)]
pub struct MemoryService {
    db: DbPool,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryService {
    /// Create a new memory service.
    pub fn new(db: DbPool, index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            db,
            index,
            embedder,
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    /// Store a new memory under a namespace, returning the record.
    ///
    /// The record-store row is written first and is the source of truth;
    /// embedding or vector upsert failures are logged and swallowed so a
    /// transient indexing problem never loses the durable record.
    pub async fn store(&self, content: &str, namespace: &str) -> Result<db::MemoryRow> {
        if content.trim().is_empty() {
            return Err(Error::Validation("content must not be empty".into()));
        }
        if namespace.trim().is_empty() {
            return Err(Error::Validation("namespace must not be empty".into()));
        }

        let id = crate::models::new_id();
        let content_hash = hex::encode(Sha256::digest(content.as_bytes()));

        let row = db::insert_memory(
            &self.db,
            db::CreateMemoryRecord {
                id: id.clone(),
                namespace: namespace.to_string(),
                content: content.to_string(),
                metadata: Some(json!({ "content_hash": content_hash })),
            },
        )
        .await?;

        if let Err(e) = self.index_memory(&row).await {
            warn!(id = %id, namespace, error = %e, "Failed to index memory; record kept");
        }

        Ok(row)
    }

    /// Embed a record's content and upsert its vector entry.
    async fn index_memory(&self, row: &db::MemoryRow) -> Result<()> {
        let vector = self.embedder.embed(&row.content).await?;

        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(PAYLOAD_CONTENT.to_string(), json!(row.content));
        payload.insert("created_at".to_string(), json!(row.created_at));
        if let Value::Object(meta) = row.metadata_json() {
            for (k, v) in meta {
                payload.entry(k).or_insert(v);
            }
        }

        self.index
            .upsert(&row.id, vector, &row.namespace, payload)
            .await
    }

    /// Search a namespace for memories similar to `query`.
    ///
    /// Returns matches with similarity above the threshold, sorted
    /// descending, at most `limit`. Downstream failures are logged and
    /// degrade to an empty result, never an error.
    pub async fn search(
        &self,
        query: &str,
        namespace: &str,
        limit: usize,
    ) -> Result<Vec<SearchMatch>> {
        self.search_scoped(query, namespace, limit, None).await
    }

    /// Search with an optional id restriction (used by the relevance
    /// scorer for session-context lookups).
    pub async fn search_scoped(
        &self,
        query: &str,
        namespace: &str,
        limit: usize,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<SearchMatch>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }

        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(namespace, error = %e, "Embedding failed; returning empty search result");
                return Ok(Vec::new());
            }
        };

        let matches = match self.index.query(vector, namespace, limit, ids).await {
            Ok(m) => m,
            Err(e) => {
                warn!(namespace, error = %e, "Vector query failed; returning empty search result");
                return Ok(Vec::new());
            }
        };

        let mut results: Vec<SearchMatch> = matches
            .into_iter()
            .filter(|m| m.score > SIMILARITY_THRESHOLD)
            .map(|m| {
                let content = m.content().unwrap_or_default().to_string();
                let mut payload = m.payload;
                payload.remove(PAYLOAD_CONTENT);
                SearchMatch {
                    id: m.id,
                    content,
                    score: m.score,
                    metadata: json!(payload),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        debug!(namespace, count = results.len(), "Search completed");

        Ok(results)
    }

    /// Rewrite the content of an active memory and re-index it.
    ///
    /// Fails with NotFound when no active record matches id + namespace.
    pub async fn update(&self, id: &str, namespace: &str, new_content: &str) -> Result<()> {
        if new_content.trim().is_empty() {
            return Err(Error::Validation("content must not be empty".into()));
        }

        let affected = db::update_memory_content(&self.db, id, namespace, new_content).await?;
        if affected == 0 {
            return Err(Error::NotFound(format!(
                "memory {} in namespace {}",
                id, namespace
            )));
        }

        // Recompute the embedding under the same id; index failures are
        // non-fatal, the record is simply stale in the index.
        match db::get_active_memory(&self.db, id, namespace).await? {
            Some(row) => {
                if let Err(e) = self.index_memory(&row).await {
                    warn!(id, namespace, error = %e, "Failed to re-index updated memory");
                }
            }
            None => {
                warn!(id, namespace, "Updated memory disappeared before re-index");
            }
        }

        Ok(())
    }

    /// Soft-delete a memory and remove its vector entry.
    ///
    /// The record-store delete is namespace-scoped; the vector delete is
    /// global by id, which is safe because ids are unique by construction.
    pub async fn delete(&self, id: &str, namespace: &str) -> Result<()> {
        let affected = db::soft_delete_memory(&self.db, id, namespace).await?;
        if affected == 0 {
            return Err(Error::NotFound(format!(
                "memory {} in namespace {}",
                id, namespace
            )));
        }

        if let Err(e) = self.index.delete_by_ids(vec![id.to_string()]).await {
            warn!(id, namespace, error = %e, "Failed to delete vector entry");
        }

        Ok(())
    }

    /// Delete every active memory in a namespace.
    ///
    /// Vector entries are deleted individually; per-id failures are logged
    /// and skipped. The rows are then soft-deleted in one bulk update.
    /// Returns the number of rows soft-deleted.
    pub async fn delete_namespace(&self, namespace: &str) -> Result<u64> {
        let ids = db::list_active_ids(&self.db, namespace).await?;

        for id in &ids {
            if let Err(e) = self.index.delete_by_ids(vec![id.clone()]).await {
                warn!(id = %id, namespace, error = %e, "Failed to delete vector entry; skipping");
            }
        }

        let deleted = db::soft_delete_namespace(&self.db, namespace).await?;

        debug!(namespace, deleted, "Namespace deleted");

        Ok(deleted)
    }

    /// List known namespaces classified into user/project buckets.
    pub async fn list_namespaces(&self) -> Result<NamespaceListing> {
        let raw = db::distinct_namespaces(&self.db).await?;
        Ok(classify_namespaces(&raw))
    }
}
