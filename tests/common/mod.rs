//! Shared test fixtures.
//!
//! Provides deterministic in-memory stand-ins for the embedding provider
//! and the vector index so integration tests exercise the full stack
//! without network services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use engram::db::{self, DbPool};
use engram::services::vector::{VectorIndex, VectorMatch, PAYLOAD_NAMESPACE};
use engram::services::Embedder;
use engram::{Error, Result};

const FAKE_DIMENSION: usize = 256;

/// Deterministic embedder with predictable similarity.
///
/// Each distinct lowercase token is assigned its own axis; a text embeds
/// to the normalized sum of its token axes. Cosine similarity between two
/// texts is then `shared / sqrt(a * b)` over distinct token counts, so
/// texts sharing words score high and disjoint texts score exactly zero.
pub struct FakeEmbedder {
    axes: Mutex<HashMap<String, usize>>,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            axes: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Validation("cannot embed empty text".into()));
        }

        let mut axes = self.axes.lock().unwrap();
        let mut vector = vec![0.0f32; FAKE_DIMENSION];

        for token in text.to_lowercase().split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric());
            if token.is_empty() {
                continue;
            }
            let next = axes.len() % FAKE_DIMENSION;
            let axis = *axes.entry(token.to_string()).or_insert(next);
            vector[axis] = 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        FAKE_DIMENSION
    }
}

struct StoredEntry {
    vector: Vec<f32>,
    namespace: String,
    payload: HashMap<String, Value>,
}

/// In-memory vector index with cosine similarity and failure injection.
pub struct InMemoryVectorIndex {
    entries: Mutex<HashMap<String, StoredEntry>>,
    fail_upserts: AtomicBool,
    fail_queries: AtomicBool,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fail_upserts: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
        }
    }

    /// Make subsequent upserts fail.
    #[allow(dead_code)]
    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent queries fail.
    #[allow(dead_code)]
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Number of stored entries.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        namespace: &str,
        mut payload: HashMap<String, Value>,
    ) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(Error::VectorStore("upsert failure injected".into()));
        }

        payload.insert(PAYLOAD_NAMESPACE.to_string(), Value::from(namespace));
        self.entries.lock().unwrap().insert(
            id.to_string(),
            StoredEntry {
                vector,
                namespace: namespace.to_string(),
                payload,
            },
        );
        Ok(())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        namespace: &str,
        top_k: usize,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<VectorMatch>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::VectorStore("query failure injected".into()));
        }

        let entries = self.entries.lock().unwrap();
        let mut matches: Vec<VectorMatch> = entries
            .iter()
            .filter(|(id, entry)| {
                entry.namespace == namespace
                    && ids.as_ref().map_or(true, |ids| ids.contains(id))
            })
            .map(|(id, entry)| VectorMatch {
                id: id.clone(),
                score: cosine(&vector, &entry.vector),
                payload: entry.payload.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_by_ids(&self, ids: Vec<String>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        for id in ids {
            entries.remove(&id);
        }
        Ok(())
    }
}

/// Create a fresh in-memory database with the schema applied.
pub async fn setup_test_db() -> DbPool {
    let pool = db::init_pool(":memory:")
        .await
        .expect("Failed to create test database");
    db::ensure_schema(&pool)
        .await
        .expect("Failed to apply schema");
    pool
}

/// Assemble application state over the in-memory fakes.
pub async fn setup_test_state() -> (
    engram::AppState,
    Arc<InMemoryVectorIndex>,
    Arc<FakeEmbedder>,
) {
    let pool = setup_test_db().await;
    let index = Arc::new(InMemoryVectorIndex::new());
    let embedder = Arc::new(FakeEmbedder::new());

    let state = engram::AppState::with_components(
        pool,
        index.clone(),
        embedder.clone(),
        "user:default".to_string(),
    );

    (state, index, embedder)
}
