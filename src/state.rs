//! Application state for Engram.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use crate::db::DbPool;
use crate::services::{
    CrossNamespaceAggregator, Embedder, EmbeddingService, MemoryService, QdrantIndex,
    QueryExpansionService, RelevanceScorer, RetrievalPipeline, VectorIndex,
};
use crate::{config, Result};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Memory management service.
    pub memory: MemoryService,
    /// Query expansion service.
    pub expansion: QueryExpansionService,
    /// Relevance scorer.
    pub scorer: RelevanceScorer,
    /// Cross-namespace aggregator.
    pub aggregator: CrossNamespaceAggregator,
    /// Composed retrieval pipeline.
    pub retrieval: RetrievalPipeline,
    /// Namespace supplied when callers omit one.
    pub default_namespace: String,
}

impl AppState {
    /// Create a new application state, initializing all services.
    pub async fn new() -> Result<Self> {
        let config = config::config();

        // Initialize database and ensure schema on every cold start
        let db = crate::db::init_pool(&config.database.path).await?;
        crate::db::ensure_schema(&db).await?;

        let embeddings = Arc::new(EmbeddingService::from_config(&config.embedding)?);
        let index = Arc::new(QdrantIndex::new(&config.qdrant, embeddings.dimension()).await?);

        Ok(Self::with_components(
            db,
            index,
            embeddings,
            config.memory.default_namespace.clone(),
        ))
    }

    /// Assemble state from explicit collaborators.
    ///
    /// Used by `new` and by tests that inject in-memory fakes.
    pub fn with_components(
        db: DbPool,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        default_namespace: String,
    ) -> Self {
        let memory = MemoryService::new(db.clone(), index, embedder);
        let expansion = QueryExpansionService::new(memory.clone());
        let scorer = RelevanceScorer::new(memory.clone());
        let aggregator = CrossNamespaceAggregator::new(memory.clone());
        let retrieval =
            RetrievalPipeline::new(memory.clone(), expansion.clone(), scorer.clone());

        Self {
            db,
            memory,
            expansion,
            scorer,
            aggregator,
            retrieval,
            default_namespace,
        }
    }

    /// Resolve a caller-supplied namespace, falling back to the bound
    /// default. The core never guesses a default itself.
    pub fn resolve_namespace(&self, namespace: Option<String>) -> String {
        namespace.unwrap_or_else(|| self.default_namespace.clone())
    }
}
