//! Service layer for Engram.
//!
//! Contains business logic and external service integrations:
//! - Embeddings (multi-provider with fallback)
//! - Vector index (collaborator trait + Qdrant implementation)
//! - Memory (namespaced store/search/update/delete)
//! - Expansion (learned query expansion)
//! - Scoring (relevance adjustment with preference/recency/session signals)
//! - Session (caller search history and personalization)
//! - Aggregator (cross-namespace fan-out)
//! - Retrieval (the composed search pipeline)

mod aggregator;
mod embeddings;
mod expansion;
mod memory;
mod qdrant;
mod retrieval;
pub mod scoring;
mod session;
pub mod vector;

pub use aggregator::{CrossNamespaceAggregator, FANOUT_LIMIT};
pub use embeddings::{Embedder, EmbeddingService};
pub use expansion::{ExpansionRecord, QueryExpansionService};
pub use memory::{MemoryService, DEFAULT_SEARCH_LIMIT, SIMILARITY_THRESHOLD};
pub use qdrant::QdrantIndex;
pub use retrieval::RetrievalPipeline;
pub use scoring::{RelevanceScorer, ScoringContext, ScoringFactor};
pub use session::{SearchEntry, Session};
pub use vector::{VectorIndex, VectorMatch};
