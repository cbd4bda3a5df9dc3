//! Retrieval pipeline.
//!
//! Composes the full search data flow: query expansion, per-variant
//! namespace-scoped searches, max-score merge keyed by id, relevance
//! scoring with optional session context, and truncation. Scoring-factor
//! persistence is fired off the read path.

use std::collections::HashMap;

use futures::future::join_all;
use tracing::warn;

use crate::db::DbPool;
use crate::error::{Error, Result};
use crate::models::{ScoredMatch, SearchMatch};

use super::expansion::QueryExpansionService;
use super::memory::MemoryService;
use super::scoring::{RelevanceScorer, ScoringContext};
use super::session::Session;

/// How many recent session searches feed the scoring context.
const SESSION_TERM_WINDOW: usize = 3;

/// End-to-end search pipeline over a single namespace.
#[derive(Clone)]
pub struct RetrievalPipeline {
    memory: MemoryService,
    expansion: QueryExpansionService,
    scorer: RelevanceScorer,
}

impl RetrievalPipeline {
    pub fn new(
        memory: MemoryService,
        expansion: QueryExpansionService,
        scorer: RelevanceScorer,
    ) -> Self {
        Self {
            memory,
            expansion,
            scorer,
        }
    }

    /// Search a namespace with expansion and relevance scoring.
    ///
    /// When a session is supplied, its recent searches personalize the
    /// scoring and the search itself is recorded into the session.
    pub async fn search(
        &self,
        query: &str,
        namespace: &str,
        limit: usize,
        session: Option<&mut Session>,
    ) -> Result<Vec<ScoredMatch>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }

        let variants = self.expansion.expand(query).await;

        // Per-variant searches are read-only and namespace-scoped, so
        // they can run concurrently; the merge below is a commutative
        // max-by-key reduction and therefore order-independent.
        let searches = variants.iter().map(|variant| {
            let memory = self.memory.clone();
            let variant = variant.clone();
            let namespace = namespace.to_string();
            async move { memory.search(&variant, &namespace, limit).await }
        });

        let mut merged: HashMap<String, SearchMatch> = HashMap::new();
        for result in join_all(searches).await {
            match result {
                Ok(matches) => {
                    for m in matches {
                        match merged.get_mut(&m.id) {
                            Some(existing) if existing.score >= m.score => {}
                            Some(existing) => *existing = m,
                            None => {
                                merged.insert(m.id.clone(), m);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(namespace, error = %e, "Variant search failed; omitting");
                }
            }
        }

        let context = session.as_ref().map(|s| ScoringContext {
            recent_terms: s.recent_search_terms(SESSION_TERM_WINDOW),
        });

        let candidates: Vec<SearchMatch> = merged.into_values().collect();
        let (mut scored, factors) = self
            .scorer
            .score(candidates, namespace, context.as_ref())
            .await;
        scored.truncate(limit);

        // Persist learned factors off the read path.
        if !factors.is_empty() {
            let scorer = self.scorer.clone();
            tokio::spawn(async move {
                if let Err(e) = scorer.persist_factors(factors).await {
                    warn!(error = %e, "Failed to persist scoring factors");
                }
            });
        }

        if let Some(session) = session {
            if let Err(e) = self
                .record_session_search(session, query, scored.len())
                .await
            {
                warn!(error = %e, "Failed to record session search");
            }
        }

        Ok(scored)
    }

    async fn record_session_search(
        &self,
        session: &mut Session,
        query: &str,
        results_count: usize,
    ) -> Result<()> {
        session
            .record_search(self.db(), query, results_count)
            .await
    }

    fn db(&self) -> &DbPool {
        self.memory.db()
    }
}
