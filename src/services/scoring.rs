//! Relevance scoring: post-retrieval adjustment of similarity scores.
//!
//! Raw similarity scores are adjusted with preference signals, recency,
//! and session context. Each step is independently best-effort; a failure
//! skips only that step's adjustment, never the whole memory.
//!
//! The scorer is read-only: recency computations are returned as
//! `ScoringFactor` records for the caller to persist (the retrieval
//! pipeline fires the write off the read path).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::db;
use crate::models::{ScoredMatch, SearchMatch, NS_PREFERENCES, NS_SCORING_FACTORS};
use crate::Result;

use super::memory::MemoryService;

/// Weight applied to a preference-signal match score.
pub const PREFERENCE_WEIGHT: f32 = 0.3;

/// Multiplier for memories created within the recency window.
pub const RECENCY_BOOST: f32 = 1.2;

/// Recency window in days.
pub const RECENCY_WINDOW_DAYS: f64 = 7.0;

/// Multiplier for memories matching recent session searches.
pub const SESSION_BOOST: f32 = 1.1;

/// Adjusted scores never exceed this.
pub const MAX_SCORE: f32 = 1.0;

/// Content prefix length used to synthesize the preference lookup query.
const PREFERENCE_PREFIX_CHARS: usize = 80;

/// Session context supplied by the caller for personalization.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    /// Recent search terms from the caller's session.
    pub recent_terms: Vec<String>,
}

/// A computed scoring input worth persisting for later analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringFactor {
    pub memory_id: String,
    pub factor: String,
    pub value: f64,
    pub computed_at: DateTime<Utc>,
}

/// Adjusts raw similarity scores using recency, preference signals, and
/// session context.
#[derive(Clone)]
pub struct RelevanceScorer {
    memory: MemoryService,
}

impl RelevanceScorer {
    pub fn new(memory: MemoryService) -> Self {
        Self { memory }
    }

    /// Score a batch of matches from `namespace`, returning the adjusted
    /// list (sorted descending by adjusted score) and the scoring factors
    /// computed along the way.
    pub async fn score(
        &self,
        memories: Vec<SearchMatch>,
        namespace: &str,
        context: Option<&ScoringContext>,
    ) -> (Vec<ScoredMatch>, Vec<ScoringFactor>) {
        let mut scored = Vec::with_capacity(memories.len());
        let mut factors = Vec::new();

        for memory in memories {
            let mut adjusted = memory.score;

            // 1. Preference boost
            match self.preference_match_score(&memory.content).await {
                Ok(Some(match_score)) => {
                    adjusted = apply_preference_boost(adjusted, match_score);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(id = %memory.id, error = %e, "Preference lookup failed; skipping boost");
                }
            }

            // 2. Recency boost
            if let Some(age_days) = age_in_days(&memory.metadata, Utc::now()) {
                adjusted = apply_recency_boost(adjusted, age_days);
                factors.push(ScoringFactor {
                    memory_id: memory.id.clone(),
                    factor: "age_days".to_string(),
                    value: age_days,
                    computed_at: Utc::now(),
                });
            }

            // 3. Session-context boost
            if let Some(ctx) = context {
                if !ctx.recent_terms.is_empty() {
                    match self.session_hit(&memory.id, namespace, &ctx.recent_terms).await {
                        Ok(true) => adjusted = apply_session_boost(adjusted),
                        Ok(false) => {}
                        Err(e) => {
                            warn!(id = %memory.id, error = %e, "Session lookup failed; skipping boost");
                        }
                    }
                }
            }

            scored.push(ScoredMatch {
                id: memory.id,
                content: memory.content,
                original_score: memory.score,
                adjusted_score: adjusted,
                metadata: memory.metadata,
            });
        }

        scored.sort_by(|a, b| {
            b.adjusted_score
                .partial_cmp(&a.adjusted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        (scored, factors)
    }

    /// Persist computed scoring factors as learned records.
    ///
    /// This is the write half of scoring, separated from `score` so the
    /// caller can fire it asynchronously off the read path.
    pub async fn persist_factors(&self, factors: Vec<ScoringFactor>) -> Result<()> {
        for factor in factors {
            db::insert_memory(
                self.memory.db(),
                db::CreateMemoryRecord {
                    id: crate::models::new_id(),
                    namespace: NS_SCORING_FACTORS.to_string(),
                    content: serde_json::to_string(&factor)?,
                    metadata: Some(json!({ "factor": factor.factor })),
                },
            )
            .await?;
        }

        Ok(())
    }

    /// Persist a preference signal so future scoring can boost memories
    /// whose content matches it. Returns the stored record's id.
    pub async fn store_preference(&self, content: &str) -> Result<String> {
        let row = self.memory.store(content, NS_PREFERENCES).await?;
        Ok(row.id)
    }

    /// Top preference-signal match score for a memory's content prefix.
    async fn preference_match_score(&self, content: &str) -> Result<Option<f32>> {
        let prefix: String = content.chars().take(PREFERENCE_PREFIX_CHARS).collect();
        if prefix.trim().is_empty() {
            return Ok(None);
        }

        let matches = self.memory.search(&prefix, NS_PREFERENCES, 1).await?;
        Ok(matches.first().map(|m| m.score))
    }

    /// Whether recent session terms match this specific memory.
    async fn session_hit(&self, id: &str, namespace: &str, terms: &[String]) -> Result<bool> {
        let query = terms.join(" ");
        let matches = self
            .memory
            .search_scoped(&query, namespace, 1, Some(vec![id.to_string()]))
            .await?;
        Ok(!matches.is_empty())
    }
}

/// Add a weighted preference match to a score, clamped to the maximum.
pub fn apply_preference_boost(score: f32, match_score: f32) -> f32 {
    (score + match_score * PREFERENCE_WEIGHT).min(MAX_SCORE)
}

/// Boost memories created within the recency window, clamped.
pub fn apply_recency_boost(score: f32, age_days: f64) -> f32 {
    if age_days < RECENCY_WINDOW_DAYS {
        (score * RECENCY_BOOST).min(MAX_SCORE)
    } else {
        score
    }
}

/// Boost memories matching recent session searches, clamped.
pub fn apply_session_boost(score: f32) -> f32 {
    (score * SESSION_BOOST).min(MAX_SCORE)
}

/// Age in days from the `created_at` metadata field, if present.
pub fn age_in_days(metadata: &serde_json::Value, now: DateTime<Utc>) -> Option<f64> {
    let created = metadata.get("created_at")?.as_str()?;
    let created = DateTime::parse_from_rfc3339(created).ok()?.with_timezone(&Utc);
    let seconds = now.signed_duration_since(created).num_seconds();
    Some((seconds as f64 / 86400.0).max(0.0))
}
