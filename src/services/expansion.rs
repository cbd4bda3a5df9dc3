//! Query expansion using previously learned associations.
//!
//! Expansion is a best-effort enrichment step: it derives additional query
//! strings from a seed query by consulting expansion records stored in a
//! reserved namespace, plus high-confidence tags from the `all` namespace.
//! Any failure degrades to just the seed query.
//!
//! The system "learns" associations entirely through side-stored records
//! (`store_expansion`), not a trained model.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{NS_ALL, NS_QUERY_EXPANSION};
use crate::{Error, Result};

use super::memory::MemoryService;

/// How many stored expansion records to consult per query.
const EXPANSION_LOOKUP_LIMIT: usize = 5;

/// Tags from the `all` namespace only contribute above this score.
const TAG_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// A learned expansion record, stored as JSON content in the reserved
/// expansion namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionRecord {
    pub original_query: String,
    #[serde(default)]
    pub related_queries: Vec<String>,
}

/// Derives additional query strings from a base query.
#[derive(Clone)]
pub struct QueryExpansionService {
    memory: MemoryService,
}

impl QueryExpansionService {
    pub fn new(memory: MemoryService) -> Self {
        Self { memory }
    }

    /// Expand a query into a deduplicated set of variants.
    ///
    /// The lower-cased seed query always comes first; stored expansions
    /// and high-confidence tags follow in insertion order. Never fails.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let seed = query.trim().to_lowercase();
        let mut variants = vec![seed.clone()];

        if seed.is_empty() {
            return variants;
        }

        // Learned expansion records
        match self
            .memory
            .search(query, NS_QUERY_EXPANSION, EXPANSION_LOOKUP_LIMIT)
            .await
        {
            Ok(matches) => {
                for m in matches {
                    match serde_json::from_str::<ExpansionRecord>(&m.content) {
                        Ok(record) => {
                            for related in record.related_queries {
                                push_unique(&mut variants, related.to_lowercase());
                            }
                        }
                        // Unparsable content is treated as a literal expansion
                        Err(_) => push_unique(&mut variants, m.content.to_lowercase()),
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Expansion record lookup failed; continuing with seed query");
            }
        }

        // High-confidence tags from the cross-cutting namespace
        match self.memory.search(query, NS_ALL, EXPANSION_LOOKUP_LIMIT).await {
            Ok(matches) => {
                for m in matches.iter().filter(|m| m.score > TAG_CONFIDENCE_THRESHOLD) {
                    for tag in extract_tags(&m.metadata) {
                        push_unique(&mut variants, tag);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Tag lookup failed; continuing without tag expansions");
            }
        }

        variants
    }

    /// Persist a learned expansion so future queries can discover it.
    ///
    /// Stores the record as pretty-printed JSON through the memory
    /// service, which writes the record-store row and a vector entry in
    /// the reserved namespace. Returns the stored record's id.
    pub async fn store_expansion(&self, query: &str, related_queries: Vec<String>) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("Expansion query cannot be empty".into()));
        }

        let record = ExpansionRecord {
            original_query: query.to_lowercase(),
            related_queries: related_queries
                .into_iter()
                .map(|q| q.to_lowercase())
                .collect(),
        };

        let content = serde_json::to_string_pretty(&record)?;
        let row = self.memory.store(&content, NS_QUERY_EXPANSION).await?;

        Ok(row.id)
    }
}

/// Collect `#`-prefixed tag strings from match metadata, prefix stripped
/// and lower-cased.
fn extract_tags(metadata: &serde_json::Value) -> Vec<String> {
    metadata
        .get("tags")
        .and_then(|t| t.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str())
                .filter_map(|t| t.strip_prefix('#'))
                .map(|t| t.to_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

fn push_unique(variants: &mut Vec<String>, candidate: String) {
    if candidate.is_empty() {
        return;
    }
    if !variants.contains(&candidate) {
        variants.push(candidate);
    }
}
