//! Cross-namespace fan-out aggregation.
//!
//! Fans a query out across all known namespaces and groups results per
//! namespace rather than merging into one flat ranking, so a caller can
//! see which realms matched.

use futures::future::join_all;
use tracing::warn;

use crate::db;
use crate::models::NamespaceMatches;
use crate::Result;

use super::memory::{MemoryService, DEFAULT_SEARCH_LIMIT};

/// Maximum namespaces searched per fan-out.
pub const FANOUT_LIMIT: usize = 50;

/// Fans a query out across namespaces and merges grouped results.
#[derive(Clone)]
pub struct CrossNamespaceAggregator {
    memory: MemoryService,
}

impl CrossNamespaceAggregator {
    pub fn new(memory: MemoryService) -> Self {
        Self { memory }
    }

    /// Search every known namespace for `query`.
    ///
    /// Enumeration is capped at `FANOUT_LIMIT` namespaces. Per-namespace
    /// searches run concurrently; a failing namespace is logged and
    /// omitted, as are namespaces with zero matches. Output order follows
    /// the enumeration order; within a namespace, matches are ordered by
    /// descending score.
    pub async fn search_all(&self, query: &str) -> Result<Vec<NamespaceMatches>> {
        let mut namespaces = match db::distinct_namespaces(self.memory.db()).await {
            Ok(ns) => ns,
            Err(e) => {
                warn!(error = %e, "Namespace enumeration failed; returning empty result");
                return Ok(Vec::new());
            }
        };
        namespaces.truncate(FANOUT_LIMIT);

        let searches = namespaces.iter().map(|ns| {
            let memory = self.memory.clone();
            let query = query.to_string();
            let ns = ns.clone();
            async move {
                let result = memory.search(&query, &ns, DEFAULT_SEARCH_LIMIT).await;
                (ns, result)
            }
        });

        // join_all preserves enumeration order
        let outcomes = join_all(searches).await;

        let mut grouped = Vec::new();
        for (namespace, result) in outcomes {
            match result {
                Ok(memories) if memories.is_empty() => {}
                Ok(memories) => grouped.push(NamespaceMatches { namespace, memories }),
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Namespace search failed; omitting");
                }
            }
        }

        Ok(grouped)
    }
}
