//! Session context tracking.
//!
//! A session tracks a caller's search history and viewed memories to
//! drive personalization and unexplored-topic suggestions. Every
//! mutation persists the full snapshot (last-write-wins); a session is
//! only ever driven by a single caller sequentially.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{self, DbPool};
use crate::Result;

/// Sessions inactive for longer than this load as expired.
const SESSION_TTL_DAYS: i64 = 30;

/// Trigger term -> suggested topic when the paired term was never searched.
const UNEXPLORED_TOPIC_RULES: &[(&str, &str)] = &[
    ("add", "tdd"),
    ("refactor", "regression tests"),
    ("deploy", "rollback"),
    ("optimize", "profiling"),
];

/// One recorded search within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntry {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub results_count: usize,
}

/// A caller's session, reloadable across requests by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub searches: Vec<SearchEntry>,
    pub viewed_memories: Vec<String>,
    pub last_activity_time: DateTime<Utc>,
}

impl Session {
    /// Construct a fresh session.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            start_time: now,
            searches: Vec::new(),
            viewed_memories: Vec::new(),
            last_activity_time: now,
        }
    }

    /// Load a stored session by id.
    ///
    /// Yields `None` when no snapshot exists or the session has been
    /// inactive beyond the TTL; the caller constructs a fresh one.
    pub async fn load(pool: &DbPool, session_id: &str) -> Result<Option<Session>> {
        let row = match db::load_session(pool, session_id).await? {
            Some(row) => row,
            None => return Ok(None),
        };

        let session: Session = match serde_json::from_str(&row.data) {
            Ok(s) => s,
            Err(_) => return Ok(None),
        };

        if is_expired(session.last_activity_time, Utc::now()) {
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Record a search and persist the snapshot.
    pub async fn record_search(
        &mut self,
        pool: &DbPool,
        query: &str,
        results_count: usize,
    ) -> Result<()> {
        let now = Utc::now();
        self.searches.push(SearchEntry {
            query: query.to_string(),
            timestamp: now,
            results_count,
        });
        self.last_activity_time = now;
        self.persist(pool).await
    }

    /// Record a viewed memory and persist the snapshot.
    pub async fn record_memory_view(&mut self, pool: &DbPool, memory_id: &str) -> Result<()> {
        if !self.viewed_memories.iter().any(|id| id == memory_id) {
            self.viewed_memories.push(memory_id.to_string());
        }
        self.last_activity_time = Utc::now();
        self.persist(pool).await
    }

    /// The most recent `n` search queries, newest last.
    pub fn recent_search_terms(&self, n: usize) -> Vec<String> {
        let start = self.searches.len().saturating_sub(n);
        self.searches[start..].iter().map(|s| s.query.clone()).collect()
    }

    /// Suggest topics the session has circled but never searched.
    ///
    /// Purely heuristic: a fixed rule table of trigger terms and their
    /// paired topics.
    pub fn unexplored_topics(&self) -> Vec<String> {
        let searched: Vec<String> = self
            .searches
            .iter()
            .map(|s| s.query.to_lowercase())
            .collect();

        let mut topics = Vec::new();
        for (trigger, paired) in UNEXPLORED_TOPIC_RULES {
            let has_trigger = searched.iter().any(|q| q.contains(trigger));
            let has_paired = searched.iter().any(|q| q.contains(paired));
            if has_trigger && !has_paired {
                topics.push(paired.to_string());
            }
        }
        topics
    }

    async fn persist(&self, pool: &DbPool) -> Result<()> {
        let data = serde_json::to_string(self)?;
        db::save_session(
            pool,
            &self.session_id,
            &data,
            &self.start_time.to_rfc3339(),
            &self.last_activity_time.to_rfc3339(),
        )
        .await
    }
}

/// Whether a session's last activity is beyond the inactivity TTL.
fn is_expired(last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last_activity) > Duration::days(SESSION_TTL_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ensure_schema, init_pool};

    #[test]
    fn test_unexplored_topics_rule_table() {
        let mut session = Session::new("s1");
        session.searches.push(SearchEntry {
            query: "add memory endpoint".into(),
            timestamp: Utc::now(),
            results_count: 2,
        });

        assert_eq!(session.unexplored_topics(), vec!["tdd"]);

        session.searches.push(SearchEntry {
            query: "tdd workflow".into(),
            timestamp: Utc::now(),
            results_count: 1,
        });

        assert!(session.unexplored_topics().is_empty());
    }

    #[test]
    fn test_recent_search_terms_takes_tail() {
        let mut session = Session::new("s1");
        for q in ["one", "two", "three"] {
            session.searches.push(SearchEntry {
                query: q.into(),
                timestamp: Utc::now(),
                results_count: 0,
            });
        }

        assert_eq!(session.recent_search_terms(2), vec!["two", "three"]);
        assert_eq!(session.recent_search_terms(10).len(), 3);
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        assert!(!is_expired(now - Duration::days(29), now));
        assert!(is_expired(now - Duration::days(31), now));
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let pool = init_pool(":memory:").await.unwrap();
        ensure_schema(&pool).await.unwrap();

        let mut session = Session::new("s1");
        session.record_search(&pool, "rust async", 4).await.unwrap();
        session.record_memory_view(&pool, "m1").await.unwrap();
        session.record_memory_view(&pool, "m1").await.unwrap();

        let loaded = Session::load(&pool, "s1").await.unwrap().unwrap();
        assert_eq!(loaded.searches.len(), 1);
        assert_eq!(loaded.searches[0].query, "rust async");
        assert_eq!(loaded.viewed_memories, vec!["m1"]);

        assert!(Session::load(&pool, "missing").await.unwrap().is_none());
    }
}
