//! Memory record queries.
//!
//! The record store is the durable half of the system: rows survive even
//! when vector indexing fails, and deletion is a soft delete that keeps
//! the row physically present.

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use super::DbPool;

// ============================================================================
// Types
// ============================================================================

/// Memory record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MemoryRow {
    pub id: String,
    pub namespace: String,
    pub content: String,
    /// Arbitrary JSON metadata
    pub metadata: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Soft delete marker; NULL means active.
    pub deleted_at: Option<String>,
}

impl MemoryRow {
    /// Parse the metadata column as JSON.
    pub fn metadata_json(&self) -> Value {
        self.metadata
            .as_ref()
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or(Value::Null)
    }

    /// Check whether the record is active (not soft-deleted).
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Input for creating a memory record.
#[derive(Debug, Clone)]
pub struct CreateMemoryRecord {
    pub id: String,
    pub namespace: String,
    pub content: String,
    pub metadata: Option<Value>,
}

// ============================================================================
// Queries
// ============================================================================

/// Insert a new memory record.
pub async fn insert_memory(pool: &DbPool, input: CreateMemoryRecord) -> Result<MemoryRow> {
    let metadata = input.metadata.map(|m| m.to_string());
    let now = crate::models::now().to_rfc3339();

    let row = sqlx::query_as::<_, MemoryRow>(
        r#"
        INSERT INTO memories (id, namespace, content, metadata, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.namespace)
    .bind(&input.content)
    .bind(metadata)
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch an active memory by id and namespace.
pub async fn get_active_memory(
    pool: &DbPool,
    id: &str,
    namespace: &str,
) -> Result<Option<MemoryRow>> {
    let row = sqlx::query_as::<_, MemoryRow>(
        "SELECT * FROM memories WHERE id = ? AND namespace = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(namespace)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Rewrite the content of an active memory.
///
/// Returns the number of rows affected; zero means no active record
/// matched the id + namespace pair.
pub async fn update_memory_content(
    pool: &DbPool,
    id: &str,
    namespace: &str,
    content: &str,
) -> Result<u64> {
    let now = crate::models::now().to_rfc3339();

    let result = sqlx::query(
        "UPDATE memories SET content = ?, updated_at = ? \
         WHERE id = ? AND namespace = ? AND deleted_at IS NULL",
    )
    .bind(content)
    .bind(&now)
    .bind(id)
    .bind(namespace)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Soft-delete a memory scoped by id and namespace.
///
/// Returns the number of rows affected.
pub async fn soft_delete_memory(pool: &DbPool, id: &str, namespace: &str) -> Result<u64> {
    let now = crate::models::now().to_rfc3339();

    let result = sqlx::query(
        "UPDATE memories SET deleted_at = ? \
         WHERE id = ? AND namespace = ? AND deleted_at IS NULL",
    )
    .bind(&now)
    .bind(id)
    .bind(namespace)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Soft-delete every active memory in a namespace in one bulk update.
///
/// Returns the number of rows soft-deleted.
pub async fn soft_delete_namespace(pool: &DbPool, namespace: &str) -> Result<u64> {
    let now = crate::models::now().to_rfc3339();

    let result =
        sqlx::query("UPDATE memories SET deleted_at = ? WHERE namespace = ? AND deleted_at IS NULL")
            .bind(&now)
            .bind(namespace)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

/// List ids of all active memories in a namespace.
pub async fn list_active_ids(pool: &DbPool, namespace: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT id FROM memories WHERE namespace = ? AND deleted_at IS NULL")
            .bind(namespace)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// List active memories in a namespace, newest first.
pub async fn list_active_memories(
    pool: &DbPool,
    namespace: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<MemoryRow>> {
    let rows = sqlx::query_as::<_, MemoryRow>(
        "SELECT * FROM memories WHERE namespace = ? AND deleted_at IS NULL \
         ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(namespace)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Count active memories in a namespace.
pub async fn count_active(pool: &DbPool, namespace: &str) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM memories WHERE namespace = ? AND deleted_at IS NULL")
            .bind(namespace)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

/// Count active memories across all namespaces.
pub async fn count_all_active(pool: &DbPool) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM memories WHERE deleted_at IS NULL")
            .fetch_one(pool)
            .await?;

    Ok(count)
}

/// Distinct namespaces with at least one active record, in first-seen order.
pub async fn distinct_namespaces(pool: &DbPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT namespace FROM memories WHERE deleted_at IS NULL \
         GROUP BY namespace ORDER BY MIN(rowid)",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(ns,)| ns).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ensure_schema, init_pool};

    async fn test_pool() -> DbPool {
        let pool = init_pool(":memory:").await.unwrap();
        ensure_schema(&pool).await.unwrap();
        pool
    }

    fn record(id: &str, namespace: &str, content: &str) -> CreateMemoryRecord {
        CreateMemoryRecord {
            id: id.to_string(),
            namespace: namespace.to_string(),
            content: content.to_string(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let pool = test_pool().await;

        let row = insert_memory(&pool, record("m1", "user:alice", "hello"))
            .await
            .unwrap();
        assert!(row.is_active());

        let fetched = get_active_memory(&pool, "m1", "user:alice").await.unwrap();
        assert_eq!(fetched.unwrap().content, "hello");

        // Wrong namespace yields nothing
        let miss = get_active_memory(&pool, "m1", "user:bob").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_hides_record() {
        let pool = test_pool().await;
        insert_memory(&pool, record("m1", "user:alice", "hello"))
            .await
            .unwrap();

        let affected = soft_delete_memory(&pool, "m1", "user:alice").await.unwrap();
        assert_eq!(affected, 1);

        assert!(get_active_memory(&pool, "m1", "user:alice")
            .await
            .unwrap()
            .is_none());
        assert_eq!(count_active(&pool, "user:alice").await.unwrap(), 0);

        // Row remains physically present
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memories")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(total, 1);

        // Second delete affects nothing
        let affected = soft_delete_memory(&pool, "m1", "user:alice").await.unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn test_namespace_bulk_delete_and_enumeration() {
        let pool = test_pool().await;
        insert_memory(&pool, record("a", "project:x", "one"))
            .await
            .unwrap();
        insert_memory(&pool, record("b", "project:x", "two"))
            .await
            .unwrap();
        insert_memory(&pool, record("c", "user:alice", "three"))
            .await
            .unwrap();

        let namespaces = distinct_namespaces(&pool).await.unwrap();
        assert_eq!(namespaces, vec!["project:x", "user:alice"]);

        let deleted = soft_delete_namespace(&pool, "project:x").await.unwrap();
        assert_eq!(deleted, 2);

        let namespaces = distinct_namespaces(&pool).await.unwrap();
        assert_eq!(namespaces, vec!["user:alice"]);
    }
}
