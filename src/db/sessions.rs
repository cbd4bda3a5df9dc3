//! Session snapshot queries.
//!
//! Sessions are persisted as whole JSON snapshots keyed by session id.
//! Every mutation writes the full snapshot (last-write-wins); a session
//! is only ever driven by a single caller sequentially.

use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

/// Session snapshot row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    /// Full session snapshot as JSON.
    pub data: String,
    pub started_at: String,
    pub last_activity_at: String,
}

/// Upsert a full session snapshot.
pub async fn save_session(
    pool: &DbPool,
    id: &str,
    data: &str,
    started_at: &str,
    last_activity_at: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, data, started_at, last_activity_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            data = excluded.data,
            last_activity_at = excluded.last_activity_at
        "#,
    )
    .bind(id)
    .bind(data)
    .bind(started_at)
    .bind(last_activity_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a session snapshot by id.
pub async fn load_session(pool: &DbPool, id: &str) -> Result<Option<SessionRow>> {
    let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}
