//! Suggestions repository. The suggestions table is append-only.

use crate::errors::RcError;
use crate::models::SuggestionRow;
use crate::observability::metrics;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Suggestions repository for database operations.
pub struct SuggestionsRepository;

impl SuggestionsRepository {
    /// Append a generated suggestion to a room.
    #[instrument(skip_all, name = "rc.repo.insert_suggestion")]
    pub async fn insert_suggestion(
        pool: &PgPool,
        room_id: Uuid,
        content: &str,
    ) -> Result<SuggestionRow, RcError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO suggestions (room_id, content)
            VALUES ($1, $2)
            RETURNING suggestion_id, room_id, content, created_at
            "#,
        )
        .bind(room_id) // $1
        .bind(content) // $2
        .fetch_one(pool)
        .await
        .map_err(|e| {
            let duration = start.elapsed();
            metrics::record_db_query("insert_suggestion", "error", duration);
            RcError::Database(e.to_string())
        })?;

        let duration = start.elapsed();
        metrics::record_db_query("insert_suggestion", "success", duration);

        Ok(map_row_to_suggestion(row))
    }

    /// Fetch the most recent suggestions of a room, oldest first.
    #[instrument(skip_all, name = "rc.repo.list_suggestions")]
    pub async fn list_suggestions(
        pool: &PgPool,
        room_id: Uuid,
        limit: i64,
    ) -> Result<Vec<SuggestionRow>, RcError> {
        let rows = sqlx::query(
            r#"
            SELECT suggestion_id, room_id, content, created_at
            FROM (
                SELECT suggestion_id, room_id, content, created_at
                FROM suggestions
                WHERE room_id = $1
                ORDER BY created_at DESC
                LIMIT $2
            ) recent
            ORDER BY created_at ASC
            "#,
        )
        .bind(room_id) // $1
        .bind(limit) // $2
        .fetch_all(pool)
        .await
        .map_err(|e| RcError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(map_row_to_suggestion).collect())
    }
}

/// Map a database row to a SuggestionRow struct.
fn map_row_to_suggestion(row: sqlx::postgres::PgRow) -> SuggestionRow {
    SuggestionRow {
        suggestion_id: row.get("suggestion_id"),
        room_id: row.get("room_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}
