//! Messages repository. The messages table is append-only.

use crate::errors::RcError;
use crate::models::MessageRow;
use crate::observability::metrics;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Messages repository for database operations.
pub struct MessagesRepository;

impl MessagesRepository {
    /// Append a message to a room.
    ///
    /// `author_member_id` is `None` for generated messages.
    #[instrument(skip_all, name = "rc.repo.insert_message")]
    pub async fn insert_message(
        pool: &PgPool,
        room_id: Uuid,
        author_member_id: Option<Uuid>,
        content: &str,
        is_ai: bool,
    ) -> Result<MessageRow, RcError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO messages (room_id, author_member_id, content, is_ai)
            VALUES ($1, $2, $3, $4)
            RETURNING message_id, room_id, author_member_id, content, is_ai, created_at
            "#,
        )
        .bind(room_id) // $1
        .bind(author_member_id) // $2
        .bind(content) // $3
        .bind(is_ai) // $4
        .fetch_one(pool)
        .await
        .map_err(|e| {
            let duration = start.elapsed();
            metrics::record_db_query("insert_message", "error", duration);
            RcError::Database(e.to_string())
        })?;

        let duration = start.elapsed();
        metrics::record_db_query("insert_message", "success", duration);

        Ok(map_row_to_message(row))
    }

    /// Fetch the most recent messages of a room, oldest first.
    #[instrument(skip_all, name = "rc.repo.list_messages")]
    pub async fn list_messages(
        pool: &PgPool,
        room_id: Uuid,
        limit: i64,
    ) -> Result<Vec<MessageRow>, RcError> {
        let rows = sqlx::query(
            r#"
            SELECT message_id, room_id, author_member_id, content, is_ai, created_at
            FROM (
                SELECT message_id, room_id, author_member_id, content, is_ai, created_at
                FROM messages
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

        Ok(rows.into_iter().map(map_row_to_message).collect())
    }

    /// Count the human-authored messages in a room.
    ///
    /// Drives the every-fifth-message suggestion trigger.
    #[instrument(skip_all, name = "rc.repo.count_human_messages")]
    pub async fn count_human_messages(pool: &PgPool, room_id: Uuid) -> Result<i64, RcError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE room_id = $1 AND NOT is_ai
            "#,
        )
        .bind(room_id)
        .fetch_one(pool)
        .await
        .map_err(|e| RcError::Database(e.to_string()))?;

        Ok(count)
    }
}

/// Map a database row to a MessageRow struct.
fn map_row_to_message(row: sqlx::postgres::PgRow) -> MessageRow {
    MessageRow {
        message_id: row.get("message_id"),
        room_id: row.get("room_id"),
        author_member_id: row.get("author_member_id"),
        content: row.get("content"),
        is_ai: row.get("is_ai"),
        created_at: row.get("created_at"),
    }
}
