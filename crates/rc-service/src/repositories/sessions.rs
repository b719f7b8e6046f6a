//! Member session registry repository.
//!
//! One row per (member, device) pair. Rows are written by the join
//! transaction in the participants repository; this module covers the
//! read side and the heartbeat refresh.

use crate::errors::RcError;
use crate::models::MemberSessionRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

/// Sessions repository for database operations.
pub struct SessionsRepository;

impl SessionsRepository {
    /// List a member's sessions, most recently seen first.
    #[instrument(skip_all, name = "rc.repo.list_sessions")]
    pub async fn list_for_member(
        pool: &PgPool,
        member_id: Uuid,
    ) -> Result<Vec<MemberSessionRow>, RcError> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, member_id, device_id, room_id, started_at, last_seen_at
            FROM member_sessions
            WHERE member_id = $1
            ORDER BY last_seen_at DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await
        .map_err(|e| RcError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(map_row_to_session).collect())
    }

    /// Refresh the liveness timestamp of a member's sessions in a room.
    ///
    /// Heartbeats do not carry a device id, so every session the member
    /// holds in the room is touched. A member with no session rows is a
    /// no-op, not an error.
    #[instrument(skip_all, name = "rc.repo.touch_sessions")]
    pub async fn touch_for_room(
        pool: &PgPool,
        member_id: Uuid,
        room_id: Uuid,
    ) -> Result<u64, RcError> {
        let result = sqlx::query(
            r#"
            UPDATE member_sessions
            SET last_seen_at = NOW()
            WHERE member_id = $1 AND room_id = $2
            "#,
        )
        .bind(member_id) // $1
        .bind(room_id) // $2
        .execute(pool)
        .await
        .map_err(|e| RcError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

/// Map a database row to a MemberSessionRow struct.
fn map_row_to_session(row: sqlx::postgres::PgRow) -> MemberSessionRow {
    MemberSessionRow {
        session_id: row.get("session_id"),
        member_id: row.get("member_id"),
        device_id: row.get("device_id"),
        room_id: row.get("room_id"),
        started_at: row.get("started_at"),
        last_seen_at: row.get("last_seen_at"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod integration_tests {
    use super::*;
    use crate::repositories::{ParticipantsRepository, RoomsRepository};

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_list_shows_every_device(pool: PgPool) {
        let room =
            RoomsRepository::create_room(&pool, Uuid::new_v4(), "Room", "testing", None, false, None)
                .await
                .expect("room create should succeed");
        let member = Uuid::new_v4();

        ParticipantsRepository::join(&pool, room.room_id, member, "web-1", None, 5)
            .await
            .expect("join should succeed");
        ParticipantsRepository::join(&pool, room.room_id, member, "tablet-2", None, 5)
            .await
            .expect("join should succeed");

        let sessions = SessionsRepository::list_for_member(&pool, member)
            .await
            .expect("list should succeed");

        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.room_id == Some(room.room_id)));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_touch_refreshes_matching_sessions_only(pool: PgPool) {
        let room =
            RoomsRepository::create_room(&pool, Uuid::new_v4(), "Room", "testing", None, false, None)
                .await
                .expect("room create should succeed");
        let member = Uuid::new_v4();
        let other = Uuid::new_v4();

        ParticipantsRepository::join(&pool, room.room_id, member, "web-1", None, 5)
            .await
            .expect("join should succeed");
        ParticipantsRepository::join(&pool, room.room_id, other, "web-2", None, 5)
            .await
            .expect("join should succeed");

        let touched = SessionsRepository::touch_for_room(&pool, member, room.room_id)
            .await
            .expect("touch should succeed");

        assert_eq!(touched, 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_touch_with_no_sessions_is_a_noop(pool: PgPool) {
        let room =
            RoomsRepository::create_room(&pool, Uuid::new_v4(), "Room", "testing", None, false, None)
                .await
                .expect("room create should succeed");

        let touched = SessionsRepository::touch_for_room(&pool, Uuid::new_v4(), room.room_id)
            .await
            .expect("touch should succeed");

        assert_eq!(touched, 0);
    }
}
