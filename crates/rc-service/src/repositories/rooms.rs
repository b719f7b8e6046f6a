//! Rooms repository for database operations.
//!
//! Room rows carry the private join code; everything returned from here is
//! the raw [`RoomRow`] and must be projected through `RoomInfo` before it
//! leaves the service.

use crate::errors::RcError;
use crate::models::RoomRow;
use crate::observability::metrics;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Rooms repository for database operations.
pub struct RoomsRepository;

impl RoomsRepository {
    /// Insert a new room owned by `created_by_member_id`.
    ///
    /// Private rooms are created with their initial join code in the same
    /// statement, so there is never a private room without one. The caller
    /// retries on join-code collision.
    #[instrument(skip_all, name = "rc.repo.create_room")]
    pub async fn create_room(
        pool: &PgPool,
        created_by_member_id: Uuid,
        display_name: &str,
        theme: &str,
        description: Option<&str>,
        is_private: bool,
        join_code: Option<&str>,
    ) -> Result<RoomRow, RcError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO rooms (
                display_name, theme, description, created_by_member_id,
                is_private, join_code
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING
                room_id, display_name, theme, description, created_by_member_id,
                occupancy, status, join_code, is_private, created_at, updated_at
            "#,
        )
        .bind(display_name) // $1
        .bind(theme) // $2
        .bind(description) // $3
        .bind(created_by_member_id) // $4
        .bind(is_private) // $5
        .bind(join_code) // $6
        .fetch_one(pool)
        .await
        .map_err(|e| {
            let duration = start.elapsed();
            metrics::record_db_query("create_room", "error", duration);
            RcError::Database(e.to_string())
        })?;

        let duration = start.elapsed();
        metrics::record_db_query("create_room", "success", duration);

        Ok(map_row_to_room(row))
    }

    /// Fetch a room by id.
    #[instrument(skip_all, name = "rc.repo.get_room")]
    pub async fn get_room(pool: &PgPool, room_id: Uuid) -> Result<Option<RoomRow>, RcError> {
        let row = sqlx::query(
            r#"
            SELECT
                room_id, display_name, theme, description, created_by_member_id,
                occupancy, status, join_code, is_private, created_at, updated_at
            FROM rooms
            WHERE room_id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| RcError::Database(e.to_string()))?;

        Ok(row.map(map_row_to_room))
    }

    /// List rooms, most recently created first.
    #[instrument(skip_all, name = "rc.repo.list_rooms")]
    pub async fn list_rooms(pool: &PgPool) -> Result<Vec<RoomRow>, RcError> {
        let rows = sqlx::query(
            r#"
            SELECT
                room_id, display_name, theme, description, created_by_member_id,
                occupancy, status, join_code, is_private, created_at, updated_at
            FROM rooms
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(|e| RcError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(map_row_to_room).collect())
    }

    /// Install a new join code on a room, invalidating the previous one.
    ///
    /// Fails with a unique-violation database error when the code is
    /// already taken by another room; the caller regenerates and retries.
    #[instrument(skip_all, name = "rc.repo.update_join_code")]
    pub async fn update_join_code(
        pool: &PgPool,
        room_id: Uuid,
        join_code: &str,
    ) -> Result<RoomRow, RcError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            UPDATE rooms
            SET join_code = $2, updated_at = NOW()
            WHERE room_id = $1
            RETURNING
                room_id, display_name, theme, description, created_by_member_id,
                occupancy, status, join_code, is_private, created_at, updated_at
            "#,
        )
        .bind(room_id)
        .bind(join_code)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            let duration = start.elapsed();
            metrics::record_db_query("update_join_code", "error", duration);
            RcError::Database(e.to_string())
        })?;

        let duration = start.elapsed();
        metrics::record_db_query("update_join_code", "success", duration);

        row.map(map_row_to_room)
            .ok_or_else(|| RcError::NotFound("Room not found".to_string()))
    }
}

/// Map a database row to a RoomRow struct.
///
/// Shared by all queries that return room rows, including the membership
/// transactions in the participants repository.
pub(crate) fn map_row_to_room(row: sqlx::postgres::PgRow) -> RoomRow {
    RoomRow {
        room_id: row.get("room_id"),
        display_name: row.get("display_name"),
        theme: row.get("theme"),
        description: row.get("description"),
        created_by_member_id: row.get("created_by_member_id"),
        occupancy: row.get("occupancy"),
        status: row.get("status"),
        join_code: row.get("join_code"),
        is_private: row.get("is_private"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod integration_tests {
    use super::*;

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_create_and_get_room(pool: PgPool) {
        let creator = Uuid::new_v4();

        let created = RoomsRepository::create_room(
            &pool,
            creator,
            "Design crit",
            "weekly review",
            Some("Share work in progress"),
            false,
            None,
        )
        .await
        .expect("create should succeed");

        assert_eq!(created.display_name, "Design crit");
        assert_eq!(created.occupancy, 0);
        assert_eq!(created.status, "active");
        assert!(created.join_code.is_none());

        let fetched = RoomsRepository::get_room(&pool, created.room_id)
            .await
            .expect("get should succeed")
            .expect("room should exist");

        assert_eq!(fetched.room_id, created.room_id);
        assert_eq!(fetched.created_by_member_id, creator);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_private_room_is_created_with_its_code(pool: PgPool) {
        let room = RoomsRepository::create_room(
            &pool,
            Uuid::new_v4(),
            "Secret lair",
            "planning",
            None,
            true,
            Some("XKCDWTFQRS"),
        )
        .await
        .expect("create should succeed");

        assert!(room.is_private);
        assert_eq!(room.join_code.as_deref(), Some("XKCDWTFQRS"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_duplicate_join_code_is_rejected(pool: PgPool) {
        RoomsRepository::create_room(
            &pool,
            Uuid::new_v4(),
            "First",
            "theme",
            None,
            true,
            Some("SAMECODE42"),
        )
        .await
        .expect("first create should succeed");

        let result = RoomsRepository::create_room(
            &pool,
            Uuid::new_v4(),
            "Second",
            "theme",
            None,
            true,
            Some("SAMECODE42"),
        )
        .await;

        assert!(matches!(
            result,
            Err(RcError::Database(ref msg)) if msg.contains("unique") || msg.contains("duplicate")
        ));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_update_join_code_replaces_previous(pool: PgPool) {
        let room = RoomsRepository::create_room(
            &pool,
            Uuid::new_v4(),
            "Secret lair",
            "planning",
            None,
            true,
            Some("OLDCODE999"),
        )
        .await
        .expect("create should succeed");

        let updated = RoomsRepository::update_join_code(&pool, room.room_id, "NEWCODE888")
            .await
            .expect("update should succeed");

        assert_eq!(updated.join_code.as_deref(), Some("NEWCODE888"));
        assert!(updated.updated_at >= room.updated_at);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_update_join_code_missing_room_is_not_found(pool: PgPool) {
        let result = RoomsRepository::update_join_code(&pool, Uuid::new_v4(), "ANYCODE777").await;

        assert!(matches!(result, Err(RcError::NotFound(_))));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_list_rooms_newest_first(pool: PgPool) {
        for name in ["one", "two", "three"] {
            RoomsRepository::create_room(&pool, Uuid::new_v4(), name, "theme", None, false, None)
                .await
                .expect("create should succeed");
        }

        let rooms = RoomsRepository::list_rooms(&pool)
            .await
            .expect("list should succeed");

        assert_eq!(rooms.len(), 3);
        assert_eq!(rooms.first().map(|r| r.display_name.as_str()), Some("three"));
    }
}
