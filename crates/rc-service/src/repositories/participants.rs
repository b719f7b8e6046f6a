//! Participants repository: the membership ledger and its transactor.
//!
//! Every membership mutation runs inside a room-scoped critical section:
//! the room row is locked `FOR UPDATE` first, so concurrent joins and
//! leaves for one room serialize while other rooms proceed unblocked.
//! Occupancy is recomputed from the exact count of active rows inside the
//! same transaction, never incremented in place, so the cached counter can
//! never drift past a mutation.

use crate::errors::RcError;
use crate::models::{ParticipantRow, RoomRow};
use crate::observability::metrics;
use crate::repositories::rooms::map_row_to_room;
use chrono::{DateTime, Utc};
use common::types::RoomStatus;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// True when the caller already had a membership row (active or not)
    /// and it was reactivated instead of inserted.
    pub already_member: bool,

    /// Room row after occupancy recomputation.
    pub room: RoomRow,

    /// The caller's participant row.
    pub participant: ParticipantRow,
}

/// Result of a successful leave.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    /// Room row after occupancy recomputation.
    pub room: RoomRow,

    /// The demoted participant row.
    pub participant: ParticipantRow,
}

/// Rows touched by one liveness sweep pass.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Participant rows demoted to inactive this pass.
    pub evicted: Vec<ParticipantRow>,

    /// Rooms whose occupancy was reconciled after the demotions.
    pub updated_rooms: Vec<RoomRow>,
}

/// Participants repository for database operations.
pub struct ParticipantsRepository;

impl ParticipantsRepository {
    /// Join a member to a room, or reactivate their existing membership.
    ///
    /// The whole operation is one transaction under the room row lock, so
    /// two concurrent callers can never both observe one free slot and
    /// both succeed. Rejoin (a row already exists for this member, active
    /// or not) skips the capacity and join-code checks.
    #[instrument(skip_all, name = "rc.repo.join_room")]
    pub async fn join(
        pool: &PgPool,
        room_id: Uuid,
        member_id: Uuid,
        device_id: &str,
        join_code: Option<&str>,
        capacity: i64,
    ) -> Result<JoinOutcome, RcError> {
        let start = Instant::now();

        let result = join_in_tx(pool, room_id, member_id, device_id, join_code, capacity).await;

        let duration = start.elapsed();
        match &result {
            Ok(_) => metrics::record_db_query("join_room", "success", duration),
            Err(RcError::Database(_)) => metrics::record_db_query("join_room", "error", duration),
            // Domain rejections (full room, bad code, ...) are not
            // database failures.
            Err(_) => {}
        }

        result
    }

    /// Demote the caller's active membership in a room.
    #[instrument(skip_all, name = "rc.repo.leave_room")]
    pub async fn leave(
        pool: &PgPool,
        room_id: Uuid,
        member_id: Uuid,
    ) -> Result<LeaveOutcome, RcError> {
        let start = Instant::now();

        let result = leave_in_tx(pool, room_id, member_id).await;

        let duration = start.elapsed();
        match &result {
            Ok(_) => metrics::record_db_query("leave_room", "success", duration),
            Err(RcError::Database(_)) => metrics::record_db_query("leave_room", "error", duration),
            Err(_) => {}
        }

        result
    }

    /// Refresh the caller's liveness timestamp.
    ///
    /// Returns `None` when no active membership row exists, which the
    /// caller reports as a soft rejoin-required failure rather than an
    /// error: the member was evicted (or never joined) and must join
    /// again before heartbeating.
    #[instrument(skip_all, name = "rc.repo.heartbeat")]
    pub async fn heartbeat(
        pool: &PgPool,
        room_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, RcError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            UPDATE participants
            SET last_seen_at = NOW()
            WHERE room_id = $1 AND member_id = $2 AND is_active
            RETURNING last_seen_at
            "#,
        )
        .bind(room_id) // $1
        .bind(member_id) // $2
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            let duration = start.elapsed();
            metrics::record_db_query("heartbeat", "error", duration);
            RcError::Database(e.to_string())
        })?;

        let duration = start.elapsed();
        metrics::record_db_query("heartbeat", "success", duration);

        Ok(row.map(|r| r.get("last_seen_at")))
    }

    /// List all participants of a room, active first then by join time.
    #[instrument(skip_all, name = "rc.repo.list_participants")]
    pub async fn list_participants(
        pool: &PgPool,
        room_id: Uuid,
    ) -> Result<Vec<ParticipantRow>, RcError> {
        let rows = sqlx::query(
            r#"
            SELECT
                participant_id, room_id, member_id, device_id, is_active,
                room_role, last_seen_at, joined_at
            FROM participants
            WHERE room_id = $1
            ORDER BY is_active DESC, joined_at ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(pool)
        .await
        .map_err(|e| RcError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(map_row_to_participant).collect())
    }

    /// Fetch one member's participant row in a room, if any.
    #[instrument(skip_all, name = "rc.repo.get_participant")]
    pub async fn get_participant(
        pool: &PgPool,
        room_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<ParticipantRow>, RcError> {
        let row = sqlx::query(
            r#"
            SELECT
                participant_id, room_id, member_id, device_id, is_active,
                room_role, last_seen_at, joined_at
            FROM participants
            WHERE room_id = $1 AND member_id = $2
            "#,
        )
        .bind(room_id) // $1
        .bind(member_id) // $2
        .fetch_optional(pool)
        .await
        .map_err(|e| RcError::Database(e.to_string()))?;

        Ok(row.map(map_row_to_participant))
    }

    /// Demote every active participant whose last heartbeat is older than
    /// the liveness threshold, then reconcile occupancy for each touched
    /// room.
    ///
    /// The demotion pass holds no room locks; each touched room is then
    /// reconciled in its own short room-locked transaction. A reconcile
    /// failure is logged and skipped so one bad room does not block the
    /// rest; the cached occupancy self-heals on that room's next
    /// membership mutation. Idempotent and safe to overlap with itself.
    #[instrument(skip_all, name = "rc.repo.sweep_stale")]
    pub async fn sweep_stale(
        pool: &PgPool,
        liveness_timeout_seconds: u64,
    ) -> Result<SweepOutcome, RcError> {
        let start = Instant::now();

        let evicted_rows = sqlx::query(
            r#"
            UPDATE participants
            SET is_active = FALSE
            WHERE is_active
              AND last_seen_at < NOW() - ($1 || ' seconds')::INTERVAL
            RETURNING
                participant_id, room_id, member_id, device_id, is_active,
                room_role, last_seen_at, joined_at
            "#,
        )
        .bind(liveness_timeout_seconds.to_string())
        .fetch_all(pool)
        .await
        .map_err(|e| {
            let duration = start.elapsed();
            metrics::record_db_query("sweep_stale", "error", duration);
            RcError::Database(e.to_string())
        })?;

        let evicted: Vec<ParticipantRow> =
            evicted_rows.into_iter().map(map_row_to_participant).collect();

        let mut room_ids: Vec<Uuid> = evicted.iter().map(|p| p.room_id).collect();
        room_ids.sort_unstable();
        room_ids.dedup();

        let mut updated_rooms = Vec::with_capacity(room_ids.len());
        for room_id in room_ids {
            match reconcile_room(pool, room_id).await {
                Ok(room) => updated_rooms.push(room),
                Err(e) => {
                    tracing::warn!(
                        target: "rc.sweep",
                        room_id = %room_id,
                        error = %e,
                        "Failed to reconcile room occupancy after eviction"
                    );
                }
            }
        }

        let duration = start.elapsed();
        metrics::record_db_query("sweep_stale", "success", duration);

        Ok(SweepOutcome {
            evicted,
            updated_rooms,
        })
    }
}

async fn join_in_tx(
    pool: &PgPool,
    room_id: Uuid,
    member_id: Uuid,
    device_id: &str,
    join_code: Option<&str>,
    capacity: i64,
) -> Result<JoinOutcome, RcError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| RcError::Database(format!("Failed to start transaction: {}", e)))?;

    // Room-scoped critical section. All membership mutations for this
    // room queue behind this lock until commit; other rooms are unaffected.
    let room_row = sqlx::query(
        r#"
        SELECT
            room_id, display_name, theme, description, created_by_member_id,
            occupancy, status, join_code, is_private, created_at, updated_at
        FROM rooms
        WHERE room_id = $1
        FOR UPDATE
        "#,
    )
    .bind(room_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| RcError::Database(format!("Failed to lock room row: {}", e)))?;

    let Some(room_row) = room_row else {
        return Err(RcError::NotFound("Room not found".to_string()));
    };
    let room = map_row_to_room(room_row);

    if RoomStatus::from_db_str(&room.status) != RoomStatus::Active {
        return Err(RcError::InactiveRoom);
    }

    // An existing row (active or not) is reactivated in place: it adopts
    // the caller's current device and skips the code and capacity checks.
    let existing = sqlx::query(
        r#"
        UPDATE participants
        SET is_active = TRUE, device_id = $3, last_seen_at = NOW()
        WHERE room_id = $1 AND member_id = $2
        RETURNING
            participant_id, room_id, member_id, device_id, is_active,
            room_role, last_seen_at, joined_at
        "#,
    )
    .bind(room_id) // $1
    .bind(member_id) // $2
    .bind(device_id) // $3
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| RcError::Database(format!("Failed to reactivate participant: {}", e)))?;

    if let Some(row) = existing {
        let participant = map_row_to_participant(row);
        upsert_session(&mut tx, member_id, device_id, room_id).await?;
        let room = recompute_occupancy(&mut tx, room_id).await?;

        tx.commit()
            .await
            .map_err(|e| RcError::Database(format!("Failed to commit rejoin: {}", e)))?;

        return Ok(JoinOutcome {
            already_member: true,
            room,
            participant,
        });
    }

    // First-time joiners on a private room present the join code; the
    // creator is exempt.
    if room.is_private && member_id != room.created_by_member_id {
        match (room.join_code.as_deref(), join_code) {
            (Some(expected), Some(presented)) if expected == presented => {}
            _ => {
                return Err(RcError::Unauthorized(
                    "Invalid or missing join code".to_string(),
                ));
            }
        }
    }

    // Capacity check against the exact active count, still under the room
    // lock.
    let active_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM participants
        WHERE room_id = $1 AND is_active
        "#,
    )
    .bind(room_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| RcError::Database(format!("Failed to count active participants: {}", e)))?;

    if active_count >= capacity {
        return Err(RcError::CapacityExceeded);
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO participants (room_id, member_id, device_id, is_active)
        VALUES ($1, $2, $3, TRUE)
        RETURNING
            participant_id, room_id, member_id, device_id, is_active,
            room_role, last_seen_at, joined_at
        "#,
    )
    .bind(room_id) // $1
    .bind(member_id) // $2
    .bind(device_id) // $3
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| RcError::Database(format!("Failed to insert participant: {}", e)))?;

    let participant = map_row_to_participant(inserted);
    upsert_session(&mut tx, member_id, device_id, room_id).await?;
    let room = recompute_occupancy(&mut tx, room_id).await?;

    tx.commit()
        .await
        .map_err(|e| RcError::Database(format!("Failed to commit join: {}", e)))?;

    Ok(JoinOutcome {
        already_member: false,
        room,
        participant,
    })
}

async fn leave_in_tx(
    pool: &PgPool,
    room_id: Uuid,
    member_id: Uuid,
) -> Result<LeaveOutcome, RcError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| RcError::Database(format!("Failed to start transaction: {}", e)))?;

    let room_row = sqlx::query(
        r#"
        SELECT room_id
        FROM rooms
        WHERE room_id = $1
        FOR UPDATE
        "#,
    )
    .bind(room_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| RcError::Database(format!("Failed to lock room row: {}", e)))?;

    if room_row.is_none() {
        return Err(RcError::NotFound("Room not found".to_string()));
    }

    let demoted = sqlx::query(
        r#"
        UPDATE participants
        SET is_active = FALSE, last_seen_at = NOW()
        WHERE room_id = $1 AND member_id = $2 AND is_active
        RETURNING
            participant_id, room_id, member_id, device_id, is_active,
            room_role, last_seen_at, joined_at
        "#,
    )
    .bind(room_id) // $1
    .bind(member_id) // $2
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| RcError::Database(format!("Failed to demote participant: {}", e)))?;

    let Some(demoted) = demoted else {
        return Err(RcError::NotAMember);
    };

    let participant = map_row_to_participant(demoted);
    let room = recompute_occupancy(&mut tx, room_id).await?;

    tx.commit()
        .await
        .map_err(|e| RcError::Database(format!("Failed to commit leave: {}", e)))?;

    Ok(LeaveOutcome { room, participant })
}

/// Reconcile one room's cached occupancy in its own room-locked
/// transaction. Used by the sweep after demotions.
async fn reconcile_room(pool: &PgPool, room_id: Uuid) -> Result<RoomRow, RcError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| RcError::Database(format!("Failed to start transaction: {}", e)))?;

    let room = recompute_occupancy(&mut tx, room_id).await?;

    tx.commit()
        .await
        .map_err(|e| RcError::Database(format!("Failed to commit occupancy reconcile: {}", e)))?;

    Ok(room)
}

/// Rewrite a room's occupancy as the exact count of its active
/// participants and bump `updated_at`. Must run inside the caller's
/// transaction; the UPDATE takes the room row lock if not already held.
async fn recompute_occupancy(
    tx: &mut Transaction<'_, Postgres>,
    room_id: Uuid,
) -> Result<RoomRow, RcError> {
    let row = sqlx::query(
        r#"
        UPDATE rooms
        SET occupancy = (
            SELECT COUNT(*)
            FROM participants
            WHERE room_id = $1 AND is_active
        ),
        updated_at = NOW()
        WHERE room_id = $1
        RETURNING
            room_id, display_name, theme, description, created_by_member_id,
            occupancy, status, join_code, is_private, created_at, updated_at
        "#,
    )
    .bind(room_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| RcError::Database(format!("Failed to recompute occupancy: {}", e)))?;

    Ok(map_row_to_room(row))
}

/// Record which room a (member, device) pair is present in. Runs inside
/// the join transaction so the registry and the ledger move together.
async fn upsert_session(
    tx: &mut Transaction<'_, Postgres>,
    member_id: Uuid,
    device_id: &str,
    room_id: Uuid,
) -> Result<(), RcError> {
    sqlx::query(
        r#"
        INSERT INTO member_sessions (member_id, device_id, room_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (member_id, device_id)
        DO UPDATE SET room_id = EXCLUDED.room_id, last_seen_at = NOW()
        "#,
    )
    .bind(member_id) // $1
    .bind(device_id) // $2
    .bind(room_id) // $3
    .execute(&mut **tx)
    .await
    .map_err(|e| RcError::Database(format!("Failed to upsert session: {}", e)))?;

    Ok(())
}

/// Map a database row to a ParticipantRow struct.
fn map_row_to_participant(row: sqlx::postgres::PgRow) -> ParticipantRow {
    ParticipantRow {
        participant_id: row.get("participant_id"),
        room_id: row.get("room_id"),
        member_id: row.get("member_id"),
        device_id: row.get("device_id"),
        is_active: row.get("is_active"),
        room_role: row.get("room_role"),
        last_seen_at: row.get("last_seen_at"),
        joined_at: row.get("joined_at"),
    }
}
