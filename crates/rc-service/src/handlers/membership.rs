//! Room membership handlers.
//!
//! Join, leave, heartbeat and the participant listing. All membership
//! mutations run through [`crate::repositories::ParticipantsRepository`],
//! which serializes them against the room row so capacity can never be
//! oversubscribed, and every committed change is published to the fanout.

use crate::errors::RcError;
use crate::middleware::identity::AuthenticatedMember;
use crate::repositories::{ParticipantsRepository, RoomsRepository, SessionsRepository};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::api::{
    HeartbeatResponse, JoinRoomRequest, JoinRoomResponse, LeaveRoomResponse, ParticipantInfo,
    ParticipantsResponse, RoomInfo,
};
use common::events::{ChangeOp, ChangeTable};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

// ============================================================================
// Handler: POST /api/v1/rooms/{room_id}/join
// ============================================================================

/// Join a room, or reactivate an existing membership.
///
/// Capacity and the join code (for private rooms) are checked atomically
/// inside the repository transaction; a rejoin by an existing member
/// skips both. The device in the request becomes the member's current
/// device for this room.
///
/// # Response
///
/// Returns 200 OK with the post-join room and participant snapshots,
/// 404 for unknown rooms, 409 when the room is full or archived, 403
/// for a wrong or missing join code.
#[instrument(
    skip_all,
    name = "rc.room.join",
    fields(
        method = "POST",
        endpoint = "/api/v1/rooms/{room_id}/join",
        status = tracing::field::Empty
    )
)]
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AuthenticatedMember>,
    Path(room_id): Path<Uuid>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, RcError> {
    let request: JoinRoomRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!("Invalid join request body: {}", e);
        RcError::Validation(format!("Invalid request body: {}", e))
    })?;

    request
        .validate()
        .map_err(|e| RcError::Validation(e.to_string()))?;

    let outcome = ParticipantsRepository::join(
        &state.pool,
        room_id,
        member.member_id,
        request.device_id.trim(),
        request.join_code.as_deref(),
        state.config.room_capacity,
    )
    .await?;

    let already_member = outcome.already_member;
    let room_info = RoomInfo::from(outcome.room);
    let participant_info = ParticipantInfo::from(outcome.participant);

    // A reactivated membership is an update of an existing row; a first
    // join inserts one. The occupancy change also feeds the rooms stream.
    let participant_op = if already_member {
        ChangeOp::Update
    } else {
        ChangeOp::Insert
    };

    state
        .fanout
        .publish_row(
            ChangeTable::Participants,
            participant_op,
            Some(room_id),
            &participant_info,
        )
        .await;
    state
        .fanout
        .publish_row(ChangeTable::Rooms, ChangeOp::Update, Some(room_id), &room_info)
        .await;

    tracing::info!(
        room_id = %room_id,
        member_id = %member.member_id,
        already_member = already_member,
        occupancy = room_info.occupancy,
        "Member joined room"
    );

    Ok(Json(JoinRoomResponse {
        success: true,
        already_member,
        room: room_info,
        participant: participant_info,
    }))
}

// ============================================================================
// Handler: POST /api/v1/rooms/{room_id}/leave
// ============================================================================

/// Leave a room.
///
/// Demotes the caller's active membership; the participant row survives
/// so a later rejoin reactivates it rather than creating a duplicate.
///
/// # Response
///
/// Returns 200 OK with the post-leave room snapshot, 404 when the room
/// does not exist or the caller holds no active membership.
#[instrument(
    skip_all,
    name = "rc.room.leave",
    fields(
        method = "POST",
        endpoint = "/api/v1/rooms/{room_id}/leave",
        status = tracing::field::Empty
    )
)]
pub async fn leave_room(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AuthenticatedMember>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, RcError> {
    let outcome = ParticipantsRepository::leave(&state.pool, room_id, member.member_id).await?;

    let room_info = RoomInfo::from(outcome.room);
    let participant_info = ParticipantInfo::from(outcome.participant);

    state
        .fanout
        .publish_row(
            ChangeTable::Participants,
            ChangeOp::Update,
            Some(room_id),
            &participant_info,
        )
        .await;
    state
        .fanout
        .publish_row(ChangeTable::Rooms, ChangeOp::Update, Some(room_id), &room_info)
        .await;

    tracing::info!(
        room_id = %room_id,
        member_id = %member.member_id,
        occupancy = room_info.occupancy,
        "Member left room"
    );

    Ok(Json(LeaveRoomResponse {
        success: true,
        room: room_info,
    }))
}

// ============================================================================
// Handler: POST /api/v1/rooms/{room_id}/heartbeat
// ============================================================================

/// Record a liveness heartbeat for the caller's membership.
///
/// Heartbeats mutate only `last_seen_at` and are not fanned out.
///
/// # Response
///
/// Returns 200 OK with the recorded server time, or 409 REJOIN_REQUIRED
/// when the caller holds no active membership (evicted by the sweep, or
/// never joined) and must join again.
#[instrument(
    skip_all,
    name = "rc.room.heartbeat",
    fields(
        method = "POST",
        endpoint = "/api/v1/rooms/{room_id}/heartbeat",
        status = tracing::field::Empty
    )
)]
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AuthenticatedMember>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, RcError> {
    let last_seen_at = ParticipantsRepository::heartbeat(&state.pool, room_id, member.member_id)
        .await?
        .ok_or(RcError::RejoinRequired)?;

    // Session registry refresh is best-effort; the membership heartbeat
    // already succeeded.
    if let Err(e) = SessionsRepository::touch_for_room(&state.pool, member.member_id, room_id).await
    {
        tracing::warn!(
            member_id = %member.member_id,
            error = %e,
            "Failed to refresh session registry"
        );
    }

    Ok(Json(HeartbeatResponse {
        success: true,
        last_seen_at,
    }))
}

// ============================================================================
// Handler: GET /api/v1/rooms/{room_id}/participants
// ============================================================================

/// List a room's participants, active rows first.
///
/// Inactive rows are included so clients can render who has been in the
/// room; `is_active` distinguishes present members.
#[instrument(
    skip_all,
    name = "rc.room.participants",
    fields(
        method = "GET",
        endpoint = "/api/v1/rooms/{room_id}/participants",
        status = tracing::field::Empty
    )
)]
pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, RcError> {
    // 404 for an unknown room rather than an empty list
    let room = RoomsRepository::get_room(&state.pool, room_id)
        .await?
        .ok_or_else(|| RcError::NotFound("Room not found".to_string()))?;

    let participants = ParticipantsRepository::list_participants(&state.pool, room.room_id).await?;

    Ok(Json(ParticipantsResponse {
        participants: participants.into_iter().map(ParticipantInfo::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    // Membership handlers are exercised end-to-end in
    // tests/membership_tests.rs via the rc-test-utils server harness; the
    // capacity and join code transaction semantics are covered by the
    // repository tests.
}
