//! Room lifecycle handlers.
//!
//! Covers room creation, listing, fetching and join code regeneration.
//! Membership operations (join/leave/heartbeat) live in
//! [`crate::handlers::membership`].

use crate::errors::RcError;
use crate::middleware::identity::AuthenticatedMember;
use crate::models::RoomRow;
use crate::repositories::RoomsRepository;
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::api::{CreateRoomRequest, CreateRoomResponse, RegenerateJoinCodeResponse, RoomInfo, RoomsResponse};
use common::events::{ChangeOp, ChangeTable};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Characters used for join codes. Base62 minus the easily confused
/// 0/O and 1/I/l.
const JOIN_CODE_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Maximum retries when a generated join code collides with an existing one.
const MAX_CODE_COLLISION_RETRIES: usize = 3;

// ============================================================================
// Handler: POST /api/v1/rooms
// ============================================================================

/// Create a room.
///
/// The caller becomes the room creator. Private rooms get a generated
/// join code, returned once in the response; it is never included in any
/// room projection afterwards.
///
/// # Response
///
/// Returns 201 Created with the room and, for private rooms, its join code.
#[instrument(
    skip_all,
    name = "rc.room.create",
    fields(
        method = "POST",
        endpoint = "/api/v1/rooms",
        status = tracing::field::Empty
    )
)]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AuthenticatedMember>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, RcError> {
    // Parse the body manually so malformed JSON maps to 400 rather than
    // axum's default 422
    let request: CreateRoomRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!("Invalid create room request body: {}", e);
        RcError::Validation(format!("Invalid request body: {}", e))
    })?;

    request
        .validate()
        .map_err(|e| RcError::Validation(e.to_string()))?;

    let is_private = request.is_private.unwrap_or(false);
    let display_name = request.display_name.trim();
    let theme = request.theme.trim();
    let description = request.description.as_deref();

    let room = if is_private {
        create_private_room_with_code(
            &state,
            member.member_id,
            display_name,
            theme,
            description,
        )
        .await?
    } else {
        RoomsRepository::create_room(
            &state.pool,
            member.member_id,
            display_name,
            theme,
            description,
            false,
            None,
        )
        .await?
    };

    // The join code only ever travels in this response, addressed to the
    // creator. The fanout carries the public projection.
    let join_code = room.join_code.clone();
    let room_info = RoomInfo::from(room);

    state
        .fanout
        .publish_row(
            ChangeTable::Rooms,
            ChangeOp::Insert,
            Some(room_info.room_id),
            &room_info,
        )
        .await;

    tracing::info!(
        room_id = %room_info.room_id,
        created_by = %member.member_id,
        is_private = is_private,
        "Room created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room: room_info,
            join_code,
        }),
    ))
}

// ============================================================================
// Handler: GET /api/v1/rooms
// ============================================================================

/// List all rooms, most recently created first.
#[instrument(
    skip_all,
    name = "rc.room.list",
    fields(
        method = "GET",
        endpoint = "/api/v1/rooms",
        status = tracing::field::Empty
    )
)]
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, RcError> {
    let rooms = RoomsRepository::list_rooms(&state.pool).await?;

    Ok(Json(RoomsResponse {
        rooms: rooms.into_iter().map(RoomInfo::from).collect(),
    }))
}

// ============================================================================
// Handler: GET /api/v1/rooms/{room_id}
// ============================================================================

/// Fetch one room.
///
/// # Response
///
/// Returns 200 OK with the room's public projection, or 404 if no room
/// with that id exists.
#[instrument(
    skip_all,
    name = "rc.room.get",
    fields(
        method = "GET",
        endpoint = "/api/v1/rooms/{room_id}",
        status = tracing::field::Empty
    )
)]
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, RcError> {
    let room = RoomsRepository::get_room(&state.pool, room_id)
        .await?
        .ok_or_else(|| RcError::NotFound("Room not found".to_string()))?;

    Ok(Json(RoomInfo::from(room)))
}

// ============================================================================
// Handler: POST /api/v1/rooms/{room_id}/join-code
// ============================================================================

/// Regenerate a private room's join code.
///
/// Only the room creator may rotate the code. The previous code stops
/// working the moment the new one is installed; members already in the
/// room are unaffected.
///
/// # Response
///
/// Returns 200 OK with the new code, 403 for non-creators, 409 for
/// public rooms.
#[instrument(
    skip_all,
    name = "rc.room.regenerate_join_code",
    fields(
        method = "POST",
        endpoint = "/api/v1/rooms/{room_id}/join-code",
        status = tracing::field::Empty
    )
)]
pub async fn regenerate_join_code(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AuthenticatedMember>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, RcError> {
    let room = RoomsRepository::get_room(&state.pool, room_id)
        .await?
        .ok_or_else(|| RcError::NotFound("Room not found".to_string()))?;

    if room.created_by_member_id != member.member_id {
        return Err(RcError::Unauthorized(
            "Only the room creator may regenerate the join code".to_string(),
        ));
    }

    if !room.is_private {
        return Err(RcError::Conflict(
            "Room is public and has no join code".to_string(),
        ));
    }

    for attempt in 0..MAX_CODE_COLLISION_RETRIES {
        let join_code = generate_join_code(state.config.join_code_length)?;

        match RoomsRepository::update_join_code(&state.pool, room_id, &join_code).await {
            Ok(updated) => {
                state
                    .fanout
                    .publish_row(
                        ChangeTable::Rooms,
                        ChangeOp::Update,
                        Some(room_id),
                        &RoomInfo::from(updated),
                    )
                    .await;

                tracing::info!(room_id = %room_id, "Join code regenerated");

                return Ok(Json(RegenerateJoinCodeResponse {
                    success: true,
                    join_code,
                }));
            }
            Err(RcError::Database(ref e))
                if e.contains("unique constraint") || e.contains("duplicate key") =>
            {
                tracing::debug!("Join code collision on attempt {}, retrying", attempt + 1);
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::error!(
        "Failed to generate a unique join code after {} attempts",
        MAX_CODE_COLLISION_RETRIES
    );
    Err(RcError::Internal)
}

// ============================================================================
// Helper functions
// ============================================================================

/// Create a private room, retrying on the rare join code collision.
async fn create_private_room_with_code(
    state: &AppState,
    created_by_member_id: Uuid,
    display_name: &str,
    theme: &str,
    description: Option<&str>,
) -> Result<RoomRow, RcError> {
    for attempt in 0..MAX_CODE_COLLISION_RETRIES {
        let join_code = generate_join_code(state.config.join_code_length)?;

        match RoomsRepository::create_room(
            &state.pool,
            created_by_member_id,
            display_name,
            theme,
            description,
            true,
            Some(&join_code),
        )
        .await
        {
            Ok(room) => return Ok(room),
            Err(RcError::Database(ref e))
                if e.contains("unique constraint") || e.contains("duplicate key") =>
            {
                tracing::debug!("Join code collision on attempt {}, retrying", attempt + 1);
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::error!(
        "Failed to generate a unique join code after {} attempts",
        MAX_CODE_COLLISION_RETRIES
    );
    Err(RcError::Internal)
}

/// Generate a random join code of `length` characters.
///
/// Uses ring's SystemRandom for cryptographically secure randomness. One
/// random byte per character, mapped onto an alphabet without look-alike
/// characters so codes survive being read aloud.
fn generate_join_code(length: usize) -> Result<String, RcError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];
    rng.fill(&mut bytes).map_err(|_| {
        tracing::error!("Failed to generate random bytes for join code");
        RcError::Internal
    })?;

    let mut code = Vec::with_capacity(length);
    for byte in bytes {
        let idx = usize::from(byte) % JOIN_CODE_CHARS.len();
        let ch = JOIN_CODE_CHARS.get(idx).copied().ok_or(RcError::Internal)?;
        code.push(ch);
    }

    String::from_utf8(code).map_err(|_| RcError::Internal)
}
