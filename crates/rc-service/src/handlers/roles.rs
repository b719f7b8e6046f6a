//! Role and permission handlers.
//!
//! Global role assignments are service-wide standing; room permissions
//! are derived per room from the caller's resolved room role. Resolution
//! and the role-to-permission mapping live in
//! [`crate::services::roles`].

use crate::errors::RcError;
use crate::middleware::identity::AuthenticatedMember;
use crate::repositories::{GlobalRolesRepository, RoomsRepository};
use crate::routes::AppState;
use crate::services::{derive_permissions, RolesService};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::api::{GlobalRolesResponse, PermissionsResponse, UpdateGlobalRolesRequest};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

// ============================================================================
// Handler: GET /api/v1/roles/{member_id}
// ============================================================================

/// Fetch a member's elevated global roles.
///
/// An empty list means baseline participant standing. Any authenticated
/// member may look up any other member's roles.
#[instrument(
    skip_all,
    name = "rc.roles.get",
    fields(
        method = "GET",
        endpoint = "/api/v1/roles/{member_id}",
        status = tracing::field::Empty
    )
)]
pub async fn get_global_roles(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<impl IntoResponse, RcError> {
    let roles = GlobalRolesRepository::get_roles(&state.pool, member_id).await?;

    Ok(Json(GlobalRolesResponse { member_id, roles }))
}

// ============================================================================
// Handler: PUT /api/v1/roles/{member_id}
// ============================================================================

/// Replace a member's set of elevated global roles.
///
/// The listed roles replace whatever the member held; an empty list
/// revokes everything. Only global organizers may change assignments.
///
/// # Response
///
/// Returns 200 OK with the member's roles as stored, 403 when the
/// caller is not a global organizer.
#[instrument(
    skip_all,
    name = "rc.roles.update",
    fields(
        method = "PUT",
        endpoint = "/api/v1/roles/{member_id}",
        status = tracing::field::Empty
    )
)]
pub async fn update_global_roles(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AuthenticatedMember>,
    Path(member_id): Path<Uuid>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, RcError> {
    let request: UpdateGlobalRolesRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!("Invalid role update request body: {}", e);
        RcError::Validation(format!("Invalid request body: {}", e))
    })?;

    request
        .validate()
        .map_err(|e| RcError::Validation(e.to_string()))?;

    RolesService::require_global_organizer(&state.pool, member.member_id).await?;

    GlobalRolesRepository::replace_roles(&state.pool, member_id, &request.roles, member.member_id)
        .await?;

    let roles = GlobalRolesRepository::get_roles(&state.pool, member_id).await?;

    tracing::info!(
        target_member_id = %member_id,
        granted_by = %member.member_id,
        roles = ?roles,
        "Global roles replaced"
    );

    Ok(Json(GlobalRolesResponse { member_id, roles }))
}

// ============================================================================
// Handler: GET /api/v1/rooms/{room_id}/permissions
// ============================================================================

/// Resolve the caller's permissions in one room.
///
/// An active participant row decides the role; without one, elevated
/// global standing maps to the matching observer role and everyone else
/// is a baseline non-member. The derived flags tell clients what to
/// render before any mutation round-trips.
#[instrument(
    skip_all,
    name = "rc.room.permissions",
    fields(
        method = "GET",
        endpoint = "/api/v1/rooms/{room_id}/permissions",
        status = tracing::field::Empty
    )
)]
pub async fn get_room_permissions(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AuthenticatedMember>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, RcError> {
    // Resolution against a room that does not exist is a 404, not a
    // baseline answer
    let room = RoomsRepository::get_room(&state.pool, room_id)
        .await?
        .ok_or_else(|| RcError::NotFound("Room not found".to_string()))?;

    let resolution =
        RolesService::resolve_room_role(&state.pool, room.room_id, member.member_id).await?;
    let permissions = derive_permissions(resolution.room_role);

    Ok(Json(PermissionsResponse {
        room_id: room.room_id,
        member_id: member.member_id,
        room_role: resolution.room_role,
        is_member: resolution.is_member,
        can_edit: permissions.can_edit,
        can_comment: permissions.can_comment,
        can_kick: permissions.can_kick,
        is_read_only: permissions.is_read_only,
    }))
}

#[cfg(test)]
mod tests {
    // Role resolution and the permission table are unit tested in
    // services/roles.rs; the HTTP surface including the organizer gate
    // is covered in tests/roles_tests.rs.
}
