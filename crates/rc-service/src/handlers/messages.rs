//! Chat message and suggestion handlers.
//!
//! Messages are append-only room chat. Every fifth human message kicks
//! off suggestion generation against the configured suggestion service;
//! the trigger runs detached from the posting request and all of its
//! failures are logged and swallowed, so members never wait on or see
//! suggestion errors.

use crate::errors::RcError;
use crate::middleware::identity::AuthenticatedMember;
use crate::models::RoomRow;
use crate::repositories::{MessagesRepository, RoomsRepository, SuggestionsRepository};
use crate::routes::AppState;
use crate::services::{derive_permissions, RolesService, SuggestionPrompt};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::api::{
    MessageInfo, MessagesResponse, SendMessageRequest, SuggestionInfo, SuggestionsResponse,
};
use common::events::{ChangeOp, ChangeTable};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// How many trailing messages a listing returns.
const DEFAULT_MESSAGE_TAIL: i64 = 50;

/// A suggestion is generated after every this-many human messages.
const SUGGESTION_TRIGGER_EVERY: i64 = 5;

/// How many trailing messages are sent as context for generation.
const SUGGESTION_CONTEXT_MESSAGES: i64 = 10;

// ============================================================================
// Handler: GET /api/v1/rooms/{room_id}/messages
// ============================================================================

/// List a room's recent messages in creation order.
#[instrument(
    skip_all,
    name = "rc.room.messages",
    fields(
        method = "GET",
        endpoint = "/api/v1/rooms/{room_id}/messages",
        status = tracing::field::Empty
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, RcError> {
    let room = RoomsRepository::get_room(&state.pool, room_id)
        .await?
        .ok_or_else(|| RcError::NotFound("Room not found".to_string()))?;

    let messages =
        MessagesRepository::list_messages(&state.pool, room.room_id, DEFAULT_MESSAGE_TAIL).await?;

    Ok(Json(MessagesResponse {
        messages: messages.into_iter().map(MessageInfo::from).collect(),
    }))
}

// ============================================================================
// Handler: POST /api/v1/rooms/{room_id}/messages
// ============================================================================

/// Post a chat message to a room.
///
/// Posting requires an active membership whose room role allows
/// commenting; organizers observing without a membership and read-only
/// judges are rejected.
///
/// # Response
///
/// Returns 201 Created with the stored message, 404 when the room does
/// not exist or the caller is not an active member, 403 when the
/// caller's role does not allow posting.
#[instrument(
    skip_all,
    name = "rc.room.send_message",
    fields(
        method = "POST",
        endpoint = "/api/v1/rooms/{room_id}/messages",
        status = tracing::field::Empty
    )
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AuthenticatedMember>,
    Path(room_id): Path<Uuid>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, RcError> {
    let request: SendMessageRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!("Invalid message request body: {}", e);
        RcError::Validation(format!("Invalid request body: {}", e))
    })?;

    request
        .validate()
        .map_err(|e| RcError::Validation(e.to_string()))?;

    let room = RoomsRepository::get_room(&state.pool, room_id)
        .await?
        .ok_or_else(|| RcError::NotFound("Room not found".to_string()))?;

    let resolution =
        RolesService::resolve_room_role(&state.pool, room.room_id, member.member_id).await?;

    if !resolution.is_member {
        return Err(RcError::NotAMember);
    }

    let permissions = derive_permissions(resolution.room_role);
    if !permissions.can_comment {
        return Err(RcError::Unauthorized(
            "Room role does not allow posting".to_string(),
        ));
    }

    let message = MessagesRepository::insert_message(
        &state.pool,
        room.room_id,
        Some(member.member_id),
        request.content.trim(),
        false,
    )
    .await?;

    let message_info = MessageInfo::from(message);

    state
        .fanout
        .publish_row(
            ChangeTable::Messages,
            ChangeOp::Insert,
            Some(room_id),
            &message_info,
        )
        .await;

    // The trigger decision and the generation round-trip both happen off
    // the request path.
    if state.suggestion_client.is_some() {
        let task_state = state.clone();
        tokio::spawn(generate_suggestion_if_due(task_state, room));
    }

    tracing::info!(
        room_id = %room_id,
        member_id = %member.member_id,
        message_id = %message_info.message_id,
        "Message posted"
    );

    Ok((StatusCode::CREATED, Json(message_info)))
}

// ============================================================================
// Handler: GET /api/v1/rooms/{room_id}/suggestions
// ============================================================================

/// List a room's recent generated suggestions in creation order.
#[instrument(
    skip_all,
    name = "rc.room.suggestions",
    fields(
        method = "GET",
        endpoint = "/api/v1/rooms/{room_id}/suggestions",
        status = tracing::field::Empty
    )
)]
pub async fn list_suggestions(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, RcError> {
    let room = RoomsRepository::get_room(&state.pool, room_id)
        .await?
        .ok_or_else(|| RcError::NotFound("Room not found".to_string()))?;

    let suggestions =
        SuggestionsRepository::list_suggestions(&state.pool, room.room_id, DEFAULT_MESSAGE_TAIL)
            .await?;

    Ok(Json(SuggestionsResponse {
        suggestions: suggestions.into_iter().map(SuggestionInfo::from).collect(),
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Generate a suggestion for the room if one is due.
///
/// Due means the human message count is a positive multiple of
/// [`SUGGESTION_TRIGGER_EVERY`]. The count is read after the triggering
/// message committed, so concurrent posts may shift which message trips
/// the trigger; at most one suggestion is generated per call.
async fn generate_suggestion_if_due(state: Arc<AppState>, room: RoomRow) {
    let Some(client) = state.suggestion_client.clone() else {
        return;
    };

    let human_count = match MessagesRepository::count_human_messages(&state.pool, room.room_id)
        .await
    {
        Ok(count) => count,
        Err(e) => {
            tracing::debug!(
                room_id = %room.room_id,
                error = %e,
                "Skipping suggestion trigger: message count failed"
            );
            return;
        }
    };

    if human_count == 0 || human_count % SUGGESTION_TRIGGER_EVERY != 0 {
        return;
    }

    let recent = match MessagesRepository::list_messages(
        &state.pool,
        room.room_id,
        SUGGESTION_CONTEXT_MESSAGES,
    )
    .await
    {
        Ok(messages) => messages,
        Err(e) => {
            tracing::debug!(
                room_id = %room.room_id,
                error = %e,
                "Skipping suggestion trigger: context fetch failed"
            );
            return;
        }
    };

    let prompt = SuggestionPrompt {
        theme: room.theme.clone(),
        recent_messages: recent.into_iter().map(|m| m.content).collect(),
    };

    let generated = match client.generate(&prompt).await {
        Ok(generated) => generated,
        Err(e) => {
            tracing::debug!(
                room_id = %room.room_id,
                error = %e,
                "Suggestion generation failed"
            );
            return;
        }
    };

    let suggestion = match SuggestionsRepository::insert_suggestion(
        &state.pool,
        room.room_id,
        &generated.suggestion,
    )
    .await
    {
        Ok(suggestion) => suggestion,
        Err(e) => {
            tracing::warn!(
                room_id = %room.room_id,
                error = %e,
                "Failed to store generated suggestion"
            );
            return;
        }
    };

    state
        .fanout
        .publish_row(
            ChangeTable::Suggestions,
            ChangeOp::Insert,
            Some(room.room_id),
            &SuggestionInfo::from(suggestion),
        )
        .await;

    tracing::info!(room_id = %room.room_id, "Suggestion generated");
}
