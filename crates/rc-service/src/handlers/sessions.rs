//! Session registry handler.
//!
//! The registry tracks one row per (member, device) pair, refreshed by
//! joins and heartbeats. Members can only list their own sessions; the
//! primary consumer is the client-side multi-device advisory.

use crate::errors::RcError;
use crate::middleware::identity::AuthenticatedMember;
use crate::repositories::SessionsRepository;
use crate::routes::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::api::{SessionInfo, SessionsResponse};
use std::sync::Arc;
use tracing::instrument;

// ============================================================================
// Handler: GET /api/v1/sessions
// ============================================================================

/// List the caller's sessions, most recently seen first.
#[instrument(
    skip_all,
    name = "rc.sessions.list",
    fields(
        method = "GET",
        endpoint = "/api/v1/sessions",
        status = tracing::field::Empty
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AuthenticatedMember>,
) -> Result<impl IntoResponse, RcError> {
    let sessions = SessionsRepository::list_for_member(&state.pool, member.member_id).await?;

    Ok(Json(SessionsResponse {
        sessions: sessions.into_iter().map(SessionInfo::from).collect(),
    }))
}
