//! Identity middleware for authenticated routes.
//!
//! The coordinator does not authenticate members itself; a fronting auth
//! layer terminates the session and injects `x-member-id` (and optionally
//! `x-display-name`) headers. This middleware validates those headers and
//! exposes an [`AuthenticatedMember`] to downstream handlers via request
//! extensions. Requests without a valid member id are rejected with 401.

use crate::errors::RcError;
use axum::{extract::Request, middleware::Next, response::IntoResponse};
use common::api::{DISPLAY_NAME_HEADER, MEMBER_ID_HEADER};
use tracing::instrument;
use uuid::Uuid;

/// The member a request is acting as.
#[derive(Debug, Clone)]
pub struct AuthenticatedMember {
    /// Member id from the `x-member-id` header.
    pub member_id: Uuid,

    /// Display name from the `x-display-name` header, if supplied.
    pub display_name: Option<String>,
}

/// Identity middleware for member-facing endpoints.
///
/// # Response
///
/// - Returns 401 Unauthorized if the member id header is missing or malformed
/// - Continues to the next handler with [`AuthenticatedMember`] in
///   extensions otherwise
#[instrument(skip_all, name = "rc.middleware.identity")]
pub async fn require_member(mut req: Request, next: Next) -> Result<impl IntoResponse, RcError> {
    let member_id = req
        .headers()
        .get(MEMBER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "rc.middleware.identity", "Missing member id header");
            RcError::Unauthenticated("Missing member id header".to_string())
        })?;

    let member_id = Uuid::parse_str(member_id).map_err(|_| {
        tracing::debug!(target: "rc.middleware.identity", "Malformed member id header");
        RcError::Unauthenticated("Malformed member id header".to_string())
    })?;

    let display_name = req
        .headers()
        .get(DISPLAY_NAME_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    req.extensions_mut().insert(AuthenticatedMember {
        member_id,
        display_name,
    });

    Ok(next.run(req).await)
}
