//! Room coordinator error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic to avoid
//! leaking internal details. Actual errors are logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Room coordinator error type.
///
/// Maps to appropriate HTTP status codes:
/// - Database, Internal: 500 Internal Server Error
/// - Validation: 400 Bad Request
/// - Unauthenticated: 401 Unauthorized
/// - Unauthorized: 403 Forbidden
/// - NotFound, NotAMember: 404 Not Found
/// - InactiveRoom, CapacityExceeded, RejoinRequired, Conflict: 409 Conflict
#[derive(Debug, Error)]
pub enum RcError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not an active member of this room")]
    NotAMember,

    #[error("Room is not active")]
    InactiveRoom,

    #[error("Room is at capacity")]
    CapacityExceeded,

    #[error("Membership lapsed; rejoin required")]
    RejoinRequired,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,
}

impl RcError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RcError::Validation(_) => 400,
            RcError::Unauthenticated(_) => 401,
            RcError::Unauthorized(_) => 403,
            RcError::NotFound(_) | RcError::NotAMember => 404,
            RcError::InactiveRoom
            | RcError::CapacityExceeded
            | RcError::RejoinRequired
            | RcError::Conflict(_) => 409,
            RcError::Database(_) | RcError::Internal => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RcError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RcError::Validation(reason) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", reason.clone())
            }
            RcError::Unauthenticated(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", reason.clone())
            }
            RcError::Unauthorized(reason) => {
                (StatusCode::FORBIDDEN, "UNAUTHORIZED", reason.clone())
            }
            RcError::NotFound(resource) => (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone()),
            RcError::NotAMember => (
                StatusCode::NOT_FOUND,
                "NOT_A_MEMBER",
                "Not an active member of this room".to_string(),
            ),
            RcError::InactiveRoom => (
                StatusCode::CONFLICT,
                "ROOM_INACTIVE",
                "Room is not accepting joins".to_string(),
            ),
            RcError::CapacityExceeded => (
                StatusCode::CONFLICT,
                "ROOM_FULL",
                "Room is at capacity".to_string(),
            ),
            RcError::RejoinRequired => (
                StatusCode::CONFLICT,
                "REJOIN_REQUIRED",
                "Membership is no longer active; rejoin the room".to_string(),
            ),
            RcError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            RcError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "rc.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            RcError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"atrium-api\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Convert sqlx errors to RcError
impl From<sqlx::Error> for RcError {
    fn from(err: sqlx::Error) -> Self {
        RcError::Database(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    // Helper function to read the response body as JSON
    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            format!("{}", RcError::Validation("name too short".to_string())),
            "Validation error: name too short"
        );
        assert_eq!(
            format!("{}", RcError::NotFound("room".to_string())),
            "Not found: room"
        );
        assert_eq!(
            format!("{}", RcError::NotAMember),
            "Not an active member of this room"
        );
        assert_eq!(format!("{}", RcError::InactiveRoom), "Room is not active");
        assert_eq!(
            format!("{}", RcError::CapacityExceeded),
            "Room is at capacity"
        );
        assert_eq!(
            format!("{}", RcError::RejoinRequired),
            "Membership lapsed; rejoin required"
        );
        assert_eq!(
            format!("{}", RcError::Database("connection failed".to_string())),
            "Database error: connection failed"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RcError::Validation("test".to_string()).status_code(), 400);
        assert_eq!(
            RcError::Unauthenticated("test".to_string()).status_code(),
            401
        );
        assert_eq!(RcError::Unauthorized("test".to_string()).status_code(), 403);
        assert_eq!(RcError::NotFound("test".to_string()).status_code(), 404);
        assert_eq!(RcError::NotAMember.status_code(), 404);
        assert_eq!(RcError::InactiveRoom.status_code(), 409);
        assert_eq!(RcError::CapacityExceeded.status_code(), 409);
        assert_eq!(RcError::RejoinRequired.status_code(), 409);
        assert_eq!(RcError::Conflict("test".to_string()).status_code(), 409);
        assert_eq!(RcError::Database("test".to_string()).status_code(), 500);
        assert_eq!(RcError::Internal.status_code(), 500);
    }

    #[tokio::test]
    async fn test_into_response_database_error_is_generic() {
        let error = RcError::Database("connection refused at 10.0.0.5".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "DATABASE_ERROR");
        assert_eq!(
            body_json["error"]["message"],
            "An internal database error occurred"
        );
        // The connection details never reach the client
        assert!(!body_json.to_string().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_into_response_validation() {
        let error = RcError::Validation("Device id is required".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body_json["error"]["message"], "Device id is required");
    }

    #[tokio::test]
    async fn test_into_response_unauthenticated_sets_www_authenticate() {
        let error = RcError::Unauthenticated("Missing member id header".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let www_auth = response.headers().get("WWW-Authenticate");
        assert!(www_auth.is_some());

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_into_response_not_a_member() {
        let response = RcError::NotAMember.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "NOT_A_MEMBER");
    }

    #[tokio::test]
    async fn test_into_response_capacity_exceeded() {
        let response = RcError::CapacityExceeded.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "ROOM_FULL");
        assert_eq!(body_json["error"]["message"], "Room is at capacity");
    }

    #[tokio::test]
    async fn test_into_response_rejoin_required() {
        let response = RcError::RejoinRequired.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "REJOIN_REQUIRED");
    }

    #[tokio::test]
    async fn test_into_response_inactive_room() {
        let response = RcError::InactiveRoom.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "ROOM_INACTIVE");
    }

    #[test]
    fn test_from_sqlx_error() {
        let error = RcError::from(sqlx::Error::RowNotFound);
        assert!(matches!(error, RcError::Database(_)));
    }
}
