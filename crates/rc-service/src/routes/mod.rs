//! HTTP routes for the room coordinator.
//!
//! Defines the Axum router and application state.

use crate::config::RcConfig;
use crate::fanout::ChangeFanout;
use crate::handlers;
use crate::middleware::http_metrics::http_metrics_middleware;
use crate::middleware::identity::require_member;
use crate::services::SuggestionClientTrait;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: RcConfig,

    /// Broadcast registry for change notifications.
    pub fanout: ChangeFanout,

    /// Client for the suggestion-generation service. `None` disables
    /// suggestion generation entirely.
    pub suggestion_client: Option<Arc<dyn SuggestionClientTrait>>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public, unversioned
/// - `/ready` - Readiness probe (checks the database) - public, unversioned
/// - `/metrics` - Prometheus metrics endpoint - public, unversioned
/// - `/api/v1/*` - Member-facing API, gated on the identity headers
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    // Public routes (no member identity required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Member-facing routes (identity headers required)
    let member_routes = Router::new()
        .route(
            "/api/v1/rooms",
            post(handlers::create_room).get(handlers::list_rooms),
        )
        .route("/api/v1/rooms/:room_id", get(handlers::get_room))
        .route("/api/v1/rooms/:room_id/join", post(handlers::join_room))
        .route("/api/v1/rooms/:room_id/leave", post(handlers::leave_room))
        .route(
            "/api/v1/rooms/:room_id/heartbeat",
            post(handlers::heartbeat),
        )
        .route(
            "/api/v1/rooms/:room_id/join-code",
            post(handlers::regenerate_join_code),
        )
        .route(
            "/api/v1/rooms/:room_id/participants",
            get(handlers::list_participants),
        )
        .route(
            "/api/v1/rooms/:room_id/permissions",
            get(handlers::get_room_permissions),
        )
        .route(
            "/api/v1/rooms/:room_id/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        .route(
            "/api/v1/rooms/:room_id/suggestions",
            get(handlers::list_suggestions),
        )
        .route(
            "/api/v1/roles/:member_id",
            get(handlers::get_global_roles).put(handlers::update_global_roles),
        )
        .route("/api/v1/sessions", get(handlers::list_sessions))
        .route("/api/v1/subscribe", get(handlers::subscribe))
        .route_layer(middleware::from_fn(require_member))
        .with_state(state);

    // Merge routes and apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(member_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        // HTTP metrics layer (outermost) - captures framework-level
        // errors like 400, 404, 405 too
        .layer(middleware::from_fn(http_metrics_middleware))
}
