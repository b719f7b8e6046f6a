//! Metrics definitions for the room coordinator.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rc_` prefix for the room coordinator
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: ~15 values (parameterized paths)
//! - `status`: 3 values (success, error, timeout)
//! - `operation`: bounded by code (join_room, leave_room, sweep_stale, etc.)
//! - `table`: 4 values (rooms, participants, messages, suggestions)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded. Configures histogram
/// buckets around expected latencies:
/// - HTTP request p95 < 200ms
/// - DB query p99 < 50ms
/// - Suggestion generation calls may take seconds
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // HTTP request buckets aligned with 200ms p95 target
        .set_buckets_for_metric(
            Matcher::Prefix("rc_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // DB query buckets aligned with 50ms p99 target
        .set_buckets_for_metric(
            Matcher::Prefix("rc_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        // Sweep pass buckets (touches many rows, coarser)
        .set_buckets_for_metric(
            Matcher::Prefix("rc_sweep".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500],
        )
        .map_err(|e| format!("Failed to set sweep buckets: {e}"))?
        // Suggestion service call buckets - generation may take seconds
        .set_buckets_for_metric(
            Matcher::Prefix("rc_suggestion_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set suggestion request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `rc_http_requests_total`, `rc_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// This captures ALL HTTP responses including framework-level errors like:
/// - 415 Unsupported Media Type (wrong Content-Type)
/// - 400 Bad Request (JSON parse errors)
/// - 404 Not Found
/// - 405 Method Not Allowed
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    // Normalize endpoint to prevent cardinality explosion
    let normalized_endpoint = normalize_endpoint(endpoint);

    // Determine status category for simplified querying
    let status = categorize_status_code(status_code);

    histogram!("rc_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("rc_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Room sub-resources that appear as the segment after the room id.
const ROOM_ACTIONS: [&str; 8] = [
    "join",
    "leave",
    "heartbeat",
    "join-code",
    "participants",
    "permissions",
    "messages",
    "suggestions",
];

/// Normalize endpoint path to prevent label cardinality explosion
///
/// Replaces dynamic segments (room and member UUIDs) with placeholders.
fn normalize_endpoint(path: &str) -> String {
    // Known static paths
    match path {
        "/" => "/".to_string(),
        "/health" => "/health".to_string(),
        "/ready" => "/ready".to_string(),
        "/metrics" => "/metrics".to_string(),
        "/api/v1/rooms" => "/api/v1/rooms".to_string(),
        "/api/v1/sessions" => "/api/v1/sessions".to_string(),
        "/api/v1/subscribe" => "/api/v1/subscribe".to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

/// Normalize paths with dynamic segments
fn normalize_dynamic_endpoint(path: &str) -> String {
    // Room endpoints: /api/v1/rooms/{room_id}[/{action}]
    if path.starts_with("/api/v1/rooms/") {
        let parts: Vec<&str> = path.split('/').collect();

        // /api/v1/rooms/{room_id} → parts.len() == 5
        if parts.len() == 5 {
            return "/api/v1/rooms/{room_id}".to_string();
        }

        // /api/v1/rooms/{room_id}/{action} → parts.len() == 6
        if parts.len() == 6 {
            if let Some(action) = parts.get(5) {
                if ROOM_ACTIONS.contains(action) {
                    return format!("/api/v1/rooms/{{room_id}}/{action}");
                }
            }
        }
    }

    // Role endpoints: /api/v1/roles/{member_id}
    if path.starts_with("/api/v1/roles/") {
        let parts: Vec<&str> = path.split('/').collect();

        if parts.len() == 5 {
            return "/api/v1/roles/{member_id}".to_string();
        }
    }

    // Unknown paths normalized to "/other" to bound cardinality
    "/other".to_string()
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution
///
/// Metric: `rc_db_query_duration_seconds`, `rc_db_queries_total`
/// Labels: `operation`, `status`
///
/// Operations: join_room, leave_room, heartbeat, sweep_stale, create_room,
///             regenerate_join_code, list_participants, etc.
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("rc_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("rc_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Presence Sweep Metrics
// ============================================================================

/// Record one presence sweep pass.
///
/// Metric: `rc_sweep_duration_seconds`, `rc_sweep_passes_total`,
/// `rc_sweep_evictions_total`
/// Labels: `status` on the pass counter
///
/// `evicted` counts participants demoted to inactive by this pass.
pub fn record_sweep_pass(status: &str, evicted: u64, duration: Duration) {
    histogram!("rc_sweep_duration_seconds").record(duration.as_secs_f64());

    counter!("rc_sweep_passes_total",
        "status" => status.to_string()
    )
    .increment(1);

    if evicted > 0 {
        counter!("rc_sweep_evictions_total").increment(evicted);
    }
}

// ============================================================================
// Fanout Metrics
// ============================================================================

/// Record a published change event.
///
/// Metric: `rc_fanout_events_total`
/// Labels: `table`
pub fn record_fanout_event(table: &str) {
    counter!("rc_fanout_events_total",
        "table" => table.to_string()
    )
    .increment(1);
}

/// Record a subscriber falling behind and being told to resync.
///
/// Metric: `rc_fanout_lagged_total`
/// Labels: `table`
pub fn record_fanout_lag(table: &str) {
    counter!("rc_fanout_lagged_total",
        "table" => table.to_string()
    )
    .increment(1);
}

/// Track the number of open subscription streams.
///
/// Metric: `rc_subscriptions_active`
pub fn subscription_opened() {
    gauge!("rc_subscriptions_active").increment(1.0);
}

/// See [`subscription_opened`].
pub fn subscription_closed() {
    gauge!("rc_subscriptions_active").decrement(1.0);
}

// ============================================================================
// Suggestion Client Metrics
// ============================================================================

/// Record suggestion service call duration and outcome.
///
/// Metric: `rc_suggestion_request_duration_seconds`, `rc_suggestion_requests_total`
/// Labels: `status`
///
/// Status: "success", "error"
pub fn record_suggestion_request(status: &str, duration: Duration) {
    histogram!("rc_suggestion_request_duration_seconds").record(duration.as_secs_f64());

    counter!("rc_suggestion_requests_total",
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record error by category.
///
/// Metric: `rc_errors_total`
/// Labels: `operation`, `error_type`, `status_code`
pub fn record_error(operation: &str, error_type: &str, status_code: u16) {
    counter!("rc_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests execute the metric recording functions to ensure code coverage.
    // The metrics crate will record to a global no-op recorder if none is installed,
    // which is sufficient for coverage testing. We don't need to verify the actual
    // metric values - that would require installing a test recorder from metrics-util.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(5));
        record_http_request("GET", "/api/v1/rooms", 200, Duration::from_millis(50));
        record_http_request(
            "POST",
            "/api/v1/rooms/550e8400-e29b-41d4-a716-446655440000/join",
            200,
            Duration::from_millis(30),
        );

        // Error cases
        record_http_request("POST", "/api/v1/rooms/abc/join", 409, Duration::from_millis(10));
        record_http_request("GET", "/api/v1/rooms/missing", 404, Duration::from_millis(5));

        // Timeout
        record_http_request("GET", "/api/v1/rooms", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        // Success codes
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(201), "success");
        assert_eq!(categorize_status_code(204), "success");

        // Timeout codes
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");

        // Error codes
        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(404), "error");
        assert_eq!(categorize_status_code(409), "error");
        assert_eq!(categorize_status_code(500), "error");
    }

    #[test]
    fn test_normalize_endpoint_known_paths() {
        assert_eq!(normalize_endpoint("/"), "/");
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/api/v1/rooms"), "/api/v1/rooms");
        assert_eq!(normalize_endpoint("/api/v1/sessions"), "/api/v1/sessions");
        assert_eq!(normalize_endpoint("/api/v1/subscribe"), "/api/v1/subscribe");
    }

    #[test]
    fn test_normalize_endpoint_room_paths() {
        assert_eq!(
            normalize_endpoint("/api/v1/rooms/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/rooms/{room_id}"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/rooms/550e8400-e29b-41d4-a716-446655440000/join"),
            "/api/v1/rooms/{room_id}/join"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/rooms/550e8400-e29b-41d4-a716-446655440000/heartbeat"),
            "/api/v1/rooms/{room_id}/heartbeat"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/rooms/550e8400-e29b-41d4-a716-446655440000/join-code"),
            "/api/v1/rooms/{room_id}/join-code"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/rooms/550e8400-e29b-41d4-a716-446655440000/messages"),
            "/api/v1/rooms/{room_id}/messages"
        );
    }

    #[test]
    fn test_normalize_endpoint_role_paths() {
        assert_eq!(
            normalize_endpoint("/api/v1/roles/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/roles/{member_id}"
        );
    }

    #[test]
    fn test_normalize_endpoint_unknown_paths() {
        assert_eq!(normalize_endpoint("/unknown"), "/other");
        assert_eq!(normalize_endpoint("/api/v2/something"), "/other");
        assert_eq!(
            normalize_endpoint("/api/v1/rooms/abc/unknown-action"),
            "/other"
        );
    }

    #[test]
    fn test_record_db_query() {
        record_db_query("join_room", "success", Duration::from_millis(5));
        record_db_query("leave_room", "success", Duration::from_millis(3));
        record_db_query("heartbeat", "success", Duration::from_millis(2));
        record_db_query("sweep_stale", "success", Duration::from_millis(12));
        record_db_query("join_room", "error", Duration::from_millis(50));
    }

    #[test]
    fn test_record_sweep_pass() {
        record_sweep_pass("success", 0, Duration::from_millis(8));
        record_sweep_pass("success", 3, Duration::from_millis(20));
        record_sweep_pass("error", 0, Duration::from_millis(50));
    }

    #[test]
    fn test_record_fanout_metrics() {
        record_fanout_event("rooms");
        record_fanout_event("participants");
        record_fanout_lag("messages");
        subscription_opened();
        subscription_closed();
    }

    #[test]
    fn test_record_suggestion_request() {
        record_suggestion_request("success", Duration::from_millis(800));
        record_suggestion_request("error", Duration::from_millis(200));
    }

    #[test]
    fn test_record_error() {
        record_error("join_room", "room_full", 409);
        record_error("heartbeat", "rejoin_required", 409);
        record_error("regenerate_join_code", "unauthorized", 403);
    }
}
