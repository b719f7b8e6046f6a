//! Room Coordinator
//!
//! Entry point for the Atrium room coordinator. Handles room membership,
//! presence tracking, and change notification fanout.

use rc_service::config::RcConfig;
use rc_service::fanout::ChangeFanout;
use rc_service::observability::metrics;
use rc_service::routes::{self, AppState};
use rc_service::services::{HttpSuggestionClient, SuggestionClientTrait};
use rc_service::tasks::{start_presence_sweep, PresenceSweepConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rc_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Coordinator");

    // Load configuration
    let config = RcConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        listen_addr = %config.listen_addr,
        room_capacity = config.room_capacity,
        liveness_timeout_seconds = config.liveness_timeout_seconds,
        sweep_interval_seconds = config.sweep_interval_seconds,
        suggestions_enabled = config.suggestion_service_url.is_some(),
        "Configuration loaded successfully"
    );

    // Initialize database connection pool with query timeout
    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(&config.database_url, 5);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    // Initialize metrics recorder
    let metrics_handle = metrics::init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Suggestion generation is optional; without a service URL the
    // feature is disabled and message posting works unchanged.
    let suggestion_client: Option<Arc<dyn SuggestionClientTrait>> =
        match config.suggestion_service_url.clone() {
            Some(url) => {
                info!(suggestion_service_url = %url, "Suggestion generation enabled");
                Some(Arc::new(HttpSuggestionClient::new(
                    url,
                    config.suggestion_api_token.clone(),
                )?))
            }
            None => {
                info!("No suggestion service configured, suggestion generation disabled");
                None
            }
        };

    let fanout = ChangeFanout::new(config.fanout_buffer);

    // Parse bind address before moving config
    let listen_addr = config.listen_addr.clone();
    let sweep_config = PresenceSweepConfig::from(&config);

    // Create application state
    let state = Arc::new(AppState {
        pool: db_pool.clone(),
        config,
        fanout: fanout.clone(),
        suggestion_client,
    });

    // Start the presence sweep task
    let cancel_token = CancellationToken::new();
    let sweep_handle = tokio::spawn(start_presence_sweep(
        db_pool,
        fanout,
        sweep_config,
        cancel_token.clone(),
    ));

    // Build application routes
    let app = routes::build_routes(state, metrics_handle);

    // Parse bind address
    let addr: SocketAddr = listen_addr.parse().map_err(|e| {
        error!("Invalid listen address: {}", e);
        e
    })?;

    info!("Room Coordinator listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop the background sweep once the server has drained
    cancel_token.cancel();
    if let Err(e) = sweep_handle.await {
        error!("Presence sweep task did not shut down cleanly: {}", e);
    }

    info!("Room Coordinator shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    // Graceful shutdown drain period
    let drain_secs: u64 = std::env::var("RC_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (RC_DRAIN_SECONDS=0)");
    }
}

/// Adds statement_timeout to the database URL.
/// This ensures queries don't hang indefinitely.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
