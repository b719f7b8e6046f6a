//! Test server harness for E2E testing
//!
//! Provides `TestRcServer` for spawning real RC server instances in tests.

use common::api::MEMBER_ID_HEADER;
use metrics_exporter_prometheus::PrometheusBuilder;
use rc_service::config::RcConfig;
use rc_service::fanout::ChangeFanout;
use rc_service::routes::{self, AppState};
use rc_service::services::{MockSuggestionClient, SuggestionClientTrait};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Test harness for spawning the room coordinator in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[sqlx::test(migrations = "../../migrations")]
/// async fn test_health_flow_e2e(pool: PgPool) -> Result<()> {
///     let server = TestRcServer::spawn(pool).await?;
///     let client = reqwest::Client::new();
///
///     let response = client
///         .get(format!("{}/health", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestRcServer {
    addr: SocketAddr,
    pool: PgPool,
    config: RcConfig,
    fanout: ChangeFanout,
    suggestion_mock: Arc<MockSuggestionClient>,
    _handle: JoinHandle<()>,
}

impl TestRcServer {
    /// Spawn a new test server instance with isolated database.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    /// - Replace the suggestion service with a mock
    ///
    /// The presence sweep task is NOT started; tests that exercise
    /// eviction call the sweep directly for deterministic timing.
    ///
    /// # Arguments
    /// * `pool` - Database connection pool (typically from `#[sqlx::test]`)
    ///
    /// # Returns
    /// * `Ok(TestRcServer)` - Running server instance
    /// * `Err(anyhow::Error)` - If server spawn fails
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        // Build configuration for test environment
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("RC_LISTEN_ADDR".to_string(), "127.0.0.1:0".to_string()),
            ("RC_ROOM_CAPACITY".to_string(), "5".to_string()),
            ("RC_LIVENESS_TIMEOUT_SECS".to_string(), "60".to_string()),
            ("RC_SWEEP_INTERVAL_SECS".to_string(), "30".to_string()),
        ]);

        let config = RcConfig::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        // The global Prometheus recorder can only be installed once per
        // process, so each test server builds a detached recorder whose
        // handle still renders for the /metrics endpoint.
        let recorder = PrometheusBuilder::new().build_recorder();
        let metrics_handle = recorder.handle();

        let fanout = ChangeFanout::new(config.fanout_buffer);

        // Create application state with a mock suggestion client
        let suggestion_mock = Arc::new(MockSuggestionClient::returning(
            "Ask everyone to share a highlight of the week",
        ));
        let suggestion_client: Arc<dyn SuggestionClientTrait> = suggestion_mock.clone();
        let state = Arc::new(AppState {
            pool: pool.clone(),
            config: config.clone(),
            fanout: fanout.clone(),
            suggestion_client: Some(suggestion_client),
        });

        // Build routes using rc-service's real route builder
        let app = routes::build_routes(state, metrics_handle);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            // Use into_make_service_with_connect_info to support SocketAddr extraction
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            fanout,
            suggestion_mock,
            _handle: handle,
        })
    }

    /// Get reference to the database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the WebSocket URL of the subscribe endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/v1/subscribe", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &RcConfig {
        &self.config
    }

    /// Get a handle on the server's change fanout.
    ///
    /// Shares the broadcast channels with the running server, so tests
    /// can observe published events or inject their own.
    pub fn fanout(&self) -> &ChangeFanout {
        &self.fanout
    }

    /// Get the mock suggestion client the server was spawned with.
    pub fn suggestion_mock(&self) -> &MockSuggestionClient {
        &self.suggestion_mock
    }

    /// Build a reqwest client that sends every request as `member_id`.
    ///
    /// Sets the `x-member-id` default header the identity middleware
    /// requires on all /api/v1 routes.
    pub fn client_for(&self, member_id: Uuid) -> reqwest::Client {
        let mut headers = reqwest::header::HeaderMap::new();
        let value = reqwest::header::HeaderValue::from_str(&member_id.to_string())
            .expect("UUID is always a valid header value");
        headers.insert(MEMBER_ID_HEADER, value);

        reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("reqwest client should build")
    }
}

impl Drop for TestRcServer {
    fn drop(&mut self) {
        // Explicitly abort the HTTP server task to ensure immediate cleanup
        // when the test completes. This stops the server gracefully.
        self._handle.abort();
    }
}
