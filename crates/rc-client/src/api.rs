//! Coordinator API client.
//!
//! [`CoordinatorApi`] abstracts the coordinator's HTTP and WebSocket
//! surface behind one trait so the synchronizer and presence driver can
//! be tested against [`mock::MockCoordinatorApi`]. The real
//! [`HttpCoordinatorApi`] talks to `rc-service` with reqwest and opens
//! change-notification streams with tokio-tungstenite.
//!
//! Errors carry the service's structured error code, so callers can
//! distinguish retryable transport failures from hard rejections like
//! `ROOM_FULL` or the `REJOIN_REQUIRED` liveness signal.

use common::api::{
    HeartbeatResponse, JoinRoomRequest, JoinRoomResponse, LeaveRoomResponse, MessageInfo,
    MessagesResponse, ParticipantInfo, ParticipantsResponse, RoomInfo, SessionInfo,
    SessionsResponse, SuggestionInfo, SuggestionsResponse, DISPLAY_NAME_HEADER, MEMBER_ID_HEADER,
};
use common::events::{ChangeTable, StreamFrame};
use futures_util::StreamExt;
use reqwest::{Client, Method};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default timeout for coordinator requests in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 5;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Errors
// ============================================================================

/// Coordinator API client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The coordinator answered with a non-success status.
    #[error("Request failed with status {status}: {code}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Structured error code from the response body.
        code: String,
        /// Human-readable message from the response body.
        message: String,
    },

    /// The change-notification stream could not be opened.
    #[error("Subscription failed: {0}")]
    Subscription(String),
}

impl ApiError {
    /// Whether retrying the same call later could succeed.
    ///
    /// Transport failures and server-side errors are transient; 4xx
    /// rejections are not, the request itself is wrong.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(_) | ApiError::Subscription(_) => true,
            ApiError::Rejected { status, .. } => *status >= 500,
        }
    }

    /// Whether the coordinator signalled that the caller's membership
    /// lapsed and liveness can only resume through a rejoin.
    pub fn is_rejoin_required(&self) -> bool {
        matches!(self, ApiError::Rejected { code, .. } if code == "REJOIN_REQUIRED")
    }

    /// The structured error code, when the coordinator supplied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Error body shape the coordinator uses for all non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

// ============================================================================
// Subscription stream
// ============================================================================

/// One open change-notification stream.
///
/// Yields [`StreamFrame`]s until the server closes the stream or the
/// connection drops. Dropping the subscription closes it.
pub struct Subscription {
    inner: SubscriptionInner,
}

enum SubscriptionInner {
    WebSocket(Box<WsStream>),
    Channel(mpsc::UnboundedReceiver<StreamFrame>),
}

impl Subscription {
    fn websocket(stream: WsStream) -> Self {
        Self {
            inner: SubscriptionInner::WebSocket(Box::new(stream)),
        }
    }

    /// Build a subscription fed from a channel instead of a socket.
    ///
    /// Used by [`mock::MockCoordinatorApi`]; production subscriptions
    /// always wrap a WebSocket.
    pub fn from_channel(receiver: mpsc::UnboundedReceiver<StreamFrame>) -> Self {
        Self {
            inner: SubscriptionInner::Channel(receiver),
        }
    }

    /// Receive the next frame, or `None` once the stream is closed.
    ///
    /// Unparseable text frames are skipped rather than ending the
    /// stream, so a newer server can add frame kinds without breaking
    /// older clients.
    pub async fn next_frame(&mut self) -> Option<StreamFrame> {
        match &mut self.inner {
            SubscriptionInner::Channel(receiver) => receiver.recv().await,
            SubscriptionInner::WebSocket(stream) => loop {
                let message = match stream.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        warn!(target: "rc.client.api", error = %e, "Subscription stream failed");
                        return None;
                    }
                    None => return None,
                };

                match message {
                    Message::Text(text) => match serde_json::from_str(&text) {
                        Ok(frame) => return Some(frame),
                        Err(e) => {
                            debug!(target: "rc.client.api", error = %e, "Skipping unparseable frame");
                        }
                    },
                    Message::Close(_) => return None,
                    // Ping/pong handled by the library, binary unused
                    _ => {}
                }
            },
        }
    }
}

// ============================================================================
// Trait
// ============================================================================

/// The coordinator operations the client library depends on.
#[async_trait::async_trait]
pub trait CoordinatorApi: Send + Sync {
    /// The member identity every call is made as.
    fn member_id(&self) -> Uuid;

    /// Fetch one room.
    async fn get_room(&self, room_id: Uuid) -> Result<RoomInfo, ApiError>;

    /// Fetch a room's participant rows, active first.
    async fn list_participants(&self, room_id: Uuid) -> Result<Vec<ParticipantInfo>, ApiError>;

    /// Fetch a room's recent message tail.
    async fn list_messages(&self, room_id: Uuid) -> Result<Vec<MessageInfo>, ApiError>;

    /// Fetch a room's recent suggestion tail.
    async fn list_suggestions(&self, room_id: Uuid) -> Result<Vec<SuggestionInfo>, ApiError>;

    /// Fetch the caller's active sessions across devices.
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError>;

    /// Join a room, or reactivate a lapsed membership.
    async fn join_room(
        &self,
        room_id: Uuid,
        request: &JoinRoomRequest,
    ) -> Result<JoinRoomResponse, ApiError>;

    /// Leave a room.
    async fn leave_room(&self, room_id: Uuid) -> Result<LeaveRoomResponse, ApiError>;

    /// Refresh the caller's liveness in a room.
    async fn heartbeat(&self, room_id: Uuid) -> Result<HeartbeatResponse, ApiError>;

    /// Open a change-notification stream for one table, optionally
    /// filtered to one room.
    async fn subscribe(
        &self,
        table: ChangeTable,
        room_id: Option<Uuid>,
    ) -> Result<Subscription, ApiError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// HTTP client for the room coordinator.
pub struct HttpCoordinatorApi {
    /// Base URL of the coordinator, without a trailing slash.
    base_url: String,

    /// Member identity sent with every request.
    member_id: Uuid,

    /// Optional display name forwarded to the coordinator.
    display_name: Option<String>,

    /// HTTP client with configured timeouts.
    client: Client,
}

impl HttpCoordinatorApi {
    /// Create a new coordinator client for one member identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, member_id: Uuid) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            member_id,
            display_name: None,
            client,
        })
    }

    /// Forward a display name with every request.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Build a request with the identity headers attached.
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(MEMBER_ID_HEADER, self.member_id.to_string());
        if let Some(display_name) = &self.display_name {
            builder = builder.header(DISPLAY_NAME_HEADER, display_name);
        }
        builder
    }

    /// Parse a response, mapping non-success statuses to
    /// [`ApiError::Rejected`] with the coordinator's error code.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => (parsed.error.code, parsed.error.message),
                Err(_) => ("UNKNOWN".to_string(), body),
            };
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                code,
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl CoordinatorApi for HttpCoordinatorApi {
    fn member_id(&self) -> Uuid {
        self.member_id
    }

    async fn get_room(&self, room_id: Uuid) -> Result<RoomInfo, ApiError> {
        let response = self
            .request(Method::GET, &format!("/api/v1/rooms/{}", room_id))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn list_participants(&self, room_id: Uuid) -> Result<Vec<ParticipantInfo>, ApiError> {
        let response = self
            .request(
                Method::GET,
                &format!("/api/v1/rooms/{}/participants", room_id),
            )
            .send()
            .await?;
        let parsed: ParticipantsResponse = Self::handle_response(response).await?;
        Ok(parsed.participants)
    }

    async fn list_messages(&self, room_id: Uuid) -> Result<Vec<MessageInfo>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/api/v1/rooms/{}/messages", room_id))
            .send()
            .await?;
        let parsed: MessagesResponse = Self::handle_response(response).await?;
        Ok(parsed.messages)
    }

    async fn list_suggestions(&self, room_id: Uuid) -> Result<Vec<SuggestionInfo>, ApiError> {
        let response = self
            .request(
                Method::GET,
                &format!("/api/v1/rooms/{}/suggestions", room_id),
            )
            .send()
            .await?;
        let parsed: SuggestionsResponse = Self::handle_response(response).await?;
        Ok(parsed.suggestions)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        let response = self
            .request(Method::GET, "/api/v1/sessions")
            .send()
            .await?;
        let parsed: SessionsResponse = Self::handle_response(response).await?;
        Ok(parsed.sessions)
    }

    async fn join_room(
        &self,
        room_id: Uuid,
        request: &JoinRoomRequest,
    ) -> Result<JoinRoomResponse, ApiError> {
        let response = self
            .request(Method::POST, &format!("/api/v1/rooms/{}/join", room_id))
            .json(request)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn leave_room(&self, room_id: Uuid) -> Result<LeaveRoomResponse, ApiError> {
        let response = self
            .request(Method::POST, &format!("/api/v1/rooms/{}/leave", room_id))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn heartbeat(&self, room_id: Uuid) -> Result<HeartbeatResponse, ApiError> {
        let response = self
            .request(
                Method::POST,
                &format!("/api/v1/rooms/{}/heartbeat", room_id),
            )
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn subscribe(
        &self,
        table: ChangeTable,
        room_id: Option<Uuid>,
    ) -> Result<Subscription, ApiError> {
        // http -> ws, https -> wss
        let ws_base = self.base_url.replacen("http", "ws", 1);
        let mut url = format!("{}/api/v1/subscribe?table={}", ws_base, table.as_str());
        if let Some(room_id) = room_id {
            url.push_str(&format!("&room_id={}", room_id));
        }

        let mut request = url
            .into_client_request()
            .map_err(|e| ApiError::Subscription(e.to_string()))?;
        let member_header = HeaderValue::from_str(&self.member_id.to_string())
            .map_err(|e| ApiError::Subscription(e.to_string()))?;
        request.headers_mut().insert(MEMBER_ID_HEADER, member_header);

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| ApiError::Subscription(e.to_string()))?;

        debug!(
            target: "rc.client.api",
            table = table.as_str(),
            room_id = ?room_id,
            "Subscription opened"
        );

        Ok(Subscription::websocket(stream))
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Mock coordinator module for testing.
pub mod mock {
    use super::*;
    use chrono::Utc;
    use common::types::RoomRole;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Scripted failures and canned state for one mock instance.
    struct MockState {
        room: RoomInfo,
        participants: Vec<ParticipantInfo>,
        messages: Vec<MessageInfo>,
        suggestions: Vec<SuggestionInfo>,
        sessions: Vec<SessionInfo>,
        room_failures: VecDeque<ApiError>,
        join_failures: VecDeque<ApiError>,
        leave_failures: VecDeque<ApiError>,
        heartbeat_failures: VecDeque<Option<ApiError>>,
        subscribe_failures: VecDeque<ApiError>,
    }

    /// Mock coordinator for unit testing the synchronizer and presence
    /// driver.
    ///
    /// Fetches return canned state, mutations succeed unless a failure
    /// is queued, and [`publish`](MockCoordinatorApi::publish) feeds
    /// frames to open subscriptions the way the service's fanout would.
    pub struct MockCoordinatorApi {
        member_id: Uuid,
        state: Mutex<MockState>,
        subscribers: Mutex<Vec<(ChangeTable, mpsc::UnboundedSender<StreamFrame>)>>,
        room_fetches: AtomicUsize,
        participant_fetches: AtomicUsize,
        message_fetches: AtomicUsize,
        suggestion_fetches: AtomicUsize,
        session_fetches: AtomicUsize,
        join_calls: AtomicUsize,
        leave_calls: AtomicUsize,
        heartbeat_calls: AtomicUsize,
    }

    impl MockCoordinatorApi {
        /// Create a mock serving the given room to the given member.
        pub fn new(member_id: Uuid, room: RoomInfo) -> Self {
            Self {
                member_id,
                state: Mutex::new(MockState {
                    room,
                    participants: Vec::new(),
                    messages: Vec::new(),
                    suggestions: Vec::new(),
                    sessions: Vec::new(),
                    room_failures: VecDeque::new(),
                    join_failures: VecDeque::new(),
                    leave_failures: VecDeque::new(),
                    heartbeat_failures: VecDeque::new(),
                    subscribe_failures: VecDeque::new(),
                }),
                subscribers: Mutex::new(Vec::new()),
                room_fetches: AtomicUsize::new(0),
                participant_fetches: AtomicUsize::new(0),
                message_fetches: AtomicUsize::new(0),
                suggestion_fetches: AtomicUsize::new(0),
                session_fetches: AtomicUsize::new(0),
                join_calls: AtomicUsize::new(0),
                leave_calls: AtomicUsize::new(0),
                heartbeat_calls: AtomicUsize::new(0),
            }
        }

        fn lock_state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Seed the participant listing.
        #[must_use]
        pub fn with_participants(self, participants: Vec<ParticipantInfo>) -> Self {
            self.lock_state().participants = participants;
            self
        }

        /// Seed the message tail.
        #[must_use]
        pub fn with_messages(self, messages: Vec<MessageInfo>) -> Self {
            self.lock_state().messages = messages;
            self
        }

        /// Seed the suggestion tail.
        #[must_use]
        pub fn with_suggestions(self, suggestions: Vec<SuggestionInfo>) -> Self {
            self.lock_state().suggestions = suggestions;
            self
        }

        /// Seed the session registry.
        #[must_use]
        pub fn with_sessions(self, sessions: Vec<SessionInfo>) -> Self {
            self.lock_state().sessions = sessions;
            self
        }

        /// Replace the served room mid-test.
        pub fn set_room(&self, room: RoomInfo) {
            self.lock_state().room = room;
        }

        /// Replace the participant listing mid-test.
        pub fn set_participants(&self, participants: Vec<ParticipantInfo>) {
            self.lock_state().participants = participants;
        }

        /// Replace the session registry mid-test.
        pub fn set_sessions(&self, sessions: Vec<SessionInfo>) {
            self.lock_state().sessions = sessions;
        }

        /// Replace the message tail mid-test.
        pub fn set_messages(&self, messages: Vec<MessageInfo>) {
            self.lock_state().messages = messages;
        }

        /// Fail the next `count` room fetches with the given status and
        /// code.
        pub fn fail_room_fetches(&self, count: u32, status: u16, code: &str) {
            let mut state = self.lock_state();
            for _ in 0..count {
                state.room_failures.push_back(ApiError::Rejected {
                    status,
                    code: code.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
        }

        /// Fail the next join call with the given error.
        pub fn push_join_error(&self, error: ApiError) {
            self.lock_state().join_failures.push_back(error);
        }

        /// Fail the next leave call with the given error.
        pub fn push_leave_error(&self, error: ApiError) {
            self.lock_state().leave_failures.push_back(error);
        }

        /// Script the next heartbeat outcomes; `None` entries succeed.
        pub fn script_heartbeats(&self, outcomes: Vec<Option<ApiError>>) {
            self.lock_state().heartbeat_failures.extend(outcomes);
        }

        /// Fail the next subscribe call with the given error.
        pub fn push_subscribe_error(&self, error: ApiError) {
            self.lock_state().subscribe_failures.push_back(error);
        }

        /// Feed a frame to every open subscription of `table`.
        pub fn publish(&self, table: ChangeTable, frame: StreamFrame) {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers
                .retain(|(sub_table, sender)| {
                    *sub_table != table || sender.send(frame.clone()).is_ok()
                });
        }

        /// Number of room fetches made.
        pub fn room_fetch_count(&self) -> usize {
            self.room_fetches.load(Ordering::SeqCst)
        }

        /// Number of participant listings made.
        pub fn participant_fetch_count(&self) -> usize {
            self.participant_fetches.load(Ordering::SeqCst)
        }

        /// Number of message tail fetches made.
        pub fn message_fetch_count(&self) -> usize {
            self.message_fetches.load(Ordering::SeqCst)
        }

        /// Number of suggestion tail fetches made.
        pub fn suggestion_fetch_count(&self) -> usize {
            self.suggestion_fetches.load(Ordering::SeqCst)
        }

        /// Number of session listings made.
        pub fn session_fetch_count(&self) -> usize {
            self.session_fetches.load(Ordering::SeqCst)
        }

        /// Number of join calls made.
        pub fn join_count(&self) -> usize {
            self.join_calls.load(Ordering::SeqCst)
        }

        /// Number of leave calls made.
        pub fn leave_count(&self) -> usize {
            self.leave_calls.load(Ordering::SeqCst)
        }

        /// Number of heartbeat calls made.
        pub fn heartbeat_count(&self) -> usize {
            self.heartbeat_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl CoordinatorApi for MockCoordinatorApi {
        fn member_id(&self) -> Uuid {
            self.member_id
        }

        async fn get_room(&self, _room_id: Uuid) -> Result<RoomInfo, ApiError> {
            self.room_fetches.fetch_add(1, Ordering::SeqCst);
            let mut state = self.lock_state();
            if let Some(error) = state.room_failures.pop_front() {
                return Err(error);
            }
            Ok(state.room.clone())
        }

        async fn list_participants(
            &self,
            _room_id: Uuid,
        ) -> Result<Vec<ParticipantInfo>, ApiError> {
            self.participant_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.lock_state().participants.clone())
        }

        async fn list_messages(&self, _room_id: Uuid) -> Result<Vec<MessageInfo>, ApiError> {
            self.message_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.lock_state().messages.clone())
        }

        async fn list_suggestions(&self, _room_id: Uuid) -> Result<Vec<SuggestionInfo>, ApiError> {
            self.suggestion_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.lock_state().suggestions.clone())
        }

        async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
            self.session_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.lock_state().sessions.clone())
        }

        async fn join_room(
            &self,
            room_id: Uuid,
            request: &JoinRoomRequest,
        ) -> Result<JoinRoomResponse, ApiError> {
            self.join_calls.fetch_add(1, Ordering::SeqCst);
            let mut state = self.lock_state();
            if let Some(error) = state.join_failures.pop_front() {
                return Err(error);
            }

            let now = Utc::now();
            Ok(JoinRoomResponse {
                success: true,
                already_member: false,
                room: state.room.clone(),
                participant: ParticipantInfo {
                    participant_id: Uuid::new_v4(),
                    room_id,
                    member_id: self.member_id,
                    device_id: request.device_id.clone(),
                    is_active: true,
                    room_role: RoomRole::Member,
                    last_seen_at: now,
                    joined_at: now,
                },
            })
        }

        async fn leave_room(&self, _room_id: Uuid) -> Result<LeaveRoomResponse, ApiError> {
            self.leave_calls.fetch_add(1, Ordering::SeqCst);
            let mut state = self.lock_state();
            if let Some(error) = state.leave_failures.pop_front() {
                return Err(error);
            }
            Ok(LeaveRoomResponse {
                success: true,
                room: state.room.clone(),
            })
        }

        async fn heartbeat(&self, _room_id: Uuid) -> Result<HeartbeatResponse, ApiError> {
            self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
            let mut state = self.lock_state();
            if let Some(Some(error)) = state.heartbeat_failures.pop_front() {
                return Err(error);
            }
            Ok(HeartbeatResponse {
                success: true,
                last_seen_at: Utc::now(),
            })
        }

        async fn subscribe(
            &self,
            table: ChangeTable,
            _room_id: Option<Uuid>,
        ) -> Result<Subscription, ApiError> {
            if let Some(error) = self.lock_state().subscribe_failures.pop_front() {
                return Err(error);
            }
            let (sender, receiver) = mpsc::unbounded_channel();
            self.subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((table, sender));
            Ok(Subscription::from_channel(receiver))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::types::RoomStatus;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn room_info(room_id: Uuid) -> RoomInfo {
        RoomInfo {
            room_id,
            display_name: "Weekly sync".to_string(),
            theme: "retro".to_string(),
            description: None,
            created_by_member_id: Uuid::new_v4(),
            occupancy: 2,
            status: RoomStatus::Active,
            is_private: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_get_room_sends_identity_and_parses_body() {
        let member_id = Uuid::new_v4();
        let room_id = Uuid::new_v4();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/api/v1/rooms/{}", room_id)))
            .and(header(MEMBER_ID_HEADER, member_id.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(room_info(room_id)))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpCoordinatorApi::new(server.uri(), member_id).unwrap();
        let room = api.get_room(room_id).await.unwrap();

        assert_eq!(room.room_id, room_id);
        assert_eq!(room.display_name, "Weekly sync");
    }

    #[tokio::test]
    async fn test_display_name_header_is_forwarded() {
        let member_id = Uuid::new_v4();
        let room_id = Uuid::new_v4();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/api/v1/rooms/{}", room_id)))
            .and(header(DISPLAY_NAME_HEADER, "Alex"))
            .respond_with(ResponseTemplate::new(200).set_body_json(room_info(room_id)))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpCoordinatorApi::new(server.uri(), member_id)
            .unwrap()
            .with_display_name("Alex");

        api.get_room(room_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_body_maps_to_rejected() {
        let room_id = Uuid::new_v4();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/api/v1/rooms/{}", room_id)))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": "NOT_FOUND", "message": "Room not found"}
            })))
            .mount(&server)
            .await;

        let api = HttpCoordinatorApi::new(server.uri(), Uuid::new_v4()).unwrap();
        let err = api.get_room(room_id).await.unwrap_err();

        assert!(matches!(
            &err,
            ApiError::Rejected { status: 404, code, .. } if code == "NOT_FOUND"
        ));
        assert!(!err.is_transient());
        assert!(!err.is_rejoin_required());
    }

    #[tokio::test]
    async fn test_unparseable_error_body_keeps_the_status() {
        let room_id = Uuid::new_v4();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/api/v1/rooms/{}", room_id)))
            .respond_with(ResponseTemplate::new(500).set_body_string("gateway exploded"))
            .mount(&server)
            .await;

        let api = HttpCoordinatorApi::new(server.uri(), Uuid::new_v4()).unwrap();
        let err = api.get_room(room_id).await.unwrap_err();

        assert!(matches!(
            &err,
            ApiError::Rejected { status: 500, code, .. } if code == "UNKNOWN"
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_heartbeat_rejection_signals_rejoin() {
        let room_id = Uuid::new_v4();
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/api/v1/rooms/{}/heartbeat", room_id)))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": {"code": "REJOIN_REQUIRED", "message": "Membership lapsed"}
            })))
            .mount(&server)
            .await;

        let api = HttpCoordinatorApi::new(server.uri(), Uuid::new_v4()).unwrap();
        let err = api.heartbeat(room_id).await.unwrap_err();

        assert!(err.is_rejoin_required());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_join_posts_the_request_body() {
        let member_id = Uuid::new_v4();
        let room_id = Uuid::new_v4();
        let server = MockServer::start().await;

        let room = room_info(room_id);
        let participant_body = serde_json::json!({
            "participant_id": Uuid::new_v4(),
            "room_id": room_id,
            "member_id": member_id,
            "device_id": "web-1",
            "is_active": true,
            "room_role": "member",
            "last_seen_at": Utc::now(),
            "joined_at": Utc::now(),
        });

        Mock::given(method("POST"))
            .and(path(format!("/api/v1/rooms/{}/join", room_id)))
            .and(wiremock::matchers::body_partial_json(
                serde_json::json!({"device_id": "web-1"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "already_member": false,
                "room": room,
                "participant": participant_body,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpCoordinatorApi::new(server.uri(), member_id).unwrap();
        let request = JoinRoomRequest {
            device_id: "web-1".to_string(),
            join_code: None,
        };
        let response = api.join_room(room_id, &request).await.unwrap();

        assert!(response.success);
        assert_eq!(response.participant.device_id, "web-1");
    }

    #[tokio::test]
    async fn test_mock_routes_frames_by_table() {
        use common::events::{ChangeEvent, ChangeOp};

        let mock = mock::MockCoordinatorApi::new(Uuid::new_v4(), room_info(Uuid::new_v4()));

        let mut messages = mock.subscribe(ChangeTable::Messages, None).await.unwrap();
        let mut rooms = mock.subscribe(ChangeTable::Rooms, None).await.unwrap();

        mock.publish(
            ChangeTable::Messages,
            StreamFrame::Change(ChangeEvent {
                table: ChangeTable::Messages,
                operation: ChangeOp::Insert,
                new_value: serde_json::json!({"content": "hi"}),
            }),
        );

        let frame = messages.next_frame().await.unwrap();
        assert!(matches!(frame, StreamFrame::Change(_)));

        // The rooms stream saw nothing
        mock.publish(ChangeTable::Rooms, StreamFrame::Resync { skipped: 1 });
        let frame = rooms.next_frame().await.unwrap();
        assert!(matches!(frame, StreamFrame::Resync { skipped: 1 }));
    }

    #[tokio::test]
    async fn test_mock_scripts_failures_in_order() {
        let mock = mock::MockCoordinatorApi::new(Uuid::new_v4(), room_info(Uuid::new_v4()));
        mock.fail_room_fetches(2, 503, "DATABASE_ERROR");

        assert!(mock.get_room(Uuid::new_v4()).await.is_err());
        assert!(mock.get_room(Uuid::new_v4()).await.is_err());
        assert!(mock.get_room(Uuid::new_v4()).await.is_ok());
        assert_eq!(mock.room_fetch_count(), 3);
    }
}
