//! Integration tests for the WebSocket change-notification stream.
//!
//! Connects real WebSocket clients to a live server from the
//! `TestRcServer` harness and asserts on the frames produced by HTTP
//! mutations: room-scoped filtering, the public projection of room
//! rows, handshake rejection before upgrade, and the resync frame a
//! lagged subscriber receives.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use common::api::MEMBER_ID_HEADER;
use common::events::{ChangeEvent, ChangeOp, ChangeTable};
use futures_util::StreamExt;
use rc_test_utils::TestRcServer;
use sqlx::PgPool;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a subscription as `member_id` with the given query string.
async fn subscribe(server: &TestRcServer, member_id: Uuid, query: &str) -> WsStream {
    let mut request = format!("{}?{}", server.ws_url(), query)
        .into_client_request()
        .expect("request should build");
    request.headers_mut().insert(
        MEMBER_ID_HEADER,
        HeaderValue::from_str(&member_id.to_string()).expect("member id is a valid header"),
    );

    let (stream, _response) = connect_async(request)
        .await
        .expect("handshake should succeed");
    stream
}

/// Read the next text frame as JSON, skipping control frames.
async fn next_frame(stream: &mut WsStream) -> serde_json::Value {
    loop {
        let message = timeout(Duration::from_secs(3), stream.next())
            .await
            .expect("frame should arrive within the deadline")
            .expect("stream should stay open")
            .expect("frame should read cleanly");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("frame should be JSON");
        }
    }
}

async fn create_room(server: &TestRcServer, creator: Uuid, private: bool) -> String {
    let body: serde_json::Value = server
        .client_for(creator)
        .post(format!("{}/api/v1/rooms", server.url()))
        .json(&serde_json::json!({
            "display_name": "Fanout room",
            "theme": "retro",
            "is_private": private,
        }))
        .send()
        .await
        .expect("create request should send")
        .json()
        .await
        .expect("create response should parse");
    body["room"]["room_id"].as_str().unwrap().to_string()
}

async fn join_room(server: &TestRcServer, room_id: &str, member_id: Uuid) {
    let resp = server
        .client_for(member_id)
        .post(format!("{}/api/v1/rooms/{}/join", server.url(), room_id))
        .json(&serde_json::json!({"device_id": "web-1"}))
        .send()
        .await
        .expect("join request should send");
    assert_eq!(resp.status(), 200, "join should succeed");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_join_and_leave_reach_room_subscribers(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let watcher = Uuid::new_v4();
    let member = Uuid::new_v4();
    let room_id = create_room(&server, watcher, false).await;

    let mut stream = subscribe(
        &server,
        watcher,
        &format!("table=participants&room_id={}", room_id),
    )
    .await;

    join_room(&server, &room_id, member).await;

    let frame = next_frame(&mut stream).await;
    assert_eq!(frame["type"], "change");
    assert_eq!(frame["table"], "participants");
    assert_eq!(frame["operation"], "insert");
    assert_eq!(frame["new_value"]["member_id"], member.to_string());
    assert_eq!(frame["new_value"]["is_active"], true);

    let resp = server
        .client_for(member)
        .post(format!("{}/api/v1/rooms/{}/leave", server.url(), room_id))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);

    let frame = next_frame(&mut stream).await;
    assert_eq!(frame["operation"], "update");
    assert_eq!(frame["new_value"]["member_id"], member.to_string());
    assert_eq!(frame["new_value"]["is_active"], false);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unfiltered_rooms_stream_sees_every_room(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let watcher = Uuid::new_v4();

    let mut stream = subscribe(&server, watcher, "table=rooms").await;

    let first = create_room(&server, Uuid::new_v4(), false).await;
    let second = create_room(&server, Uuid::new_v4(), false).await;

    let frame = next_frame(&mut stream).await;
    assert_eq!(frame["table"], "rooms");
    assert_eq!(frame["operation"], "insert");
    assert_eq!(frame["new_value"]["room_id"], first);

    let frame = next_frame(&mut stream).await;
    assert_eq!(frame["new_value"]["room_id"], second);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_fanout_carries_public_projection_only(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let watcher = Uuid::new_v4();

    let mut stream = subscribe(&server, watcher, "table=rooms").await;

    // A private room's create response carries the join code but the
    // fanout projection must not
    create_room(&server, Uuid::new_v4(), true).await;

    let frame = next_frame(&mut stream).await;
    assert_eq!(frame["new_value"]["is_private"], true);
    assert!(frame["new_value"]["join_code"].is_null());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_message_stream_is_room_scoped(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let member = Uuid::new_v4();
    let watched = create_room(&server, member, false).await;
    let other = create_room(&server, member, false).await;
    join_room(&server, &watched, member).await;
    join_room(&server, &other, member).await;

    let mut stream = subscribe(
        &server,
        member,
        &format!("table=messages&room_id={}", watched),
    )
    .await;

    for (room, content) in [(&other, "elsewhere"), (&watched, "here")] {
        let resp = server
            .client_for(member)
            .post(format!("{}/api/v1/rooms/{}/messages", server.url(), room))
            .json(&serde_json::json!({"content": content}))
            .send()
            .await?;
        assert_eq!(resp.status(), 201);
    }

    // Only the watched room's message arrives
    let frame = next_frame(&mut stream).await;
    assert_eq!(frame["table"], "messages");
    assert_eq!(frame["new_value"]["room_id"], watched);
    assert_eq!(frame["new_value"]["content"], "here");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unknown_table_is_rejected_before_upgrade(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;

    let mut request = format!("{}?table=webhooks", server.ws_url())
        .into_client_request()
        .expect("request should build");
    request.headers_mut().insert(
        MEMBER_ID_HEADER,
        HeaderValue::from_str(&Uuid::new_v4().to_string()).expect("valid header"),
    );

    let err = connect_async(request)
        .await
        .err()
        .expect("handshake should be rejected");
    assert!(
        matches!(&err, WsError::Http(response) if response.status() == 400),
        "expected HTTP 400 rejection, got {:?}",
        err
    );

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_subscribe_requires_identity(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;

    let request = format!("{}?table=rooms", server.ws_url())
        .into_client_request()
        .expect("request should build");

    let err = connect_async(request)
        .await
        .err()
        .expect("handshake should be rejected");
    assert!(
        matches!(&err, WsError::Http(response) if response.status() == 401),
        "expected HTTP 401 rejection, got {:?}",
        err
    );

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_lagged_subscriber_is_told_to_resync(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let watcher = Uuid::new_v4();
    let room_id = Uuid::new_v4();

    let mut stream = subscribe(
        &server,
        watcher,
        &format!("table=participants&room_id={}", room_id),
    )
    .await;

    // Overrun the subscriber's buffer before its pump gets a chance to
    // drain
    let burst = server.config().fanout_buffer + 36;
    for seq in 0..burst {
        server
            .fanout()
            .publish(
                Some(room_id),
                ChangeEvent {
                    table: ChangeTable::Participants,
                    operation: ChangeOp::Update,
                    new_value: serde_json::json!({"seq": seq}),
                },
            )
            .await;
    }

    // A resync frame arrives in place of the dropped events
    let mut resync = None;
    for _ in 0..burst {
        let frame = next_frame(&mut stream).await;
        if frame["type"] == "resync" {
            resync = Some(frame);
            break;
        }
    }

    let resync = resync.expect("lagged subscriber should receive a resync frame");
    assert!(resync["skipped"].as_u64().is_some_and(|s| s >= 1));

    // The stream continues from the live edge after the resync
    let frame = next_frame(&mut stream).await;
    assert_eq!(frame["type"], "change");
    assert_eq!(frame["table"], "participants");

    Ok(())
}
