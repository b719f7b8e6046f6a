//! Integration tests for heartbeat liveness and sweep eviction.
//!
//! Tests the full presence lifecycle over HTTP using the `TestRcServer`
//! harness: heartbeats extending liveness, sweep passes demoting stale
//! participants, occupancy reconciliation, and rejoin after eviction.
//!
//! The harness does not start the background sweep task, so tests drive
//! sweep passes directly through the repository for determinism. One
//! test spawns the real task with a short interval to cover the loop
//! end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use rc_service::repositories::ParticipantsRepository;
use rc_service::tasks::{start_presence_sweep, PresenceSweepConfig};
use rc_test_utils::TestRcServer;
use sqlx::PgPool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn create_room(server: &TestRcServer, creator: Uuid) -> String {
    let body: serde_json::Value = server
        .client_for(creator)
        .post(format!("{}/api/v1/rooms", server.url()))
        .json(&serde_json::json!({"display_name": "Presence room", "theme": "standup"}))
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

async fn heartbeat(server: &TestRcServer, room_id: &str, member_id: Uuid) -> reqwest::Response {
    server
        .client_for(member_id)
        .post(format!(
            "{}/api/v1/rooms/{}/heartbeat",
            server.url(),
            room_id
        ))
        .send()
        .await
        .expect("heartbeat request should send")
}

/// Backdate a participant's last heartbeat so a sweep sees it as stale.
async fn age_member(pool: &PgPool, member_id: Uuid, seconds: i64) {
    sqlx::query(
        r#"
        UPDATE participants
        SET last_seen_at = NOW() - ($2 || ' seconds')::INTERVAL
        WHERE member_id = $1
        "#,
    )
    .bind(member_id)
    .bind(seconds.to_string())
    .execute(pool)
    .await
    .expect("Failed to age participant");
}

async fn room_occupancy(server: &TestRcServer, room_id: &str, viewer: Uuid) -> i64 {
    let body: serde_json::Value = server
        .client_for(viewer)
        .get(format!("{}/api/v1/rooms/{}", server.url(), room_id))
        .send()
        .await
        .expect("room request should send")
        .json()
        .await
        .expect("room response should parse");
    body["occupancy"].as_i64().unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_heartbeat_reports_liveness(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let member = Uuid::new_v4();
    let room_id = create_room(&server, member).await;
    join_room(&server, &room_id, member).await;

    let resp = heartbeat(&server, &room_id, member).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["success"], true);
    assert!(body["last_seen_at"].is_string());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_member_is_evicted(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let member = Uuid::new_v4();
    let room_id = create_room(&server, member).await;
    join_room(&server, &room_id, member).await;
    age_member(&pool, member, 120).await;

    let outcome = ParticipantsRepository::sweep_stale(&pool, 60).await?;

    assert_eq!(outcome.evicted.len(), 1);
    let evicted = outcome.evicted.first().expect("one eviction expected");
    assert_eq!(evicted.member_id, member);
    assert!(!evicted.is_active);

    let updated = outcome
        .updated_rooms
        .first()
        .expect("one room reconciled expected");
    assert_eq!(updated.occupancy, 0);

    // The eviction is visible over HTTP
    assert_eq!(room_occupancy(&server, &room_id, member).await, 0);

    let resp = heartbeat(&server, &room_id, member).await;
    assert_eq!(resp.status(), 409);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "REJOIN_REQUIRED");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_evicted_member_can_rejoin(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let member = Uuid::new_v4();
    let room_id = create_room(&server, member).await;
    join_room(&server, &room_id, member).await;
    age_member(&pool, member, 120).await;

    ParticipantsRepository::sweep_stale(&pool, 60).await?;

    let resp = server
        .client_for(member)
        .post(format!("{}/api/v1/rooms/{}/join", server.url(), room_id))
        .json(&serde_json::json!({"device_id": "web-2"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["already_member"], true);
    assert_eq!(body["room"]["occupancy"], 1);
    assert_eq!(body["participant"]["device_id"], "web-2");

    // Heartbeats work again after the rejoin
    let resp = heartbeat(&server, &room_id, member).await;
    assert_eq!(resp.status(), 200);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_heartbeat_defers_eviction(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let member = Uuid::new_v4();
    let room_id = create_room(&server, member).await;
    join_room(&server, &room_id, member).await;
    age_member(&pool, member, 120).await;

    // A heartbeat that lands before the sweep refreshes the timestamp
    let resp = heartbeat(&server, &room_id, member).await;
    assert_eq!(resp.status(), 200);

    let outcome = ParticipantsRepository::sweep_stale(&pool, 60).await?;

    assert!(outcome.evicted.is_empty());
    assert_eq!(room_occupancy(&server, &room_id, member).await, 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sweep_demotes_only_stale_members(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let stale = Uuid::new_v4();
    let live = Uuid::new_v4();
    let room_id = create_room(&server, stale).await;
    join_room(&server, &room_id, stale).await;
    join_room(&server, &room_id, live).await;
    age_member(&pool, stale, 120).await;

    let outcome = ParticipantsRepository::sweep_stale(&pool, 60).await?;

    assert_eq!(outcome.evicted.len(), 1);
    assert_eq!(
        outcome.evicted.first().map(|p| p.member_id),
        Some(stale)
    );
    assert_eq!(room_occupancy(&server, &room_id, live).await, 1);

    // The survivor's heartbeat still succeeds
    let resp = heartbeat(&server, &room_id, live).await;
    assert_eq!(resp.status(), 200);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_freed_seat_is_reusable_after_eviction(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let creator = Uuid::new_v4();
    let room_id = create_room(&server, creator).await;

    // Fill the room to capacity
    let mut members = Vec::new();
    for _ in 0..server.config().room_capacity {
        let member = Uuid::new_v4();
        join_room(&server, &room_id, member).await;
        members.push(member);
    }

    let latecomer = Uuid::new_v4();
    let resp = server
        .client_for(latecomer)
        .post(format!("{}/api/v1/rooms/{}/join", server.url(), room_id))
        .json(&serde_json::json!({"device_id": "web-1"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 409);

    // Evict one member; the freed seat admits the latecomer
    let evictee = members.first().expect("room should have members");
    age_member(&pool, *evictee, 120).await;
    ParticipantsRepository::sweep_stale(&pool, 60).await?;

    let resp = server
        .client_for(latecomer)
        .post(format!("{}/api/v1/rooms/{}/join", server.url(), room_id))
        .json(&serde_json::json!({"device_id": "web-1"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);

    let occupancy = room_occupancy(&server, &room_id, latecomer).await;
    assert_eq!(occupancy, server.config().room_capacity);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_background_sweep_evicts_and_notifies(pool: PgPool) -> Result<()> {
    let server = TestRcServer::spawn(pool.clone()).await?;
    let member = Uuid::new_v4();
    let room_id = create_room(&server, member).await;
    join_room(&server, &room_id, member).await;

    let room_uuid = Uuid::parse_str(&room_id)?;
    let mut events = server
        .fanout()
        .subscribe(common::events::ChangeTable::Participants, Some(room_uuid))
        .await;

    age_member(&pool, member, 120).await;

    let config = PresenceSweepConfig {
        sweep_interval_seconds: 1,
        liveness_timeout_seconds: 60,
    };
    let cancel_token = CancellationToken::new();
    let handle = tokio::spawn(start_presence_sweep(
        pool.clone(),
        server.fanout().clone(),
        config,
        cancel_token.clone(),
    ));

    // The first tick fires immediately; the eviction event proves a
    // pass ran
    let event = tokio::time::timeout(Duration::from_secs(3), events.recv())
        .await
        .expect("sweep should evict within the deadline")?;
    assert_eq!(event.operation, common::events::ChangeOp::Update);
    assert_eq!(event.new_value["is_active"], false);
    assert_eq!(event.new_value["member_id"], member.to_string());

    let resp = heartbeat(&server, &room_id, member).await;
    assert_eq!(resp.status(), 409);

    cancel_token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
    assert!(result.is_ok(), "sweep task should stop after cancellation");

    Ok(())
}
