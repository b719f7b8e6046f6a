//! Presence driver.
//!
//! [`PresenceDriver`] owns one member's liveness in one room. A
//! successful [`join`](PresenceDriver::join) starts a background
//! heartbeat task that refreshes the member's `last_seen_at` on a fixed
//! interval; [`leave`](PresenceDriver::leave) stops it. When the
//! coordinator answers a heartbeat with `REJOIN_REQUIRED`, the sweep
//! evicted this member in the meantime, so the driver flips to
//! [`PresenceState::Inactive`] and stops heartbeating until the caller
//! rejoins.
//!
//! There is no terminal state: an evicted or departed member can always
//! join again, and the driver can be reused across that cycle.

use crate::api::{ApiError, CoordinatorApi};
use common::api::{JoinRoomRequest, JoinRoomResponse, LeaveRoomResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};
use uuid::Uuid;

/// Seconds between liveness heartbeats.
///
/// Must stay comfortably under the server's liveness timeout, so a
/// healthy client is never swept.
const HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Tuning knobs for [`PresenceDriver`].
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Interval between heartbeats while joined.
    pub heartbeat_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
        }
    }
}

/// Where this member stands in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// Never joined through this driver.
    Unjoined,

    /// Joined and heartbeating.
    Active,

    /// Left, or evicted by the liveness sweep. Rejoining restores
    /// [`PresenceState::Active`].
    Inactive,
}

/// Drives one member's presence in one room.
pub struct PresenceDriver {
    api: Arc<dyn CoordinatorApi>,
    room_id: Uuid,
    device_id: String,
    config: PresenceConfig,
    state_tx: Arc<watch::Sender<PresenceState>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl PresenceDriver {
    /// Create a driver in the [`PresenceState::Unjoined`] state.
    pub fn new(
        api: Arc<dyn CoordinatorApi>,
        room_id: Uuid,
        device_id: impl Into<String>,
        config: PresenceConfig,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(PresenceState::Unjoined);
        Self {
            api,
            room_id,
            device_id: device_id.into(),
            config,
            state_tx: Arc::new(state_tx),
            heartbeat: None,
        }
    }

    /// Current presence state.
    pub fn state(&self) -> PresenceState {
        *self.state_tx.borrow()
    }

    /// A receiver that can await presence transitions, such as the flip
    /// to [`PresenceState::Inactive`] when the sweep evicts this member.
    pub fn watch_state(&self) -> watch::Receiver<PresenceState> {
        self.state_tx.subscribe()
    }

    /// Join the room, or reactivate a lapsed membership, and start
    /// heartbeating.
    ///
    /// # Errors
    ///
    /// Propagates the coordinator's rejection, for example `ROOM_FULL`
    /// or `INVALID_JOIN_CODE`. A failed join leaves the state untouched.
    pub async fn join(&mut self, join_code: Option<&str>) -> Result<JoinRoomResponse, ApiError> {
        let request = JoinRoomRequest {
            device_id: self.device_id.clone(),
            join_code: join_code.map(String::from),
        };
        let response = self.api.join_room(self.room_id, &request).await?;

        self.state_tx.send_replace(PresenceState::Active);
        self.start_heartbeat();

        debug!(
            target: "rc.client.presence",
            room_id = %self.room_id,
            already_member = response.already_member,
            "Joined room, heartbeat running"
        );

        Ok(response)
    }

    /// Leave the room and stop heartbeating.
    ///
    /// # Errors
    ///
    /// Propagates the coordinator's rejection. On failure the membership
    /// stands server-side, so the driver stays in its current state and
    /// keeps heartbeating.
    pub async fn leave(&mut self) -> Result<LeaveRoomResponse, ApiError> {
        let response = self.api.leave_room(self.room_id).await?;

        self.stop_heartbeat();
        self.state_tx.send_replace(PresenceState::Inactive);

        debug!(target: "rc.client.presence", room_id = %self.room_id, "Left room");

        Ok(response)
    }

    fn start_heartbeat(&mut self) {
        self.stop_heartbeat();

        let api = self.api.clone();
        let state_tx = self.state_tx.clone();
        let room_id = self.room_id;
        let period = self.config.heartbeat_interval;

        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            // The join that started this task already counted as
            // liveness, skip the interval's immediate first tick.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match api.heartbeat(room_id).await {
                    // Success needs no state change, the driver is
                    // already Active
                    Ok(_) => {}
                    Err(e) if e.is_rejoin_required() => {
                        warn!(
                            target: "rc.client.presence",
                            room_id = %room_id,
                            "Membership lapsed, heartbeats stopped until rejoin"
                        );
                        state_tx.send_replace(PresenceState::Inactive);
                        break;
                    }
                    Err(e) => {
                        debug!(
                            target: "rc.client.presence",
                            room_id = %room_id,
                            error = %e,
                            "Heartbeat failed, retrying next tick"
                        );
                    }
                }
            }
        }));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }
}

impl Drop for PresenceDriver {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}
