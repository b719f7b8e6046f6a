//! Room state synchronizer.
//!
//! [`RoomSync`] keeps a client-side [`RoomView`] converged with the
//! coordinator. It loads the room, its participants, and the recent
//! message and suggestion tails once up front, then follows the
//! change-notification streams. Room and participant changes are
//! coalesced through a debounce window into one refetch; message and
//! suggestion inserts are appended in place without a round trip. A
//! lagged stream forces a full refetch, since the dropped events cannot
//! be reconstructed.
//!
//! The current view is published through a [`tokio::sync::watch`]
//! channel, so consumers always see the latest state and can await
//! changes without queueing.

use crate::api::{ApiError, CoordinatorApi, Subscription};
use common::api::{MessageInfo, ParticipantInfo, RoomInfo, SuggestionInfo};
use common::events::{ChangeOp, ChangeTable, StreamFrame};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, warn};
use uuid::Uuid;

/// Delay between a change notification and the refetch it triggers.
///
/// Each new notification restarts the window, so a burst of changes
/// costs one refetch instead of one per event.
const DEBOUNCE_MILLIS: u64 = 250;

/// First retry delay when the initial load fails.
const INITIAL_BACKOFF_SECS: u64 = 1;

/// Ceiling for the initial-load retry delay.
const MAX_BACKOFF_SECS: u64 = 30;

/// Initial-load attempts before giving up.
const MAX_LOAD_ATTEMPTS: u32 = 5;

/// Tuning knobs for [`RoomSync`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Debounce window for change-triggered refetches.
    pub debounce: Duration,

    /// First retry delay for a failed initial load.
    pub initial_backoff: Duration,

    /// Largest retry delay the initial-load backoff grows to.
    pub max_backoff: Duration,

    /// Initial-load attempts before [`SyncError::Load`] is returned.
    pub max_load_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEBOUNCE_MILLIS),
            initial_backoff: Duration::from_secs(INITIAL_BACKOFF_SECS),
            max_backoff: Duration::from_secs(MAX_BACKOFF_SECS),
            max_load_attempts: MAX_LOAD_ATTEMPTS,
        }
    }
}

/// Reasons [`RoomSync::start`] can fail.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The initial load did not produce a room within the retry budget.
    #[error("initial load failed after {attempts} attempt(s)")]
    Load {
        /// Fetch attempts made before giving up.
        attempts: u32,
        #[source]
        source: ApiError,
    },

    /// A change-notification stream could not be opened.
    #[error("could not open a change subscription")]
    Subscribe(#[source] ApiError),
}

/// Client-side picture of one room.
#[derive(Debug, Clone)]
pub struct RoomView {
    /// The room itself, in its public projection.
    pub room: RoomInfo,

    /// Membership rows, active and inactive.
    pub participants: Vec<ParticipantInfo>,

    /// Recent messages, oldest first.
    pub messages: Vec<MessageInfo>,

    /// Recent suggestions, oldest first.
    pub suggestions: Vec<SuggestionInfo>,

    /// Advisory flag: this member appears to be connected from more
    /// than one device. Never blocks anything.
    pub multi_device: bool,
}

/// Handle to a running synchronizer.
///
/// Dropping it stops the background task and closes its subscriptions.
#[derive(Debug)]
pub struct RoomSync {
    view_rx: watch::Receiver<RoomView>,
    handle: JoinHandle<()>,
}

impl RoomSync {
    /// Load the room and start following its change streams.
    ///
    /// Subscriptions are opened before the first fetch so a change
    /// landing mid-load is observed rather than lost. The initial load
    /// retries transient failures with exponential backoff; a hard
    /// rejection fails immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Subscribe`] if a stream cannot be opened,
    /// or [`SyncError::Load`] once the retry budget is spent.
    pub async fn start(
        api: Arc<dyn CoordinatorApi>,
        room_id: Uuid,
        device_id: impl Into<String>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let device_id = device_id.into();

        let rooms = api
            .subscribe(ChangeTable::Rooms, Some(room_id))
            .await
            .map_err(SyncError::Subscribe)?;
        let participants = api
            .subscribe(ChangeTable::Participants, Some(room_id))
            .await
            .map_err(SyncError::Subscribe)?;
        let messages = api
            .subscribe(ChangeTable::Messages, Some(room_id))
            .await
            .map_err(SyncError::Subscribe)?;
        let suggestions = api
            .subscribe(ChangeTable::Suggestions, Some(room_id))
            .await
            .map_err(SyncError::Subscribe)?;

        let view = initial_load(api.as_ref(), room_id, &device_id, &config).await?;
        let (view_tx, view_rx) = watch::channel(view);

        let actor = SyncActor {
            api,
            room_id,
            device_id,
            config,
            view_tx,
            rooms,
            participants,
            messages,
            suggestions,
        };
        let handle = tokio::spawn(actor.run());

        Ok(Self { view_rx, handle })
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> RoomView {
        self.view_rx.borrow().clone()
    }

    /// A receiver that can await view changes.
    pub fn watch_view(&self) -> watch::Receiver<RoomView> {
        self.view_rx.clone()
    }
}

impl Drop for RoomSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Fetch everything the view needs, retrying transient room-fetch
/// failures with exponential backoff.
///
/// The tails degrade gracefully: a failed participant, message, or
/// suggestion fetch logs and leaves that part of the view empty until
/// the first resync fills it in. Only the room fetch is load-bearing.
async fn initial_load(
    api: &dyn CoordinatorApi,
    room_id: Uuid,
    device_id: &str,
    config: &SyncConfig,
) -> Result<RoomView, SyncError> {
    let mut backoff = config.initial_backoff;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let (room, participants, messages, suggestions) = tokio::join!(
            api.get_room(room_id),
            api.list_participants(room_id),
            api.list_messages(room_id),
            api.list_suggestions(room_id),
        );

        let room = match room {
            Ok(room) => room,
            Err(e) if e.is_transient() && attempts < config.max_load_attempts => {
                warn!(
                    target: "rc.client.sync",
                    error = %e,
                    attempt = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "Initial room fetch failed, retrying"
                );
                sleep(backoff).await;
                backoff = (backoff * 2).min(config.max_backoff);
                continue;
            }
            Err(e) => {
                return Err(SyncError::Load {
                    attempts,
                    source: e,
                })
            }
        };

        let participants = participants.unwrap_or_else(|e| {
            warn!(target: "rc.client.sync", error = %e, "Participant fetch failed during initial load");
            Vec::new()
        });
        let messages = messages.unwrap_or_else(|e| {
            warn!(target: "rc.client.sync", error = %e, "Message tail fetch failed during initial load");
            Vec::new()
        });
        let suggestions = suggestions.unwrap_or_else(|e| {
            warn!(target: "rc.client.sync", error = %e, "Suggestion tail fetch failed during initial load");
            Vec::new()
        });

        let multi_device = multi_device_flag(api, device_id, &participants).await;

        return Ok(RoomView {
            room,
            participants,
            messages,
            suggestions,
            multi_device,
        });
    }
}

/// Whether this member looks connected from more than one device.
///
/// True when the session registry lists more than one active session,
/// or when the member's active participant row carries a different
/// device than this client. A failed session fetch falls back to the
/// participant-row signal alone; the flag is advisory and never worth
/// failing a sync over.
async fn multi_device_flag(
    api: &dyn CoordinatorApi,
    device_id: &str,
    participants: &[ParticipantInfo],
) -> bool {
    let member_id = api.member_id();
    let divergent = participants
        .iter()
        .find(|p| p.member_id == member_id && p.is_active)
        .is_some_and(|p| p.device_id != device_id);

    match api.list_sessions().await {
        Ok(sessions) => divergent || sessions.len() > 1,
        Err(e) => {
            debug!(target: "rc.client.sync", error = %e, "Session fetch failed, using participant rows only");
            divergent
        }
    }
}

/// Restart the debounce window. A pending refetch is replaced, never
/// queued, so back-to-back events collapse into one.
fn schedule_resync(
    armed: &mut bool,
    full_resync: &mut bool,
    debounce: Pin<&mut Sleep>,
    window: Duration,
    full: bool,
) {
    *armed = true;
    *full_resync |= full;
    debounce.reset(Instant::now() + window);
}

struct SyncActor {
    api: Arc<dyn CoordinatorApi>,
    room_id: Uuid,
    device_id: String,
    config: SyncConfig,
    view_tx: watch::Sender<RoomView>,
    rooms: Subscription,
    participants: Subscription,
    messages: Subscription,
    suggestions: Subscription,
}

impl SyncActor {
    async fn run(mut self) {
        let debounce = sleep(Duration::ZERO);
        tokio::pin!(debounce);
        let mut armed = false;
        let mut full_resync = false;

        loop {
            tokio::select! {
                frame = self.rooms.next_frame() => match frame {
                    Some(StreamFrame::Change(_)) => {
                        schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, false);
                    }
                    Some(StreamFrame::Resync { skipped }) => {
                        warn!(target: "rc.client.sync", skipped, "Rooms stream lagged, scheduling full refetch");
                        schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, true);
                    }
                    None => break,
                },

                frame = self.participants.next_frame() => match frame {
                    Some(StreamFrame::Change(_)) => {
                        schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, false);
                    }
                    Some(StreamFrame::Resync { skipped }) => {
                        warn!(target: "rc.client.sync", skipped, "Participants stream lagged, scheduling full refetch");
                        schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, true);
                    }
                    None => break,
                },

                frame = self.messages.next_frame() => match frame {
                    Some(StreamFrame::Change(event)) if event.operation == ChangeOp::Insert => {
                        if !self.apply_message(event.new_value) {
                            schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, true);
                        }
                    }
                    Some(StreamFrame::Change(_)) => {
                        // Messages are append-only; anything else means
                        // our picture of the tail is suspect.
                        schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, true);
                    }
                    Some(StreamFrame::Resync { skipped }) => {
                        warn!(target: "rc.client.sync", skipped, "Messages stream lagged, scheduling full refetch");
                        schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, true);
                    }
                    None => break,
                },

                frame = self.suggestions.next_frame() => match frame {
                    Some(StreamFrame::Change(event)) if event.operation == ChangeOp::Insert => {
                        if !self.apply_suggestion(event.new_value) {
                            schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, true);
                        }
                    }
                    Some(StreamFrame::Change(_)) => {
                        schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, true);
                    }
                    Some(StreamFrame::Resync { skipped }) => {
                        warn!(target: "rc.client.sync", skipped, "Suggestions stream lagged, scheduling full refetch");
                        schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.debounce, true);
                    }
                    None => break,
                },

                () = &mut debounce, if armed => {
                    armed = false;
                    let full = std::mem::take(&mut full_resync);
                    if let Err(e) = self.resync(full).await {
                        warn!(target: "rc.client.sync", error = %e, full, "Resync failed, retrying");
                        // Retry after the backoff delay, not the short
                        // debounce window.
                        schedule_resync(&mut armed, &mut full_resync, debounce.as_mut(), self.config.initial_backoff, full);
                    }
                }
            }
        }

        debug!(target: "rc.client.sync", room_id = %self.room_id, "Synchronizer stopped, a change stream closed");
    }

    /// Refetch state and publish the converged view.
    ///
    /// A partial resync refreshes the room and participants, the parts
    /// change notifications do not carry enough to patch. A full resync
    /// also replaces both tails.
    async fn resync(&self, full: bool) -> Result<(), ApiError> {
        if full {
            let (room, participants, messages, suggestions) = tokio::join!(
                self.api.get_room(self.room_id),
                self.api.list_participants(self.room_id),
                self.api.list_messages(self.room_id),
                self.api.list_suggestions(self.room_id),
            );
            let room = room?;
            let participants = participants?;
            let messages = messages?;
            let suggestions = suggestions?;
            let multi_device =
                multi_device_flag(self.api.as_ref(), &self.device_id, &participants).await;

            self.view_tx.send_replace(RoomView {
                room,
                participants,
                messages,
                suggestions,
                multi_device,
            });
        } else {
            let (room, participants) = tokio::join!(
                self.api.get_room(self.room_id),
                self.api.list_participants(self.room_id),
            );
            let room = room?;
            let participants = participants?;
            let multi_device =
                multi_device_flag(self.api.as_ref(), &self.device_id, &participants).await;

            self.view_tx.send_modify(|view| {
                view.room = room;
                view.participants = participants;
                view.multi_device = multi_device;
            });
        }

        Ok(())
    }

    /// Append a message row from the stream. Rows already in the tail
    /// are dropped, the initial fetch and the stream can overlap.
    fn apply_message(&self, value: serde_json::Value) -> bool {
        match serde_json::from_value::<MessageInfo>(value) {
            Ok(message) => {
                self.view_tx.send_if_modified(|view| {
                    if view.messages.iter().any(|m| m.message_id == message.message_id) {
                        return false;
                    }
                    view.messages.push(message);
                    true
                });
                true
            }
            Err(e) => {
                warn!(target: "rc.client.sync", error = %e, "Unparseable message row, scheduling refetch");
                false
            }
        }
    }

    fn apply_suggestion(&self, value: serde_json::Value) -> bool {
        match serde_json::from_value::<SuggestionInfo>(value) {
            Ok(suggestion) => {
                self.view_tx.send_if_modified(|view| {
                    if view
                        .suggestions
                        .iter()
                        .any(|s| s.suggestion_id == suggestion.suggestion_id)
                    {
                        return false;
                    }
                    view.suggestions.push(suggestion);
                    true
                });
                true
            }
            Err(e) => {
                warn!(target: "rc.client.sync", error = %e, "Unparseable suggestion row, scheduling refetch");
                false
            }
        }
    }
}
