//! Change-notification fanout.
//!
//! In-process registry of broadcast channels keyed by `(table, filter)`,
//! where the filter is a room id or `None` for the unfiltered stream of a
//! table (used by the rooms-list view). Channels are created lazily on
//! first subscribe and dropped again once the last subscriber is gone.
//!
//! Delivery is at-least-once for connected subscribers. A subscriber that
//! falls behind its buffer is told to resync by the stream handler; late
//! subscribers get nothing retroactive and fetch current state on connect.

use crate::observability::metrics;
use common::events::{ChangeEvent, ChangeOp, ChangeTable};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// One stream identity: a table plus an optional room filter.
type FanoutKey = (ChangeTable, Option<Uuid>);

/// Broadcast registry for committed mutations.
///
/// Cheap to clone; clones share the channel registry.
#[derive(Clone)]
pub struct ChangeFanout {
    /// Per-subscriber buffer capacity for newly created channels.
    buffer: usize,

    /// Live channels by (table, room filter).
    channels: Arc<RwLock<HashMap<FanoutKey, broadcast::Sender<ChangeEvent>>>>,
}

impl ChangeFanout {
    /// Create an empty registry. `buffer` is the per-subscriber event
    /// buffer; a subscriber that falls more than `buffer` events behind
    /// lags and must resync.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to one (table, filter) stream, creating it on demand.
    pub async fn subscribe(
        &self,
        table: ChangeTable,
        room_id: Option<Uuid>,
    ) -> broadcast::Receiver<ChangeEvent> {
        let key = (table, room_id);

        // Fast path: channel already exists.
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(&key) {
                return sender.subscribe();
            }
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    /// Serialize a row into its change event and publish it.
    ///
    /// Fanout is best-effort: a row that fails to serialize is logged and
    /// dropped rather than failing the mutation that produced it.
    pub async fn publish_row<T: Serialize>(
        &self,
        table: ChangeTable,
        operation: ChangeOp,
        room_id: Option<Uuid>,
        row: &T,
    ) {
        match serde_json::to_value(row) {
            Ok(new_value) => {
                self.publish(
                    room_id,
                    ChangeEvent {
                        table,
                        operation,
                        new_value,
                    },
                )
                .await;
            }
            Err(e) => {
                tracing::error!(
                    target: "rc.fanout",
                    table = table.as_str(),
                    error = %e,
                    "Failed to serialize row for fanout"
                );
            }
        }
    }

    /// Publish a committed mutation.
    ///
    /// The event goes to the room-filtered stream when the row belongs to
    /// a room, and always to the unfiltered stream of its table. Channels
    /// whose last subscriber disconnected are removed on the way out.
    pub async fn publish(&self, room_id: Option<Uuid>, event: ChangeEvent) {
        metrics::record_fanout_event(event.table.as_str());

        let mut keys: Vec<FanoutKey> = vec![(event.table, None)];
        if room_id.is_some() {
            keys.push((event.table, room_id));
        }

        let mut dead: Vec<FanoutKey> = Vec::new();
        {
            let channels = self.channels.read().await;
            for key in &keys {
                if let Some(sender) = channels.get(key) {
                    // send only fails when no receiver is listening
                    if sender.send(event.clone()).is_err() {
                        dead.push(*key);
                    }
                }
            }
        }

        if dead.is_empty() {
            return;
        }

        let mut channels = self.channels.write().await;
        for key in dead {
            // The last receiver may have come back between the locks.
            let orphaned = channels
                .get(&key)
                .is_some_and(|sender| sender.receiver_count() == 0);
            if orphaned {
                channels.remove(&key);
            }
        }
    }
}
