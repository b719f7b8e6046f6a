//! Presence sweep background task.
//!
//! Periodically demotes participants whose last heartbeat is older than
//! the liveness threshold and reconciles the occupancy of the affected
//! rooms. Evictions are published to the fanout the same way explicit
//! leaves are, so clients cannot tell a missed-heartbeat eviction from a
//! leave.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. When the
//! token is cancelled, the task completes its current iteration and exits
//! cleanly.

use crate::config::RcConfig;
use crate::fanout::ChangeFanout;
use crate::observability::metrics;
use crate::repositories::ParticipantsRepository;
use common::api::{ParticipantInfo, RoomInfo};
use common::events::{ChangeOp, ChangeTable};
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Configuration for the presence sweep task.
#[derive(Debug, Clone)]
pub struct PresenceSweepConfig {
    /// Seconds between sweep passes.
    pub sweep_interval_seconds: u64,

    /// Seconds without a heartbeat before a participant counts as stale.
    pub liveness_timeout_seconds: u64,
}

impl From<&RcConfig> for PresenceSweepConfig {
    fn from(config: &RcConfig) -> Self {
        Self {
            sweep_interval_seconds: config.sweep_interval_seconds,
            liveness_timeout_seconds: config.liveness_timeout_seconds,
        }
    }
}

/// Start the presence sweep background task.
///
/// Runs one sweep per interval tick until the cancellation token fires.
/// The worst-case lifetime of an abandoned membership is the liveness
/// threshold plus one sweep interval.
///
/// # Arguments
///
/// * `pool` - Database connection pool
/// * `fanout` - Broadcast registry for eviction notifications
/// * `config` - Sweep configuration
/// * `cancel_token` - Token for graceful shutdown
///
/// # Returns
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "rc.task.presence_sweep")]
pub async fn start_presence_sweep(
    pool: PgPool,
    fanout: ChangeFanout,
    config: PresenceSweepConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "rc.task.presence_sweep",
        sweep_interval_seconds = config.sweep_interval_seconds,
        liveness_timeout_seconds = config.liveness_timeout_seconds,
        "Starting presence sweep task"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_sweep(&pool, &fanout, &config).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "rc.task.presence_sweep",
                    "Presence sweep task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(
        target: "rc.task.presence_sweep",
        "Presence sweep task stopped"
    );
}

/// Run a single sweep pass.
///
/// This is separated from the main loop to allow direct testing.
/// Made public within the crate for testing access.
pub(crate) async fn run_sweep(
    pool: &PgPool,
    fanout: &ChangeFanout,
    config: &PresenceSweepConfig,
) {
    let start = Instant::now();

    let outcome =
        match ParticipantsRepository::sweep_stale(pool, config.liveness_timeout_seconds).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::record_sweep_pass("error", 0, start.elapsed());
                tracing::error!(
                    target: "rc.task.presence_sweep",
                    error = %e,
                    "Presence sweep failed"
                );
                return;
            }
        };

    let evicted_count = outcome.evicted.len() as u64;
    metrics::record_sweep_pass("success", evicted_count, start.elapsed());

    if outcome.evicted.is_empty() {
        return;
    }

    warn!(
        target: "rc.task.presence_sweep",
        evicted = evicted_count,
        rooms = outcome.updated_rooms.len(),
        liveness_timeout_seconds = config.liveness_timeout_seconds,
        "Evicted stale participants"
    );

    // On the wire an eviction looks exactly like a leave
    for participant in outcome.evicted {
        let room_id = participant.room_id;
        fanout
            .publish_row(
                ChangeTable::Participants,
                ChangeOp::Update,
                Some(room_id),
                &ParticipantInfo::from(participant),
            )
            .await;
    }

    for room in outcome.updated_rooms {
        let room_id = room.room_id;
        fanout
            .publish_row(
                ChangeTable::Rooms,
                ChangeOp::Update,
                Some(room_id),
                &RoomInfo::from(room),
            )
            .await;
    }
}
