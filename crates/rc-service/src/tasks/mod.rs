//! Background tasks for the room coordinator.
//!
//! Provides long-running background tasks for maintenance operations.
//!
//! # Tasks
//!
//! - `presence_sweep` - Evicts participants whose heartbeats have lapsed

pub mod presence_sweep;

pub use presence_sweep::{start_presence_sweep, PresenceSweepConfig};
