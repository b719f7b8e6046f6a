//! Room Coordinator client library.
//!
//! Client-side building blocks for the Atrium room coordinator:
//!
//! - [`HttpCoordinatorApi`] speaks the coordinator's HTTP and WebSocket
//!   surface, behind the [`CoordinatorApi`] trait
//! - [`PresenceDriver`] owns a membership: join, periodic heartbeats,
//!   leave, and the flip to inactive when the server sweeps the member
//! - [`RoomSync`] keeps a local [`RoomView`] converged with the server
//!   by following the change-notification streams, coalescing bursts
//!   through a debounce window and appending message and suggestion
//!   inserts in place
//!
//! The trait seam exists so both drivers can be tested against
//! [`MockCoordinatorApi`] without a running coordinator.

pub mod api;
pub mod presence;
pub mod sync;

pub use api::mock::MockCoordinatorApi;
pub use api::{ApiError, CoordinatorApi, HttpCoordinatorApi, Subscription};
pub use presence::{PresenceConfig, PresenceDriver, PresenceState};
pub use sync::{RoomSync, RoomView, SyncConfig, SyncError};
