//! Repository layer for the room coordinator.
//!
//! Provides database access following the Handler -> Service -> Repository
//! architecture. Membership mutations (join, leave, sweep) run inside
//! room-scoped transactions that lock the room row, so concurrent callers
//! serialize per room and the cached occupancy always matches the exact
//! count of active participants.

pub mod messages;
pub mod participants;
pub mod roles;
pub mod rooms;
pub mod sessions;
pub mod suggestions;

pub use messages::MessagesRepository;
pub use participants::{JoinOutcome, LeaveOutcome, ParticipantsRepository, SweepOutcome};
pub use roles::GlobalRolesRepository;
pub use rooms::RoomsRepository;
pub use sessions::SessionsRepository;
pub use suggestions::SuggestionsRepository;
