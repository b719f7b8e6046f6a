//! Common data types for Atrium components.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Create a new random room ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a member (account-level identity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub Uuid);

impl MemberId {
    /// Create a new random member ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-chosen identifier for one device of a member.
///
/// A member may be signed in on several devices at once; presence is
/// tracked per `(member, device)` pair in the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Room accepts joins and activity.
    Active,

    /// Room is closed to membership changes.
    Archived,
}

impl RoomStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Archived => "archived",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "active" => RoomStatus::Active,
            _ => RoomStatus::Archived,
        }
    }
}

/// Role a participant holds inside one room.
///
/// Stored on the participant row and preserved across deactivation, so
/// a member who drops out and rejoins keeps their standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomRole {
    /// Ordinary participant who contributes content.
    Member,

    /// Facilitator with moderation powers but read-only content access.
    Organizer,

    /// Evaluator with read-only content access.
    Judge,
}

impl RoomRole {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RoomRole::Member => "member",
            RoomRole::Organizer => "organizer",
            RoomRole::Judge => "judge",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "organizer" => RoomRole::Organizer,
            "judge" => RoomRole::Judge,
            _ => RoomRole::Member,
        }
    }
}

/// Account-wide role granted independently of any room.
///
/// Global organizers and judges may observe rooms they never joined;
/// the room-scoped role they are resolved to mirrors the global one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    /// Baseline account with no cross-room standing.
    Participant,

    /// May observe and moderate any room.
    Organizer,

    /// May observe any room read-only.
    Judge,
}

impl GlobalRole {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            GlobalRole::Participant => "participant",
            GlobalRole::Organizer => "organizer",
            GlobalRole::Judge => "judge",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "organizer" => GlobalRole::Organizer,
            "judge" => GlobalRole::Judge,
            _ => GlobalRole::Participant,
        }
    }
}
