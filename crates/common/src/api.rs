//! API request and response types for the room coordinator.
//!
//! These are the wire shapes shared by the `rc-service` handlers and the
//! `rc-client` synchronizer. Database row types stay private to the
//! service; the projections here never carry a room's join code except in
//! the create/regenerate responses addressed to the room creator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{GlobalRole, RoomRole, RoomStatus};

/// Header carrying the authenticated member id, injected by the fronting
/// auth layer.
pub const MEMBER_ID_HEADER: &str = "x-member-id";

/// Optional header carrying the member's display name.
pub const DISPLAY_NAME_HEADER: &str = "x-display-name";

/// Maximum room display name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 100;

/// Minimum room display name length.
pub const MIN_ROOM_NAME_LENGTH: usize = 2;

/// Maximum room theme length.
pub const MAX_THEME_LENGTH: usize = 50;

/// Maximum room description length.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Maximum client-supplied device identifier length.
pub const MAX_DEVICE_ID_LENGTH: usize = 128;

/// Maximum chat message length.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

// ============================================================================
// Public row projections
// ============================================================================

/// Public view of a room.
///
/// `occupancy` is the service-maintained count of currently active
/// participants. The join code is deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomInfo {
    /// Unique room identifier.
    pub room_id: Uuid,

    /// Room display name.
    pub display_name: String,

    /// Room theme.
    pub theme: String,

    /// Optional longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Member who created the room.
    pub created_by_member_id: Uuid,

    /// Count of currently active participants.
    pub occupancy: i32,

    /// Lifecycle status.
    pub status: RoomStatus,

    /// Whether joining requires the room's join code.
    pub is_private: bool,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Public view of a participant row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParticipantInfo {
    /// Unique participant identifier.
    pub participant_id: Uuid,

    /// Room this row belongs to.
    pub room_id: Uuid,

    /// Member this row belongs to.
    pub member_id: Uuid,

    /// Device the member last joined from.
    pub device_id: String,

    /// Whether the member currently counts toward occupancy.
    pub is_active: bool,

    /// Role the member holds inside this room.
    pub room_role: RoomRole,

    /// Last heartbeat or join time.
    pub last_seen_at: DateTime<Utc>,

    /// First join time.
    pub joined_at: DateTime<Utc>,
}

/// Public view of a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageInfo {
    /// Unique message identifier.
    pub message_id: Uuid,

    /// Room the message was posted in.
    pub room_id: Uuid,

    /// Posting member; `None` for generated messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_member_id: Option<Uuid>,

    /// Message body.
    pub content: String,

    /// Whether the message was machine-generated.
    pub is_ai: bool,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Public view of a generated suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuggestionInfo {
    /// Unique suggestion identifier.
    pub suggestion_id: Uuid,

    /// Room the suggestion was generated for.
    pub room_id: Uuid,

    /// Suggestion body.
    pub content: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One (member, device) presence record from the session registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub session_id: Uuid,

    /// Member the session belongs to.
    pub member_id: Uuid,

    /// Device the session was opened from.
    pub device_id: String,

    /// Room the device last joined, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<Uuid>,

    /// Session start time.
    pub started_at: DateTime<Utc>,

    /// Last join or heartbeat time for this device.
    pub last_seen_at: DateTime<Utc>,
}

// ============================================================================
// Requests
// ============================================================================

/// Request to create a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    /// Room display name.
    pub display_name: String,

    /// Room theme.
    pub theme: String,

    /// Optional longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether joining requires a join code. Defaults to public.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

impl CreateRoomRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        let display_name = self.display_name.trim();

        if display_name.len() < MIN_ROOM_NAME_LENGTH {
            return Err("Room name must be at least 2 characters");
        }

        if display_name.len() > MAX_ROOM_NAME_LENGTH {
            return Err("Room name must be at most 100 characters");
        }

        let theme = self.theme.trim();

        if theme.is_empty() {
            return Err("Theme is required");
        }

        if theme.len() > MAX_THEME_LENGTH {
            return Err("Theme must be at most 50 characters");
        }

        if let Some(description) = &self.description {
            if description.len() > MAX_DESCRIPTION_LENGTH {
                return Err("Description must be at most 500 characters");
            }
        }

        Ok(())
    }
}

/// Request to join a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoomRequest {
    /// Device the member is joining from.
    pub device_id: String,

    /// Join code; required for private rooms unless the caller created
    /// the room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
}

impl JoinRoomRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        let device_id = self.device_id.trim();

        if device_id.is_empty() {
            return Err("Device id is required");
        }

        if device_id.len() > MAX_DEVICE_ID_LENGTH {
            return Err("Device id must be at most 128 characters");
        }

        Ok(())
    }
}

/// Request to post a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    /// Message body.
    pub content: String,
}

impl SendMessageRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.content.trim().is_empty() {
            return Err("Message content is required");
        }

        if self.content.len() > MAX_MESSAGE_LENGTH {
            return Err("Message content must be at most 2000 characters");
        }

        Ok(())
    }
}

/// Request to replace a member's set of global roles.
///
/// The listed roles replace whatever the member held before. Baseline
/// `participant` standing is implicit and cannot be granted explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateGlobalRolesRequest {
    /// Elevated roles the member should hold. May be empty.
    pub roles: Vec<GlobalRole>,
}

impl UpdateGlobalRolesRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.roles.contains(&GlobalRole::Participant) {
            return Err("Participant is the baseline role and cannot be granted");
        }

        Ok(())
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Response for creating a room.
///
/// The join code is only ever returned here and from code regeneration,
/// both addressed to the creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomResponse {
    /// The created room.
    pub room: RoomInfo,

    /// Generated join code for private rooms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
}

/// Response for joining a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoomResponse {
    /// Whether the caller now counts toward occupancy.
    pub success: bool,

    /// True when the caller already held an active membership and the
    /// join was a reactivating no-op for capacity purposes.
    pub already_member: bool,

    /// Room snapshot after the join.
    pub room: RoomInfo,

    /// The caller's participant row after the join.
    pub participant: ParticipantInfo,
}

/// Response for leaving a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaveRoomResponse {
    /// Whether the membership was deactivated.
    pub success: bool,

    /// Room snapshot after the leave.
    pub room: RoomInfo,
}

/// Response for a liveness heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatResponse {
    /// Whether an active membership was refreshed.
    pub success: bool,

    /// Server time the heartbeat was recorded at.
    pub last_seen_at: DateTime<Utc>,
}

/// Response for regenerating a room's join code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegenerateJoinCodeResponse {
    /// Whether a new code was installed.
    pub success: bool,

    /// The new join code. Previous codes stop working immediately.
    pub join_code: String,
}

/// Response listing rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomsResponse {
    /// Rooms, most recently created first.
    pub rooms: Vec<RoomInfo>,
}

/// Response listing a room's participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParticipantsResponse {
    /// Participant rows, active first.
    pub participants: Vec<ParticipantInfo>,
}

/// Response listing a room's recent messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagesResponse {
    /// Messages in creation order.
    pub messages: Vec<MessageInfo>,
}

/// Response listing a room's recent suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuggestionsResponse {
    /// Suggestions in creation order.
    pub suggestions: Vec<SuggestionInfo>,
}

/// Response listing the caller's active sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsResponse {
    /// One entry per (member, device) pair seen recently.
    pub sessions: Vec<SessionInfo>,
}

/// The permissions a member holds in one room, derived from their
/// resolved room role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionsResponse {
    /// Room the permissions apply to.
    pub room_id: Uuid,

    /// Member the permissions were resolved for.
    pub member_id: Uuid,

    /// Resolved room role. Global organizers and judges without a
    /// participant row resolve to the matching observer role.
    pub room_role: RoomRole,

    /// Whether the member holds an active participant row.
    pub is_member: bool,

    /// May modify room content.
    pub can_edit: bool,

    /// May post chat messages.
    pub can_comment: bool,

    /// May remove other participants.
    pub can_kick: bool,

    /// Content surface is read-only for this member.
    pub is_read_only: bool,
}

/// A member's global role assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalRolesResponse {
    /// Member the roles belong to.
    pub member_id: Uuid,

    /// Elevated roles held; empty means baseline participant.
    pub roles: Vec<GlobalRole>,
}
