//! Data models for the room coordinator service.
//!
//! Database row types live here together with their conversions into the
//! public wire shapes from [`common::api`]. Row types are never serialized
//! directly; in particular `RoomRow` carries the join code and only its
//! `RoomInfo` projection (which does not) ever leaves the service.

use chrono::{DateTime, Utc};
use common::api::{MessageInfo, ParticipantInfo, RoomInfo, SessionInfo, SuggestionInfo};
use common::types::{RoomRole, RoomStatus};
use serde::Serialize;
use uuid::Uuid;

/// Room database row.
#[derive(Debug, Clone)]
pub struct RoomRow {
    /// Unique room identifier.
    pub room_id: Uuid,

    /// Room display name.
    pub display_name: String,

    /// Room theme.
    pub theme: String,

    /// Optional longer description.
    pub description: Option<String>,

    /// Member who created the room.
    pub created_by_member_id: Uuid,

    /// Cached count of active participants, maintained write-through by
    /// every membership mutation.
    pub occupancy: i32,

    /// Lifecycle status ("active" or "archived").
    pub status: String,

    /// Join code; present iff the room is private. Never serialized.
    pub join_code: Option<String>,

    /// Whether joining requires the join code.
    pub is_private: bool,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<RoomRow> for RoomInfo {
    fn from(row: RoomRow) -> Self {
        RoomInfo {
            room_id: row.room_id,
            display_name: row.display_name,
            theme: row.theme,
            description: row.description,
            created_by_member_id: row.created_by_member_id,
            occupancy: row.occupancy,
            status: RoomStatus::from_db_str(&row.status),
            is_private: row.is_private,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Participant database row.
///
/// One row per (room, member) pair, created on first join and toggled
/// between active and inactive afterwards; never deleted.
#[derive(Debug, Clone)]
pub struct ParticipantRow {
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

    /// Role inside this room ("member", "organizer" or "judge").
    pub room_role: String,

    /// Last heartbeat or join time.
    pub last_seen_at: DateTime<Utc>,

    /// First join time.
    pub joined_at: DateTime<Utc>,
}

impl From<ParticipantRow> for ParticipantInfo {
    fn from(row: ParticipantRow) -> Self {
        ParticipantInfo {
            participant_id: row.participant_id,
            room_id: row.room_id,
            member_id: row.member_id,
            device_id: row.device_id,
            is_active: row.is_active,
            room_role: RoomRole::from_db_str(&row.room_role),
            last_seen_at: row.last_seen_at,
            joined_at: row.joined_at,
        }
    }
}

/// Message database row (append-only).
#[derive(Debug, Clone)]
pub struct MessageRow {
    /// Unique message identifier.
    pub message_id: Uuid,

    /// Room the message was posted in.
    pub room_id: Uuid,

    /// Posting member; NULL for generated messages.
    pub author_member_id: Option<Uuid>,

    /// Message body.
    pub content: String,

    /// Whether the message was machine-generated.
    pub is_ai: bool,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for MessageInfo {
    fn from(row: MessageRow) -> Self {
        MessageInfo {
            message_id: row.message_id,
            room_id: row.room_id,
            author_member_id: row.author_member_id,
            content: row.content,
            is_ai: row.is_ai,
            created_at: row.created_at,
        }
    }
}

/// Suggestion database row (append-only).
#[derive(Debug, Clone)]
pub struct SuggestionRow {
    /// Unique suggestion identifier.
    pub suggestion_id: Uuid,

    /// Room the suggestion was generated for.
    pub room_id: Uuid,

    /// Suggestion body.
    pub content: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<SuggestionRow> for SuggestionInfo {
    fn from(row: SuggestionRow) -> Self {
        SuggestionInfo {
            suggestion_id: row.suggestion_id,
            room_id: row.room_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

/// Session registry row, one per (member, device) pair.
#[derive(Debug, Clone)]
pub struct MemberSessionRow {
    /// Unique session identifier.
    pub session_id: Uuid,

    /// Member the session belongs to.
    pub member_id: Uuid,

    /// Device the session was opened from.
    pub device_id: String,

    /// Room the device last joined, if any.
    pub room_id: Option<Uuid>,

    /// Session start time.
    pub started_at: DateTime<Utc>,

    /// Last join or heartbeat time for this device.
    pub last_seen_at: DateTime<Utc>,
}

impl From<MemberSessionRow> for SessionInfo {
    fn from(row: MemberSessionRow) -> Self {
        SessionInfo {
            session_id: row.session_id,
            member_id: row.member_id,
            device_id: row.device_id,
            room_id: row.room_id,
            started_at: row.started_at,
            last_seen_at: row.last_seen_at,
        }
    }
}

/// Readiness check response.
///
/// Returned by the `/ready` endpoint (readiness probe).
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
