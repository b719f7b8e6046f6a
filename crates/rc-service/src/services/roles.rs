//! Role resolution and permission derivation.
//!
//! Two independent layers feed into a member's effective room role:
//! the room-scoped role on their participant row, and the platform-wide
//! roles granted in the global registry. An active participant row wins;
//! without one, a global organizer or judge observes the room read-only
//! with the corresponding room role, and everyone else falls back to the
//! baseline member role.

use crate::errors::RcError;
use crate::repositories::{GlobalRolesRepository, ParticipantsRepository};
use common::types::{GlobalRole, RoomRole};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// A member's effective role in one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleResolution {
    /// Effective room role.
    pub room_role: RoomRole,

    /// Whether the member currently holds an active participant row.
    pub is_member: bool,
}

/// Permissions derived from a room role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomPermissions {
    /// May edit room content.
    pub can_edit: bool,

    /// May post comments and messages.
    pub can_comment: bool,

    /// May remove other members.
    pub can_kick: bool,

    /// Observes without contributing content.
    pub is_read_only: bool,
}

/// Derive the permission set for a room role.
///
/// The mapping is total: every role resolves every flag, so callers never
/// branch on the role itself.
pub fn derive_permissions(room_role: RoomRole) -> RoomPermissions {
    RoomPermissions {
        can_edit: room_role == RoomRole::Member,
        can_comment: matches!(room_role, RoomRole::Member | RoomRole::Organizer),
        can_kick: room_role == RoomRole::Organizer,
        is_read_only: matches!(room_role, RoomRole::Organizer | RoomRole::Judge),
    }
}

/// Role resolution service.
pub struct RolesService;

impl RolesService {
    /// Resolve a member's effective role in a room.
    ///
    /// An active participant row supplies the role directly. Otherwise the
    /// member's global grants apply: organizer outranks judge when both
    /// are held, and a member with no grants gets the baseline member
    /// role without membership.
    #[instrument(skip_all, name = "rc.services.resolve_room_role")]
    pub async fn resolve_room_role(
        pool: &PgPool,
        room_id: Uuid,
        member_id: Uuid,
    ) -> Result<RoleResolution, RcError> {
        let participant = ParticipantsRepository::get_participant(pool, room_id, member_id).await?;

        if let Some(participant) = participant {
            if participant.is_active {
                return Ok(RoleResolution {
                    room_role: RoomRole::from_db_str(&participant.room_role),
                    is_member: true,
                });
            }
        }

        let global_roles = GlobalRolesRepository::get_roles(pool, member_id).await?;

        let room_role = if global_roles.contains(&GlobalRole::Organizer) {
            RoomRole::Organizer
        } else if global_roles.contains(&GlobalRole::Judge) {
            RoomRole::Judge
        } else {
            RoomRole::Member
        };

        Ok(RoleResolution {
            room_role,
            is_member: false,
        })
    }

    /// Fetch a member's global roles, defaulting to participant when none
    /// were granted.
    #[instrument(skip_all, name = "rc.services.effective_global_roles")]
    pub async fn effective_global_roles(
        pool: &PgPool,
        member_id: Uuid,
    ) -> Result<Vec<GlobalRole>, RcError> {
        let roles = GlobalRolesRepository::get_roles(pool, member_id).await?;

        if roles.is_empty() {
            return Ok(vec![GlobalRole::Participant]);
        }

        Ok(roles)
    }

    /// Require the caller to hold the global organizer role.
    ///
    /// Gate for role-mutation endpoints.
    #[instrument(skip_all, name = "rc.services.require_global_organizer")]
    pub async fn require_global_organizer(pool: &PgPool, member_id: Uuid) -> Result<(), RcError> {
        let roles = GlobalRolesRepository::get_roles(pool, member_id).await?;

        if roles.contains(&GlobalRole::Organizer) {
            return Ok(());
        }

        Err(RcError::Unauthorized(
            "Global organizer role required".to_string(),
        ))
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod integration_tests {
    use super::*;
    use crate::repositories::RoomsRepository;

    async fn create_room(pool: &PgPool) -> Uuid {
        RoomsRepository::create_room(pool, Uuid::new_v4(), "Room", "testing", None, false, None)
            .await
            .expect("room create should succeed")
            .room_id
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_active_participant_row_supplies_the_role(pool: PgPool) {
        let room_id = create_room(&pool).await;
        let member = Uuid::new_v4();

        ParticipantsRepository::join(&pool, room_id, member, "web-1", None, 5)
            .await
            .expect("join should succeed");

        // Even a global judge keeps their row role while joined.
        GlobalRolesRepository::replace_roles(&pool, member, &[GlobalRole::Judge], Uuid::new_v4())
            .await
            .expect("grant should succeed");

        let resolution = RolesService::resolve_room_role(&pool, room_id, member)
            .await
            .expect("resolve should succeed");

        assert_eq!(resolution.room_role, RoomRole::Member);
        assert!(resolution.is_member);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_global_organizer_observes_without_membership(pool: PgPool) {
        let room_id = create_room(&pool).await;
        let observer = Uuid::new_v4();

        GlobalRolesRepository::replace_roles(
            &pool,
            observer,
            &[GlobalRole::Organizer, GlobalRole::Judge],
            Uuid::new_v4(),
        )
        .await
        .expect("grant should succeed");

        let resolution = RolesService::resolve_room_role(&pool, room_id, observer)
            .await
            .expect("resolve should succeed");

        assert_eq!(resolution.room_role, RoomRole::Organizer);
        assert!(!resolution.is_member);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_ungranted_member_falls_back_to_baseline(pool: PgPool) {
        let room_id = create_room(&pool).await;

        let resolution = RolesService::resolve_room_role(&pool, room_id, Uuid::new_v4())
            .await
            .expect("resolve should succeed");

        assert_eq!(resolution.room_role, RoomRole::Member);
        assert!(!resolution.is_member);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_inactive_row_does_not_grant_membership(pool: PgPool) {
        let room_id = create_room(&pool).await;
        let member = Uuid::new_v4();

        ParticipantsRepository::join(&pool, room_id, member, "web-1", None, 5)
            .await
            .expect("join should succeed");
        ParticipantsRepository::leave(&pool, room_id, member)
            .await
            .expect("leave should succeed");

        GlobalRolesRepository::replace_roles(&pool, member, &[GlobalRole::Judge], Uuid::new_v4())
            .await
            .expect("grant should succeed");

        let resolution = RolesService::resolve_room_role(&pool, room_id, member)
            .await
            .expect("resolve should succeed");

        assert_eq!(resolution.room_role, RoomRole::Judge);
        assert!(!resolution.is_member);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_effective_roles_default_to_participant(pool: PgPool) {
        let roles = RolesService::effective_global_roles(&pool, Uuid::new_v4())
            .await
            .expect("fetch should succeed");

        assert_eq!(roles, vec![GlobalRole::Participant]);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_require_global_organizer_gates_on_the_grant(pool: PgPool) {
        let organizer = Uuid::new_v4();
        let plain = Uuid::new_v4();

        GlobalRolesRepository::replace_roles(
            &pool,
            organizer,
            &[GlobalRole::Organizer],
            Uuid::new_v4(),
        )
        .await
        .expect("grant should succeed");

        RolesService::require_global_organizer(&pool, organizer)
            .await
            .expect("organizer should pass");

        let denied = RolesService::require_global_organizer(&pool, plain).await;
        assert!(matches!(denied, Err(RcError::Unauthorized(_))));
    }
}
