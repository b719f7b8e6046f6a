//! Global role assignments repository.
//!
//! Platform-wide roles are stored as one row per (member, role). No rows
//! means the member holds only the baseline participant role; that default
//! is applied by the role resolver, not here.

use crate::errors::RcError;
use crate::observability::metrics;
use common::types::GlobalRole;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Global roles repository for database operations.
pub struct GlobalRolesRepository;

impl GlobalRolesRepository {
    /// Fetch the roles granted to a member. Empty when none were granted.
    #[instrument(skip_all, name = "rc.repo.get_global_roles")]
    pub async fn get_roles(pool: &PgPool, member_id: Uuid) -> Result<Vec<GlobalRole>, RcError> {
        let rows = sqlx::query(
            r#"
            SELECT role
            FROM global_role_assignments
            WHERE member_id = $1
            ORDER BY role
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await
        .map_err(|e| RcError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| GlobalRole::from_db_str(row.get("role")))
            .collect())
    }

    /// Replace a member's granted roles with a new set.
    ///
    /// Delete-then-insert inside one transaction so observers never see a
    /// partial set. Passing an empty set revokes everything, returning the
    /// member to the baseline participant role.
    #[instrument(skip_all, name = "rc.repo.replace_global_roles")]
    pub async fn replace_roles(
        pool: &PgPool,
        member_id: Uuid,
        roles: &[GlobalRole],
        granted_by_member_id: Uuid,
    ) -> Result<(), RcError> {
        let start = Instant::now();

        let result = replace_in_tx(pool, member_id, roles, granted_by_member_id).await;

        let duration = start.elapsed();
        match &result {
            Ok(()) => metrics::record_db_query("replace_global_roles", "success", duration),
            Err(_) => metrics::record_db_query("replace_global_roles", "error", duration),
        }

        result
    }
}

async fn replace_in_tx(
    pool: &PgPool,
    member_id: Uuid,
    roles: &[GlobalRole],
    granted_by_member_id: Uuid,
) -> Result<(), RcError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| RcError::Database(format!("Failed to start transaction: {}", e)))?;

    sqlx::query(
        r#"
        DELETE FROM global_role_assignments
        WHERE member_id = $1
        "#,
    )
    .bind(member_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| RcError::Database(format!("Failed to clear existing roles: {}", e)))?;

    for role in roles {
        sqlx::query(
            r#"
            INSERT INTO global_role_assignments (member_id, role, granted_by_member_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (member_id, role) DO NOTHING
            "#,
        )
        .bind(member_id) // $1
        .bind(role.as_db_str()) // $2
        .bind(granted_by_member_id) // $3
        .execute(&mut *tx)
        .await
        .map_err(|e| RcError::Database(format!("Failed to grant role: {}", e)))?;
    }

    tx.commit()
        .await
        .map_err(|e| RcError::Database(format!("Failed to commit role replacement: {}", e)))?;

    Ok(())
}
