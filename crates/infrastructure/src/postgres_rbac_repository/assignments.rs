use async_trait::async_trait;
use warden_application::{AssignmentRepository, GrantOutcome};

use super::*;

#[async_trait]
impl AssignmentRepository for PostgresRbacRepository {
    async fn insert_assignment_if_absent(
        &self,
        assignment: RoleAssignment,
    ) -> AppResult<GrantOutcome> {
        let scope_id = assignment.scope().scope_id().map(ScopeId::as_str);

        let inserted = sqlx::query_as::<_, AssignmentRow>(
            r#"
            INSERT INTO rbac_assignments (user_id, role_id, scope_id, granted_by, granted_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, role_id, (COALESCE(scope_id, ''))) DO NOTHING
            RETURNING user_id, role_id, scope_id, granted_by, granted_at
            "#,
        )
        .bind(assignment.user_id().as_str())
        .bind(assignment.role_id().as_uuid())
        .bind(scope_id)
        .bind(assignment.granted_by().as_str())
        .bind(assignment.granted_at())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            if is_database_error(&error, "23503") {
                return AppError::NotFound(format!(
                    "role '{}' was not found",
                    assignment.role_id()
                ));
            }
            AppError::Internal(format!("failed to grant role: {error}"))
        })?;

        if let Some(row) = inserted {
            return Ok(GrantOutcome {
                assignment: row.into_assignment()?,
                created: true,
            });
        }

        let existing = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT user_id, role_id, scope_id, granted_by, granted_at
            FROM rbac_assignments
            WHERE user_id = $1
                AND role_id = $2
                AND scope_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(assignment.user_id().as_str())
        .bind(assignment.role_id().as_uuid())
        .bind(scope_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load assignment: {error}")))?
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "assignment of role '{}' to '{}' was removed concurrently; retry",
                assignment.role_id(),
                assignment.user_id()
            ))
        })?;

        Ok(GrantOutcome {
            assignment: existing.into_assignment()?,
            created: false,
        })
    }

    async fn delete_assignment(&self, key: &AssignmentKey) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM rbac_assignments
            WHERE user_id = $1
                AND role_id = $2
                AND scope_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(key.user_id.as_str())
        .bind(key.role_id.as_uuid())
        .bind(key.scope.scope_id().map(ScopeId::as_str))
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to revoke role: {error}")))?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn delete_assignments_in_scope(
        &self,
        user_id: &UserId,
        scope_id: &ScopeId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            DELETE FROM rbac_assignments
            WHERE user_id = $1
                AND scope_id = $2
            RETURNING user_id, role_id, scope_id, granted_by, granted_at
            "#,
        )
        .bind(user_id.as_str())
        .bind(scope_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to revoke assignments in scope '{scope_id}': {error}"
            ))
        })?;

        decode_assignments(rows)
    }

    async fn list_assignments_for_user(
        &self,
        user_id: &UserId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT user_id, role_id, scope_id, granted_by, granted_at
            FROM rbac_assignments
            WHERE user_id = $1
            ORDER BY granted_at, id
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list assignments for user '{user_id}': {error}"
            ))
        })?;

        decode_assignments(rows)
    }

    async fn list_assignments_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT user_id, role_id, scope_id, granted_by, granted_at
            FROM rbac_assignments
            WHERE role_id = $1
            ORDER BY granted_at, id
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list assignments for role '{role_id}': {error}"
            ))
        })?;

        decode_assignments(rows)
    }
}
