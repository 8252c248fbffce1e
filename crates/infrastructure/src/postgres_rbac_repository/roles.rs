use std::collections::BTreeSet;

use async_trait::async_trait;
use warden_application::RoleRepository;
use warden_domain::RoleName;

use super::*;

const SINGLE_DEFAULT_CONSTRAINT: &str = "rbac_roles_single_default_key";

fn map_role_insert_error(error: sqlx::Error, role: &Role) -> AppError {
    if is_database_error(&error, "23505") {
        if constraint_name(&error) == Some(SINGLE_DEFAULT_CONSTRAINT) {
            return AppError::Conflict(format!(
                "cannot mark role '{}' as default: a default role already exists",
                role.name()
            ));
        }

        return AppError::Validation(format!("role '{}' already exists", role.name()));
    }

    AppError::Internal(format!("failed to create role: {error}"))
}

impl PostgresRbacRepository {
    async fn fetch_role(&self, role_id: RoleId) -> AppResult<Role> {
        self.find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }
}

#[async_trait]
impl RoleRepository for PostgresRbacRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let query = role_query("");
        sqlx::query_as::<_, RoleRow>(query.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?
            .into_iter()
            .map(RoleRow::into_role)
            .collect()
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let query = role_query("WHERE roles.id = $1");
        sqlx::query_as::<_, RoleRow>(query.as_str())
            .bind(role_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to find role: {error}")))?
            .map(RoleRow::into_role)
            .transpose()
    }

    async fn find_role_by_name(&self, name: &RoleName) -> AppResult<Option<Role>> {
        let query = role_query("WHERE lower(roles.name) = $1");
        sqlx::query_as::<_, RoleRow>(query.as_str())
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to find role '{name}': {error}"))
            })?
            .map(RoleRow::into_role)
            .transpose()
    }

    async fn find_roles(&self, role_ids: &[RoleId]) -> AppResult<Vec<Role>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = role_ids.iter().map(RoleId::as_uuid).collect();
        let query = role_query("WHERE roles.id = ANY($1)");
        sqlx::query_as::<_, RoleRow>(query.as_str())
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load roles: {error}")))?
            .into_iter()
            .map(RoleRow::into_role)
            .collect()
    }

    async fn find_default_role(&self) -> AppResult<Option<Role>> {
        let query = role_query("WHERE roles.is_default");
        sqlx::query_as::<_, RoleRow>(query.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to find default role: {error}"))
            })?
            .map(RoleRow::into_role)
            .transpose()
    }

    async fn insert_role(&self, role: Role) -> AppResult<Role> {
        let mut transaction = self.pool.begin().await.map_err(begin_error)?;

        sqlx::query(
            r#"
            INSERT INTO rbac_roles (
                id,
                name,
                display_name,
                description,
                level,
                is_system,
                is_default,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(role.name().as_str())
        .bind(role.display_name().as_str())
        .bind(role.description())
        .bind(i32::from(role.level()))
        .bind(role.is_system())
        .bind(role.is_default())
        .bind(role.created_at())
        .bind(role.updated_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_role_insert_error(error, &role))?;

        let permissions: Vec<&str> = role.permissions().iter().map(Permission::as_str).collect();
        sqlx::query(
            r#"
            INSERT INTO rbac_role_permissions (role_id, permission)
            SELECT $1, UNNEST($2::TEXT[])
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(permissions)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to persist role permissions: {error}"))
        })?;

        transaction.commit().await.map_err(commit_error)?;

        Ok(role)
    }

    async fn update_role_permissions(
        &self,
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Role> {
        let mut transaction = self.pool.begin().await.map_err(begin_error)?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE rbac_roles
            SET updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(updated_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update role: {error}")))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }

        sqlx::query("DELETE FROM rbac_role_permissions WHERE role_id = $1")
            .bind(role_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to clear role permissions: {error}"))
            })?;

        let values: Vec<&str> = permissions.iter().map(Permission::as_str).collect();
        sqlx::query(
            r#"
            INSERT INTO rbac_role_permissions (role_id, permission)
            SELECT $1, UNNEST($2::TEXT[])
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(values)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to persist role permissions: {error}"))
        })?;

        transaction.commit().await.map_err(commit_error)?;

        self.fetch_role(role_id).await
    }

    async fn set_default_role(
        &self,
        role_id: Option<RoleId>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Option<Role>> {
        let mut transaction = self.pool.begin().await.map_err(begin_error)?;
        let target = role_id.map(|role_id| role_id.as_uuid());

        if let Some(role_id) = role_id {
            let exists = sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM rbac_roles WHERE id = $1 FOR UPDATE",
            )
            .bind(role_id.as_uuid())
            .fetch_optional(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to lock role: {error}")))?;

            if exists.is_none() {
                return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
            }
        }

        sqlx::query(
            r#"
            UPDATE rbac_roles
            SET is_default = FALSE, updated_at = $1
            WHERE is_default AND id IS DISTINCT FROM $2
            "#,
        )
        .bind(updated_at)
        .bind(target)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to clear default role: {error}"))
        })?;

        if let Some(target) = target {
            sqlx::query(
                r#"
                UPDATE rbac_roles
                SET is_default = TRUE, updated_at = $1
                WHERE id = $2 AND NOT is_default
                "#,
            )
            .bind(updated_at)
            .bind(target)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                if is_database_error(&error, "23505") {
                    return AppError::Conflict(
                        "default role changed concurrently; retry".to_owned(),
                    );
                }
                AppError::Internal(format!("failed to set default role: {error}"))
            })?;
        }

        transaction.commit().await.map_err(commit_error)?;

        match role_id {
            Some(role_id) => self.fetch_role(role_id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn delete_role_if_unassigned(&self, role_id: RoleId) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(begin_error)?;

        let locked = sqlx::query_as::<_, (String, bool)>(
            "SELECT name, is_system FROM rbac_roles WHERE id = $1 FOR UPDATE",
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to lock role: {error}")))?;

        let Some((name, is_system)) = locked else {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        };

        if is_system {
            return Err(AppError::Conflict(format!(
                "role '{name}' is a system role and cannot be deleted"
            )));
        }

        let assignment_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM rbac_assignments WHERE role_id = $1",
        )
        .bind(role_id.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count role assignments: {error}"))
        })?;

        if assignment_count > 0 {
            return Err(AppError::Conflict(format!(
                "role '{name}' still has {assignment_count} assignments"
            )));
        }

        sqlx::query("DELETE FROM rbac_roles WHERE id = $1")
            .bind(role_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                if is_database_error(&error, "23503") {
                    return AppError::Conflict(format!(
                        "role '{name}' gained an assignment while being deleted"
                    ));
                }
                AppError::Internal(format!("failed to delete role: {error}"))
            })?;

        transaction.commit().await.map_err(commit_error)?;

        Ok(())
    }
}
