use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use warden_core::{AppError, AppResult, Scope, ScopeId, UserId};
use warden_domain::{
    AssignmentKey, Permission, Role, RoleAssignment, RoleDefinitionInput, RoleId,
};

mod assignments;
mod roles;


/// PostgreSQL-backed role and assignment repository.
#[derive(Clone)]
pub struct PostgresRbacRepository {
    pool: PgPool,
}

impl PostgresRbacRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    display_name: String,
    description: Option<String>,
    level: i32,
    is_system: bool,
    is_default: bool,
    permissions: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn into_role(self) -> AppResult<Role> {
        let level = u16::try_from(self.level).map_err(|error| {
            AppError::Internal(format!(
                "invalid stored level {} for role '{}': {error}",
                self.level, self.name
            ))
        })?;

        let permissions = self
            .permissions
            .iter()
            .map(|value| {
                Permission::from_str(value.as_str()).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid stored permission '{value}' for role '{}': {error}",
                        self.name
                    ))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let name = self.name;
        Role::hydrate(
            RoleId::from_uuid(self.id),
            RoleDefinitionInput {
                name: name.clone(),
                display_name: self.display_name,
                description: self.description,
                permissions,
                level,
                is_system: self.is_system,
                is_default: self.is_default,
            },
            self.created_at,
            self.updated_at,
        )
        .map_err(|error| AppError::Internal(format!("invalid stored role '{name}': {error}")))
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    user_id: String,
    role_id: Uuid,
    scope_id: Option<String>,
    granted_by: String,
    granted_at: DateTime<Utc>,
}

impl AssignmentRow {
    fn into_assignment(self) -> AppResult<RoleAssignment> {
        let user_id = decode_user_id(self.user_id)?;
        let granted_by = decode_user_id(self.granted_by)?;
        let scope_id = self
            .scope_id
            .map(|value| {
                ScopeId::new(value.as_str()).map_err(|error| {
                    AppError::Internal(format!("invalid stored scope '{value}': {error}"))
                })
            })
            .transpose()?;

        Ok(RoleAssignment::hydrate(
            AssignmentKey {
                user_id,
                role_id: RoleId::from_uuid(self.role_id),
                scope: Scope::from_option(scope_id),
            },
            granted_by,
            self.granted_at,
        ))
    }
}

fn decode_user_id(value: String) -> AppResult<UserId> {
    UserId::new(value.as_str())
        .map_err(|error| AppError::Internal(format!("invalid stored user '{value}': {error}")))
}

fn decode_assignments(rows: Vec<AssignmentRow>) -> AppResult<Vec<RoleAssignment>> {
    rows.into_iter().map(AssignmentRow::into_assignment).collect()
}

/// Builds the role projection with its permissions folded into an array.
fn role_query(filter: &str) -> String {
    format!(
        r#"
        SELECT
            roles.id,
            roles.name,
            roles.display_name,
            roles.description,
            roles.level,
            roles.is_system,
            roles.is_default,
            COALESCE(
                array_agg(grants.permission ORDER BY grants.permission)
                    FILTER (WHERE grants.permission IS NOT NULL),
                ARRAY[]::TEXT[]
            ) AS permissions,
            roles.created_at,
            roles.updated_at
        FROM rbac_roles AS roles
        LEFT JOIN rbac_role_permissions AS grants
            ON grants.role_id = roles.id
        {filter}
        GROUP BY roles.id
        "#
    )
}

fn begin_error(error: sqlx::Error) -> AppError {
    AppError::Internal(format!("failed to begin transaction: {error}"))
}

fn commit_error(error: sqlx::Error) -> AppError {
    AppError::Internal(format!("failed to commit transaction: {error}"))
}

fn is_database_error(error: &sqlx::Error, code: &str) -> bool {
    matches!(
        error,
        sqlx::Error::Database(database_error) if database_error.code().as_deref() == Some(code)
    )
}

fn constraint_name(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(database_error) => database_error.constraint(),
        _ => None,
    }
}
