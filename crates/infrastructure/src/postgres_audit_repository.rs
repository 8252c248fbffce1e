use async_trait::async_trait;
use sqlx::PgPool;

use warden_application::{AuditEvent, AuditRepository};
use warden_core::{AppError, AppResult, ScopeId};

/// PostgreSQL-backed append-only audit repository.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rbac_audit_events (
                actor,
                action,
                target,
                role_id,
                role_name,
                scope_id,
                detail,
                occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.actor.as_str())
        .bind(event.action.as_str())
        .bind(event.target)
        .bind(event.role_id.as_uuid())
        .bind(event.role_name)
        .bind(event.scope.scope_id().map(ScopeId::as_str))
        .bind(event.detail)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to append audit event: {error}")))?;

        Ok(())
    }
}
