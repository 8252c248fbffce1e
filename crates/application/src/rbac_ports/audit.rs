use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_core::{AppResult, Scope, UserId};
use warden_domain::{AuditAction, RoleId};

/// Immutable audit event emitted after an RBAC state change commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// User that performed the action.
    pub actor: UserId,
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Affected user for grants and revokes, or the role name for role mutations.
    pub target: String,
    /// Role involved in the change.
    pub role_id: RoleId,
    /// Role name at the time of the change.
    pub role_name: String,
    /// Scope of the change.
    pub scope: Scope,
    /// Commit timestamp.
    pub occurred_at: DateTime<Utc>,
    /// Optional human-readable detail.
    pub detail: Option<String>,
}

/// Port for an append-only audit log.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persists one audit event.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}
