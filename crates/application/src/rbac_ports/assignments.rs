use async_trait::async_trait;

use warden_core::{AppResult, ScopeId, UserId};
use warden_domain::{AssignmentKey, RoleAssignment, RoleId};

/// Result of an idempotent grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantOutcome {
    /// Stored assignment, either newly created or pre-existing.
    pub assignment: RoleAssignment,
    /// Whether this call inserted the row.
    pub created: bool,
}

/// Repository port for durable role assignments.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Inserts the assignment unless its (user, role, scope) key already exists.
    ///
    /// Returns the stored row in both cases. Fails with not found when the role does
    /// not exist. The uniqueness check and insert are a single atomic step.
    async fn insert_assignment_if_absent(
        &self,
        assignment: RoleAssignment,
    ) -> AppResult<GrantOutcome>;

    /// Hard-deletes one assignment, returning whether a row was removed.
    async fn delete_assignment(&self, key: &AssignmentKey) -> AppResult<bool>;

    /// Hard-deletes every assignment of a user bound to one scope.
    async fn delete_assignments_in_scope(
        &self,
        user_id: &UserId,
        scope_id: &ScopeId,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Lists every assignment of a user across all scopes.
    async fn list_assignments_for_user(&self, user_id: &UserId)
    -> AppResult<Vec<RoleAssignment>>;

    /// Lists every assignment referencing a role.
    async fn list_assignments_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleAssignment>>;
}
