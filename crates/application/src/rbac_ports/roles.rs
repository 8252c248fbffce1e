use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_core::AppResult;
use warden_domain::{Permission, Role, RoleId, RoleName};

/// Input payload for defining a role.
///
/// Permissions arrive as transport strings and are validated against the catalog
/// before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineRoleInput {
    /// Unique, case-insensitive role name.
    pub name: String,
    /// Presentation name.
    pub display_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Permission strings in `resource:action` form.
    pub permissions: Vec<String>,
    /// Hierarchy level.
    pub level: u16,
    /// Marks a built-in role.
    pub is_system: bool,
    /// Marks the deployment default role.
    pub is_default: bool,
}

/// Repository port for durable role definitions.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Lists every role.
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    /// Finds one role by id.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Finds one role by normalized name.
    async fn find_role_by_name(&self, name: &RoleName) -> AppResult<Option<Role>>;

    /// Fetches the roles for a set of ids; unknown ids are omitted.
    async fn find_roles(&self, role_ids: &[RoleId]) -> AppResult<Vec<Role>>;

    /// Returns the role flagged as default, if any.
    async fn find_default_role(&self) -> AppResult<Option<Role>>;

    /// Persists a new role.
    ///
    /// Fails with a validation error when the name is taken and with a conflict when
    /// the role is flagged default while another default exists. Both checks are
    /// atomic with the write.
    async fn insert_role(&self, role: Role) -> AppResult<Role>;

    /// Replaces the permission set of a role.
    async fn update_role_permissions(
        &self,
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Role>;

    /// Moves the default flag to `role_id`, or clears it when `None`.
    ///
    /// Every other role loses the flag in the same atomic write.
    async fn set_default_role(
        &self,
        role_id: Option<RoleId>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Option<Role>>;

    /// Hard-deletes a role that is not a system role and has no assignments.
    ///
    /// The assignment check and the delete are atomic with respect to concurrent grants.
    async fn delete_role_if_unassigned(&self, role_id: RoleId) -> AppResult<()>;
}
