use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use warden_application::{AssignmentRepository, GrantOutcome, RoleRepository};
use warden_core::{AppError, AppResult, ScopeId, UserId};
use warden_domain::{AssignmentKey, Permission, Role, RoleAssignment, RoleId, RoleName};

#[cfg(test)]
mod tests;

#[derive(Debug, Default)]
struct RbacState {
    roles: HashMap<RoleId, Role>,
    assignments: BTreeMap<AssignmentKey, RoleAssignment>,
}

impl RbacState {
    fn role_mut(&mut self, role_id: RoleId) -> AppResult<&mut Role> {
        self.roles
            .get_mut(&role_id)
            .ok_or_else(|| role_not_found(role_id))
    }

    fn default_role(&self) -> Option<&Role> {
        self.roles.values().find(|role| role.is_default())
    }
}

/// In-memory role and assignment store.
///
/// Roles and assignments share one lock, so every repository call is atomic with
/// respect to the others.
#[derive(Debug, Default)]
pub struct InMemoryRbacRepository {
    state: RwLock<RbacState>,
}

impl InMemoryRbacRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleRepository for InMemoryRbacRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        Ok(self.state.read().await.roles.values().cloned().collect())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(&role_id).cloned())
    }

    async fn find_role_by_name(&self, name: &RoleName) -> AppResult<Option<Role>> {
        Ok(self
            .state
            .read()
            .await
            .roles
            .values()
            .find(|role| role.name() == name)
            .cloned())
    }

    async fn find_roles(&self, role_ids: &[RoleId]) -> AppResult<Vec<Role>> {
        let state = self.state.read().await;
        Ok(role_ids
            .iter()
            .filter_map(|role_id| state.roles.get(role_id))
            .cloned()
            .collect())
    }

    async fn find_default_role(&self) -> AppResult<Option<Role>> {
        Ok(self.state.read().await.default_role().cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<Role> {
        let mut state = self.state.write().await;

        if state
            .roles
            .values()
            .any(|stored| stored.name() == role.name())
        {
            return Err(AppError::Validation(format!(
                "role '{}' already exists",
                role.name()
            )));
        }

        if role.is_default()
            && let Some(existing) = state.default_role()
        {
            return Err(AppError::Conflict(format!(
                "role '{}' is already the default role",
                existing.name()
            )));
        }

        state.roles.insert(role.id(), role.clone());
        Ok(role)
    }

    async fn update_role_permissions(
        &self,
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Role> {
        let mut state = self.state.write().await;
        let role = state.role_mut(role_id)?;
        role.replace_permissions(permissions, updated_at);
        Ok(role.clone())
    }

    async fn set_default_role(
        &self,
        role_id: Option<RoleId>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Option<Role>> {
        let mut state = self.state.write().await;

        if let Some(role_id) = role_id
            && !state.roles.contains_key(&role_id)
        {
            return Err(role_not_found(role_id));
        }

        for role in state.roles.values_mut() {
            let is_default = Some(role.id()) == role_id;
            if role.is_default() != is_default {
                role.set_default(is_default, updated_at);
            }
        }

        Ok(role_id.and_then(|role_id| state.roles.get(&role_id).cloned()))
    }

    async fn delete_role_if_unassigned(&self, role_id: RoleId) -> AppResult<()> {
        let mut state = self.state.write().await;
        let role = state
            .roles
            .get(&role_id)
            .ok_or_else(|| role_not_found(role_id))?;

        if role.is_system() {
            return Err(AppError::Conflict(format!(
                "role '{}' is a system role and cannot be deleted",
                role.name()
            )));
        }

        let role_name = role.name().clone();
        let assignment_count = state
            .assignments
            .values()
            .filter(|assignment| assignment.role_id() == role_id)
            .count();
        if assignment_count > 0 {
            return Err(AppError::Conflict(format!(
                "role '{role_name}' still has {assignment_count} assignments"
            )));
        }

        state.roles.remove(&role_id);
        Ok(())
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryRbacRepository {
    async fn insert_assignment_if_absent(
        &self,
        assignment: RoleAssignment,
    ) -> AppResult<GrantOutcome> {
        let mut state = self.state.write().await;

        if !state.roles.contains_key(&assignment.role_id()) {
            return Err(role_not_found(assignment.role_id()));
        }

        let key = assignment.key();
        if let Some(existing) = state.assignments.get(&key) {
            return Ok(GrantOutcome {
                assignment: existing.clone(),
                created: false,
            });
        }

        state.assignments.insert(key, assignment.clone());
        Ok(GrantOutcome {
            assignment,
            created: true,
        })
    }

    async fn delete_assignment(&self, key: &AssignmentKey) -> AppResult<bool> {
        Ok(self.state.write().await.assignments.remove(key).is_some())
    }

    async fn delete_assignments_in_scope(
        &self,
        user_id: &UserId,
        scope_id: &ScopeId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut state = self.state.write().await;
        let keys: Vec<AssignmentKey> = state
            .assignments
            .keys()
            .filter(|key| &key.user_id == user_id && key.scope.scope_id() == Some(scope_id))
            .cloned()
            .collect();

        Ok(keys
            .iter()
            .filter_map(|key| state.assignments.remove(key))
            .collect())
    }

    async fn list_assignments_for_user(
        &self,
        user_id: &UserId,
    ) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .values()
            .filter(|assignment| assignment.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn list_assignments_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .values()
            .filter(|assignment| assignment.role_id() == role_id)
            .cloned()
            .collect())
    }
}

fn role_not_found(role_id: RoleId) -> AppError {
    AppError::NotFound(format!("role '{role_id}' was not found"))
}
