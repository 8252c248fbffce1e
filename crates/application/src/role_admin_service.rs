use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use warden_core::{Actor, AppError, AppResult, Scope};
use warden_domain::{
    AuditAction, Permission, Role, RoleDefinitionInput, RoleId, RoleName, sort_roles_by_rank,
};

use crate::AuthorizationService;
use crate::audit_trail::append_audit_event;
use crate::rbac_ports::{
    AssignmentRepository, AuditEvent, AuditRepository, DefineRoleInput, RoleRepository,
};

mod seed;


pub use seed::SeedOutcome;

/// Application service for role definitions.
#[derive(Clone)]
pub struct RoleAdminService {
    authorization_service: AuthorizationService,
    role_repository: Arc<dyn RoleRepository>,
    assignment_repository: Arc<dyn AssignmentRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl RoleAdminService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        role_repository: Arc<dyn RoleRepository>,
        assignment_repository: Arc<dyn AssignmentRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            authorization_service,
            role_repository,
            assignment_repository,
            audit_repository,
        }
    }

    /// Lists roles, highest level first.
    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let mut roles = self.role_repository.list_roles().await?;
        sort_roles_by_rank(&mut roles);
        Ok(roles)
    }

    /// Returns one role or a not-found error.
    pub async fn find_role(&self, role_id: RoleId) -> AppResult<Role> {
        self.role_repository
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }

    /// Returns one role by case-insensitive name or a not-found error.
    pub async fn find_role_by_name(&self, name: &str) -> AppResult<Role> {
        let name = RoleName::new(name)?;
        self.role_repository
            .find_role_by_name(&name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{name}' was not found")))
    }

    /// Defines a role after validating its name, level and permissions.
    ///
    /// Fails with a conflict when the name is taken or when it is flagged default
    /// while another default exists; the old default is never displaced implicitly.
    pub async fn define_role(&self, actor: &Actor, input: DefineRoleInput) -> AppResult<Role> {
        self.require_role_manage_permission(actor).await?;

        let role = Role::new(RoleDefinitionInput {
            name: input.name,
            display_name: input.display_name,
            description: input.description,
            permissions: Permission::parse_all(&input.permissions)?,
            level: input.level,
            is_system: input.is_system,
            is_default: input.is_default,
        })?;

        if self
            .role_repository
            .find_role_by_name(role.name())
            .await?
            .is_some()
        {
            return Err(AppError::Validation(format!(
                "role '{}' already exists",
                role.name()
            )));
        }

        if role.is_default()
            && let Some(existing) = self.role_repository.find_default_role().await?
        {
            return Err(AppError::Conflict(format!(
                "role '{}' is already the default role; clear it before marking '{}' as default",
                existing.name(),
                role.name()
            )));
        }

        let role = self.role_repository.insert_role(role).await?;

        if role.is_default() {
            self.authorization_service.invalidate_all().await?;
        }

        info!(
            role = %role.name(),
            level = role.level(),
            permissions = role.permissions().len(),
            is_default = role.is_default(),
            "role defined"
        );

        self.append_role_event(
            actor,
            AuditAction::RoleCreated,
            &role,
            format!(
                "defined role '{}' at level {} with {} permissions",
                role.name(),
                role.level(),
                role.permissions().len()
            ),
        )
        .await;

        Ok(role)
    }

    /// Replaces a role's permission set.
    ///
    /// A user actor must hold `roles:manage`, must outrank the role and may only add
    /// permissions it already holds. The system actor skips these checks.
    pub async fn update_role_permissions(
        &self,
        actor: &Actor,
        role_id: RoleId,
        permissions: Vec<String>,
    ) -> AppResult<Role> {
        let permissions: BTreeSet<Permission> =
            Permission::parse_all(&permissions)?.into_iter().collect();
        let role = self.find_role(role_id).await?;

        self.require_role_edit_privilege(actor, &role, &permissions)
            .await?;

        let updated = self
            .role_repository
            .update_role_permissions(role_id, permissions, Utc::now())
            .await?;

        self.authorization_service.invalidate_all().await?;

        info!(
            role = %updated.name(),
            previous = role.permissions().len(),
            current = updated.permissions().len(),
            "role permissions updated"
        );

        let added: Vec<&str> = updated
            .permissions()
            .difference(role.permissions())
            .map(Permission::as_str)
            .collect();
        let removed: Vec<&str> = role
            .permissions()
            .difference(updated.permissions())
            .map(Permission::as_str)
            .collect();

        self.append_role_event(
            actor,
            AuditAction::RolePermissionsUpdated,
            &updated,
            format!(
                "updated role '{}': added [{}], removed [{}]",
                updated.name(),
                added.join(", "),
                removed.join(", ")
            ),
        )
        .await;

        Ok(updated)
    }

    /// Deletes a custom role that no assignment references.
    pub async fn delete_role(&self, actor: &Actor, role_id: RoleId) -> AppResult<()> {
        self.require_role_manage_permission(actor).await?;

        let role = self.find_role(role_id).await?;
        if role.is_system() {
            return Err(AppError::Conflict(format!(
                "role '{}' is a system role and cannot be deleted",
                role.name()
            )));
        }

        let assignment_count = self
            .assignment_repository
            .list_assignments_for_role(role_id)
            .await?
            .len();
        if assignment_count > 0 {
            return Err(AppError::Conflict(format!(
                "role '{}' still has {assignment_count} assignments; revoke them first",
                role.name()
            )));
        }

        self.role_repository
            .delete_role_if_unassigned(role_id)
            .await?;

        if role.is_default() {
            self.authorization_service.invalidate_all().await?;
        }

        info!(role = %role.name(), "role deleted");

        self.append_role_event(
            actor,
            AuditAction::RoleDeleted,
            &role,
            format!("deleted role '{}'", role.name()),
        )
        .await;

        Ok(())
    }

    /// Makes `role_id` the only default role, or clears the default when `None`.
    pub async fn set_default_role(
        &self,
        actor: &Actor,
        role_id: Option<RoleId>,
    ) -> AppResult<Option<Role>> {
        self.require_role_manage_permission(actor).await?;

        let previous = self.role_repository.find_default_role().await?;
        if let Some(role_id) = role_id {
            self.find_role(role_id).await?;
        }

        let current = self
            .role_repository
            .set_default_role(role_id, Utc::now())
            .await?;

        self.authorization_service.invalidate_all().await?;

        let previous_name = previous
            .as_ref()
            .map_or_else(|| "none".to_owned(), |role| role.name().to_string());

        match (&current, &previous) {
            (Some(role), _) => {
                info!(role = %role.name(), previous = %previous_name, "default role set");
                self.append_role_event(
                    actor,
                    AuditAction::RoleDefaultChanged,
                    role,
                    format!(
                        "default role changed from '{previous_name}' to '{}'",
                        role.name()
                    ),
                )
                .await;
            }
            (None, Some(role)) => {
                info!(previous = %previous_name, "default role cleared");
                self.append_role_event(
                    actor,
                    AuditAction::RoleDefaultChanged,
                    role,
                    format!("default role '{previous_name}' cleared"),
                )
                .await;
            }
            (None, None) => {}
        }

        Ok(current)
    }

    async fn require_role_manage_permission(&self, actor: &Actor) -> AppResult<()> {
        if actor.is_system() {
            return Ok(());
        }

        self.authorization_service
            .require_permission(actor.user_id(), actor.scope(), Permission::RolesManage)
            .await
    }

    async fn require_role_edit_privilege(
        &self,
        actor: &Actor,
        role: &Role,
        permissions: &BTreeSet<Permission>,
    ) -> AppResult<()> {
        if actor.is_system() {
            return Ok(());
        }

        self.require_role_manage_permission(actor).await?;

        let actor_level = self
            .authorization_service
            .highest_level(actor.user_id(), actor.scope())
            .await?
            .unwrap_or(0);
        if actor_level <= role.level() {
            return Err(AppError::Forbidden(format!(
                "user '{}' (level {actor_level}) cannot edit role '{}' at level {}",
                actor.user_id(),
                role.name(),
                role.level()
            )));
        }

        let held = self
            .authorization_service
            .resolve(actor.user_id(), actor.scope())
            .await?;
        let not_held: Vec<&str> = role
            .added_permissions(permissions)
            .into_iter()
            .filter(|permission| !held.contains(*permission))
            .map(Permission::as_str)
            .collect();
        if !not_held.is_empty() {
            return Err(AppError::Forbidden(format!(
                "user '{}' cannot grant permissions it does not hold: {}",
                actor.user_id(),
                not_held.join(", ")
            )));
        }

        Ok(())
    }

    async fn append_role_event(
        &self,
        actor: &Actor,
        action: AuditAction,
        role: &Role,
        detail: String,
    ) {
        append_audit_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                actor: actor.user_id().clone(),
                action,
                target: role.name().to_string(),
                role_id: role.id(),
                role_name: role.name().to_string(),
                scope: Scope::Global,
                occurred_at: Utc::now(),
                detail: Some(detail),
            },
        )
        .await;
    }
}
