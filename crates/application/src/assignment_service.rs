use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use warden_core::{AppError, AppResult, Scope, ScopeId, UserId};
use warden_domain::{AssignmentKey, AuditAction, Role, RoleAssignment, RoleId};

use crate::AuthorizationService;
use crate::audit_trail::append_audit_event;
use crate::rbac_ports::{AssignmentRepository, AuditEvent, AuditRepository, RoleRepository};


/// Application service that grants, revokes and lists role assignments.
#[derive(Clone)]
pub struct AssignmentService {
    authorization_service: AuthorizationService,
    role_repository: Arc<dyn RoleRepository>,
    assignment_repository: Arc<dyn AssignmentRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl AssignmentService {
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

    /// Grants a role to a user in a scope.
    ///
    /// Idempotent: re-granting an existing (user, role, scope) returns the stored
    /// assignment unchanged and records nothing.
    pub async fn grant(
        &self,
        user_id: &UserId,
        role_id: RoleId,
        scope: &Scope,
        granted_by: &UserId,
    ) -> AppResult<RoleAssignment> {
        let role = self.require_role(role_id).await?;

        let outcome = self
            .assignment_repository
            .insert_assignment_if_absent(RoleAssignment::new(
                AssignmentKey {
                    user_id: user_id.clone(),
                    role_id,
                    scope: scope.clone(),
                },
                granted_by.clone(),
            ))
            .await?;

        if !outcome.created {
            return Ok(outcome.assignment);
        }

        self.authorization_service.invalidate_user(user_id).await?;

        info!(
            user_id = %user_id,
            role = %role.name(),
            scope = %scope,
            granted_by = %granted_by,
            "role granted"
        );

        self.append_assignment_event(
            granted_by,
            AuditAction::RoleGranted,
            user_id,
            &role,
            scope,
            format!("granted role '{}' to '{user_id}' in {scope}", role.name()),
        )
        .await;

        Ok(outcome.assignment)
    }

    /// Removes a role assignment. Returns whether a row was removed; absence is not an error.
    pub async fn revoke(
        &self,
        user_id: &UserId,
        role_id: RoleId,
        scope: &Scope,
        revoked_by: &UserId,
    ) -> AppResult<bool> {
        let removed = self
            .assignment_repository
            .delete_assignment(&AssignmentKey {
                user_id: user_id.clone(),
                role_id,
                scope: scope.clone(),
            })
            .await?;

        if !removed {
            return Ok(false);
        }

        self.authorization_service.invalidate_user(user_id).await?;

        let role_name = self
            .role_repository
            .find_role(role_id)
            .await?
            .map_or_else(|| role_id.to_string(), |role| role.name().to_string());

        info!(
            user_id = %user_id,
            role = %role_name,
            scope = %scope,
            revoked_by = %revoked_by,
            "role revoked"
        );

        append_audit_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                actor: revoked_by.clone(),
                action: AuditAction::RoleRevoked,
                target: user_id.to_string(),
                role_id,
                role_name: role_name.clone(),
                scope: scope.clone(),
                occurred_at: Utc::now(),
                detail: Some(format!(
                    "revoked role '{role_name}' from '{user_id}' in {scope}"
                )),
            },
        )
        .await;

        Ok(true)
    }

    /// Removes every assignment a user holds in one scope, e.g. when leaving an organization.
    pub async fn revoke_all_in_scope(
        &self,
        user_id: &UserId,
        scope_id: &ScopeId,
        revoked_by: &UserId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let removed = self
            .assignment_repository
            .delete_assignments_in_scope(user_id, scope_id)
            .await?;

        if removed.is_empty() {
            return Ok(removed);
        }

        self.authorization_service.invalidate_user(user_id).await?;

        let scope = Scope::Scoped(scope_id.clone());
        info!(
            user_id = %user_id,
            scope = %scope,
            removed = removed.len(),
            revoked_by = %revoked_by,
            "scope assignments revoked"
        );

        for assignment in &removed {
            let role_name = self
                .role_repository
                .find_role(assignment.role_id())
                .await?
                .map_or_else(
                    || assignment.role_id().to_string(),
                    |role| role.name().to_string(),
                );

            append_audit_event(
                self.audit_repository.as_ref(),
                AuditEvent {
                    actor: revoked_by.clone(),
                    action: AuditAction::RoleRevoked,
                    target: user_id.to_string(),
                    role_id: assignment.role_id(),
                    role_name: role_name.clone(),
                    scope: scope.clone(),
                    occurred_at: Utc::now(),
                    detail: Some(format!(
                        "revoked role '{role_name}' from '{user_id}' in {scope} (scope removal)"
                    )),
                },
            )
            .await;
        }

        Ok(removed)
    }

    /// Lists a user's assignments, optionally restricted to assignments bound to one scope.
    pub async fn list_for_user(
        &self,
        user_id: &UserId,
        scope: Option<&Scope>,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut assignments = self
            .assignment_repository
            .list_assignments_for_user(user_id)
            .await?;

        if let Some(scope) = scope {
            assignments.retain(|assignment| assignment.scope() == scope);
        }

        Ok(assignments)
    }

    /// Lists every assignment referencing a role.
    pub async fn list_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleAssignment>> {
        self.assignment_repository
            .list_assignments_for_role(role_id)
            .await
    }

    async fn require_role(&self, role_id: RoleId) -> AppResult<Role> {
        self.role_repository
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }

    async fn append_assignment_event(
        &self,
        actor: &UserId,
        action: AuditAction,
        user_id: &UserId,
        role: &Role,
        scope: &Scope,
        detail: String,
    ) {
        append_audit_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                actor: actor.clone(),
                action,
                target: user_id.to_string(),
                role_id: role.id(),
                role_name: role.name().to_string(),
                scope: scope.clone(),
                occurred_at: Utc::now(),
                detail: Some(detail),
            },
        )
        .await;
    }
}
