use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};
use warden_core::{AppError, AppResult, Scope, UserId};
use warden_domain::{Permission, Role, RoleId};

use crate::rbac_ports::{AssignmentRepository, PermissionCache, RoleRepository};

mod diagnostics;
mod evaluation;


pub use diagnostics::PermissionExplanation;
pub use evaluation::{
    AssignmentOutcome, AssignmentTrace, ContributionSource, DiagnosticReport, FallbackDecision,
    RoleContribution, evaluate,
};

/// Permission resolver and authorization checks.
///
/// Every answer is derived from [`evaluate`]; the cache only short-circuits the
/// store reads in front of it.
#[derive(Clone)]
pub struct AuthorizationService {
    role_repository: Arc<dyn RoleRepository>,
    assignment_repository: Arc<dyn AssignmentRepository>,
    permission_cache: Option<Arc<dyn PermissionCache>>,
    permission_cache_ttl_seconds: u32,
}

impl AuthorizationService {
    /// Creates a resolver over the role and assignment stores.
    #[must_use]
    pub fn new(
        role_repository: Arc<dyn RoleRepository>,
        assignment_repository: Arc<dyn AssignmentRepository>,
    ) -> Self {
        Self {
            role_repository,
            assignment_repository,
            permission_cache: None,
            permission_cache_ttl_seconds: 0,
        }
    }

    /// Adds resolution caching. A ttl of zero disables reads and writes.
    #[must_use]
    pub fn with_permission_cache(
        mut self,
        permission_cache: Arc<dyn PermissionCache>,
        ttl_seconds: u32,
    ) -> Self {
        self.permission_cache = Some(permission_cache);
        self.permission_cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Computes the effective permission set of a user in a scope.
    pub async fn resolve(&self, user_id: &UserId, scope: &Scope) -> AppResult<BTreeSet<Permission>> {
        let Some(cache) = self.active_cache() else {
            return Ok(self.evaluate_from_store(user_id, scope).await?.final_permissions);
        };

        match cache.get_permissions(user_id, scope).await {
            Ok(Some(permissions)) => return Ok(permissions),
            Ok(None) => {}
            Err(error) => warn!(
                user_id = %user_id,
                scope = %scope,
                error = %error,
                "permission cache read failed, resolving from store"
            ),
        }

        // The epoch must be read before the store so a concurrent invalidation
        // rejects the write below.
        let epoch = match cache.current_epoch().await {
            Ok(epoch) => Some(epoch),
            Err(error) => {
                warn!(
                    user_id = %user_id,
                    scope = %scope,
                    error = %error,
                    "permission cache epoch read failed, skipping cache write"
                );
                None
            }
        };

        let permissions = self.evaluate_from_store(user_id, scope).await?.final_permissions;

        if let Some(epoch) = epoch {
            match cache
                .set_permissions(
                    user_id,
                    scope,
                    &permissions,
                    epoch,
                    self.permission_cache_ttl_seconds,
                )
                .await
            {
                Ok(true) => {}
                Ok(false) => debug!(
                    user_id = %user_id,
                    scope = %scope,
                    "permission cache invalidated during resolution, result not cached"
                ),
                Err(error) => warn!(
                    user_id = %user_id,
                    scope = %scope,
                    error = %error,
                    "permission cache write failed"
                ),
            }
        }

        Ok(permissions)
    }

    /// Returns whether the user holds the permission in the scope.
    pub async fn has_permission(
        &self,
        user_id: &UserId,
        scope: &Scope,
        permission: Permission,
    ) -> AppResult<bool> {
        Ok(self.resolve(user_id, scope).await?.contains(&permission))
    }

    /// Ensures the user holds the permission in the scope.
    pub async fn require_permission(
        &self,
        user_id: &UserId,
        scope: &Scope,
        permission: Permission,
    ) -> AppResult<()> {
        if self.has_permission(user_id, scope, permission).await? {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{user_id}' is missing permission '{permission}' in {scope}"
        )))
    }

    /// Drops cached resolutions of one user. Called after assignment writes commit.
    pub async fn invalidate_user(&self, user_id: &UserId) -> AppResult<()> {
        match &self.permission_cache {
            Some(cache) => cache.invalidate_user(user_id).await,
            None => Ok(()),
        }
    }

    /// Drops every cached resolution. Called after role writes commit.
    pub async fn invalidate_all(&self) -> AppResult<()> {
        match &self.permission_cache {
            Some(cache) => cache.invalidate_all().await,
            None => Ok(()),
        }
    }

    fn active_cache(&self) -> Option<&Arc<dyn PermissionCache>> {
        self.permission_cache
            .as_ref()
            .filter(|_| self.permission_cache_ttl_seconds > 0)
    }

    async fn evaluate_from_store(
        &self,
        user_id: &UserId,
        scope: &Scope,
    ) -> AppResult<DiagnosticReport> {
        let assignments = self
            .assignment_repository
            .list_assignments_for_user(user_id)
            .await?;

        let mut applicable_role_ids: Vec<RoleId> = assignments
            .iter()
            .filter(|assignment| assignment.applies_to(scope))
            .map(|assignment| assignment.role_id())
            .collect();
        applicable_role_ids.sort_unstable();
        applicable_role_ids.dedup();

        let roles: HashMap<RoleId, Role> = if applicable_role_ids.is_empty() {
            HashMap::new()
        } else {
            self.role_repository
                .find_roles(&applicable_role_ids)
                .await?
                .into_iter()
                .map(|role| (role.id(), role))
                .collect()
        };

        let default_role = if applicable_role_ids.is_empty() {
            self.role_repository.find_default_role().await?
        } else {
            None
        };

        let report = evaluate(user_id, scope, &assignments, &roles, default_role.as_ref());

        if report.has_dangling_assignments() {
            warn!(
                user_id = %user_id,
                scope = %scope,
                "assignments reference missing roles and were skipped"
            );
        }

        Ok(report)
    }
}
