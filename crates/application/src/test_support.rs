use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use warden_core::{Actor, AppError, AppResult, Scope, ScopeId, UserId};
use warden_domain::{
    AssignmentKey, Permission, Role, RoleAssignment, RoleDefinitionInput, RoleId, RoleName,
    RoleSeedTable,
};

use crate::rbac_ports::{
    AssignmentRepository, AuditEvent, AuditRepository, GrantOutcome, PermissionCache,
    RoleRepository,
};
use crate::{AssignmentService, AuthorizationService, RoleAdminService};

#[derive(Default)]
pub(crate) struct FakeRbacStore {
    roles: Mutex<Vec<Role>>,
    assignments: Mutex<Vec<RoleAssignment>>,
}

impl FakeRbacStore {
    pub(crate) async fn put_role(&self, role: Role) {
        self.roles.lock().await.push(role);
    }

    pub(crate) async fn put_assignment(&self, assignment: RoleAssignment) {
        self.assignments.lock().await.push(assignment);
    }

    pub(crate) async fn remove_role_unchecked(&self, role_id: RoleId) {
        self.roles.lock().await.retain(|role| role.id() != role_id);
    }

    pub(crate) async fn assignment_count(&self) -> usize {
        self.assignments.lock().await.len()
    }
}

#[async_trait]
impl RoleRepository for FakeRbacStore {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        Ok(self.roles.lock().await.clone())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .find(|role| role.id() == role_id)
            .cloned())
    }

    async fn find_role_by_name(&self, name: &RoleName) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .find(|role| role.name() == name)
            .cloned())
    }

    async fn find_roles(&self, role_ids: &[RoleId]) -> AppResult<Vec<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .filter(|role| role_ids.contains(&role.id()))
            .cloned()
            .collect())
    }

    async fn find_default_role(&self) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .find(|role| role.is_default())
            .cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<Role> {
        let mut roles = self.roles.lock().await;
        if roles.iter().any(|stored| stored.name() == role.name()) {
            return Err(AppError::Validation(format!(
                "role '{}' already exists",
                role.name()
            )));
        }
        if role.is_default() && roles.iter().any(Role::is_default) {
            return Err(AppError::Conflict("a default role already exists".to_owned()));
        }
        roles.push(role.clone());
        Ok(role)
    }

    async fn update_role_permissions(
        &self,
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Role> {
        let mut roles = self.roles.lock().await;
        let role = roles
            .iter_mut()
            .find(|role| role.id() == role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;
        role.replace_permissions(permissions, updated_at);
        Ok(role.clone())
    }

    async fn set_default_role(
        &self,
        role_id: Option<RoleId>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Option<Role>> {
        let mut roles = self.roles.lock().await;
        if let Some(role_id) = role_id
            && !roles.iter().any(|role| role.id() == role_id)
        {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }

        let mut current = None;
        for role in roles.iter_mut() {
            let is_default = Some(role.id()) == role_id;
            if role.is_default() != is_default {
                role.set_default(is_default, updated_at);
            }
            if is_default {
                current = Some(role.clone());
            }
        }
        Ok(current)
    }

    async fn delete_role_if_unassigned(&self, role_id: RoleId) -> AppResult<()> {
        let mut roles = self.roles.lock().await;
        let assignments = self.assignments.lock().await;
        let role = roles
            .iter()
            .find(|role| role.id() == role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;
        if role.is_system() {
            return Err(AppError::Conflict("system role".to_owned()));
        }
        if assignments
            .iter()
            .any(|assignment| assignment.role_id() == role_id)
        {
            return Err(AppError::Conflict("role is assigned".to_owned()));
        }
        roles.retain(|role| role.id() != role_id);
        Ok(())
    }
}

#[async_trait]
impl AssignmentRepository for FakeRbacStore {
    async fn insert_assignment_if_absent(
        &self,
        assignment: RoleAssignment,
    ) -> AppResult<GrantOutcome> {
        let roles = self.roles.lock().await;
        let mut assignments = self.assignments.lock().await;
        if !roles.iter().any(|role| role.id() == assignment.role_id()) {
            return Err(AppError::NotFound(format!(
                "role '{}' was not found",
                assignment.role_id()
            )));
        }

        let key = assignment.key();
        if let Some(existing) = assignments.iter().find(|stored| stored.key() == key) {
            return Ok(GrantOutcome {
                assignment: existing.clone(),
                created: false,
            });
        }

        assignments.push(assignment.clone());
        Ok(GrantOutcome {
            assignment,
            created: true,
        })
    }

    async fn delete_assignment(&self, key: &AssignmentKey) -> AppResult<bool> {
        let mut assignments = self.assignments.lock().await;
        let before = assignments.len();
        assignments.retain(|assignment| &assignment.key() != key);
        Ok(assignments.len() != before)
    }

    async fn delete_assignments_in_scope(
        &self,
        user_id: &UserId,
        scope_id: &ScopeId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut assignments = self.assignments.lock().await;
        let (removed, kept): (Vec<_>, Vec<_>) =
            assignments.drain(..).partition(|assignment| {
                assignment.user_id() == user_id
                    && assignment.scope().scope_id() == Some(scope_id)
            });
        *assignments = kept;
        Ok(removed)
    }

    async fn list_assignments_for_user(
        &self,
        user_id: &UserId,
    ) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .assignments
            .lock()
            .await
            .iter()
            .filter(|assignment| assignment.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn list_assignments_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .assignments
            .lock()
            .await
            .iter()
            .filter(|assignment| assignment.role_id() == role_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    pub(crate) events: Mutex<Vec<AuditEvent>>,
    pub(crate) fail: bool,
}

#[async_trait]
impl AuditRepository for FakeAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        if self.fail {
            return Err(AppError::Internal("audit sink unavailable".to_owned()));
        }
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakePermissionCache {
    pub(crate) entries: Mutex<HashMap<(UserId, Scope), BTreeSet<Permission>>>,
    pub(crate) user_invalidations: Mutex<Vec<UserId>>,
    pub(crate) full_invalidations: Mutex<usize>,
    pub(crate) epoch: Mutex<u64>,
}

#[async_trait]
impl PermissionCache for FakePermissionCache {
    async fn get_permissions(
        &self,
        user_id: &UserId,
        scope: &Scope,
    ) -> AppResult<Option<BTreeSet<Permission>>> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(user_id.clone(), scope.clone()))
            .cloned())
    }

    async fn current_epoch(&self) -> AppResult<u64> {
        Ok(*self.epoch.lock().await)
    }

    async fn set_permissions(
        &self,
        user_id: &UserId,
        scope: &Scope,
        permissions: &BTreeSet<Permission>,
        epoch: u64,
        _ttl_seconds: u32,
    ) -> AppResult<bool> {
        let current = self.epoch.lock().await;
        if *current != epoch {
            return Ok(false);
        }
        self.entries
            .lock()
            .await
            .insert((user_id.clone(), scope.clone()), permissions.clone());
        Ok(true)
    }

    async fn invalidate_user(&self, user_id: &UserId) -> AppResult<()> {
        let mut epoch = self.epoch.lock().await;
        *epoch += 1;
        self.entries
            .lock()
            .await
            .retain(|(cached_user_id, _), _| cached_user_id != user_id);
        self.user_invalidations.lock().await.push(user_id.clone());
        Ok(())
    }

    async fn invalidate_all(&self) -> AppResult<()> {
        let mut epoch = self.epoch.lock().await;
        *epoch += 1;
        self.entries.lock().await.clear();
        *self.full_invalidations.lock().await += 1;
        Ok(())
    }
}

pub(crate) struct Harness {
    pub(crate) store: Arc<FakeRbacStore>,
    pub(crate) audit: Arc<FakeAuditRepository>,
    pub(crate) cache: Arc<FakePermissionCache>,
    pub(crate) authorization: AuthorizationService,
    pub(crate) role_admin: RoleAdminService,
    pub(crate) assignments: AssignmentService,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::build(FakeAuditRepository::default(), 30)
    }

    pub(crate) fn with_failing_audit() -> Self {
        Self::build(
            FakeAuditRepository {
                events: Mutex::new(Vec::new()),
                fail: true,
            },
            30,
        )
    }

    pub(crate) fn with_cache_ttl(ttl_seconds: u32) -> Self {
        Self::build(FakeAuditRepository::default(), ttl_seconds)
    }

    fn build(audit: FakeAuditRepository, ttl_seconds: u32) -> Self {
        let store = Arc::new(FakeRbacStore::default());
        let audit = Arc::new(audit);
        let cache = Arc::new(FakePermissionCache::default());

        let authorization = AuthorizationService::new(store.clone(), store.clone())
            .with_permission_cache(cache.clone(), ttl_seconds);
        let role_admin = RoleAdminService::new(
            authorization.clone(),
            store.clone(),
            store.clone(),
            audit.clone(),
        );
        let assignments = AssignmentService::new(
            authorization.clone(),
            store.clone(),
            store.clone(),
            audit.clone(),
        );

        Self {
            store,
            audit,
            cache,
            authorization,
            role_admin,
            assignments,
        }
    }

    /// Seeds the built-in table and returns the roles keyed by name.
    pub(crate) async fn seed_builtin(&self) -> HashMap<String, Role> {
        let table = RoleSeedTable::builtin().unwrap_or_else(|_| unreachable!());
        self.role_admin
            .seed_defaults(&Actor::system(), &table)
            .await
            .unwrap_or_else(|_| unreachable!())
            .roles()
            .into_iter()
            .map(|role| (role.name().to_string(), role))
            .collect()
    }

    pub(crate) async fn grant(&self, user_id: &UserId, role: &Role, scope: &Scope) {
        self.assignments
            .grant(user_id, role.id(), scope, &system_user())
            .await
            .unwrap_or_else(|_| unreachable!());
    }
}

pub(crate) fn user(value: &str) -> UserId {
    UserId::new(value).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn system_user() -> UserId {
    Actor::system().user_id().clone()
}

pub(crate) fn scope(value: &str) -> Scope {
    Scope::Scoped(ScopeId::new(value).unwrap_or_else(|_| unreachable!()))
}

pub(crate) fn scope_id(value: &str) -> ScopeId {
    ScopeId::new(value).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn role(name: &str, level: u16, permissions: &[Permission], is_default: bool) -> Role {
    Role::new(RoleDefinitionInput {
        name: name.to_owned(),
        display_name: String::new(),
        description: None,
        permissions: permissions.to_vec(),
        level,
        is_system: false,
        is_default,
    })
    .unwrap_or_else(|_| unreachable!())
}
