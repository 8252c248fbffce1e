use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;
use warden_application::{
    AssignmentRepository, AssignmentService, AuditRepository, AuthorizationService,
    PermissionCache, RoleAdminService, RoleRepository,
};
use warden_core::{Actor, AppError};
use warden_infrastructure::{
    InMemoryPermissionCache, InMemoryRbacRepository, PostgresAuditRepository,
    PostgresRbacRepository, RedisPermissionCache, TracingAuditRepository,
};

use crate::admin_config::AdminConfig;

mod database;
mod redis;

pub use database::{connect, run_migrations};
pub use self::redis::build_redis_client;

#[derive(Clone)]
pub struct AdminServices {
    pub authorization_service: AuthorizationService,
    pub role_admin_service: RoleAdminService,
    pub assignment_service: AssignmentService,
}

struct RepositorySet {
    role_repository: Arc<dyn RoleRepository>,
    assignment_repository: Arc<dyn AssignmentRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl RepositorySet {
    fn in_memory() -> Self {
        let store = Arc::new(InMemoryRbacRepository::new());
        Self {
            role_repository: store.clone(),
            assignment_repository: store,
            audit_repository: Arc::new(TracingAuditRepository::new()),
        }
    }

    fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PostgresRbacRepository::new(pool.clone()));
        Self {
            role_repository: store.clone(),
            assignment_repository: store,
            audit_repository: Arc::new(PostgresAuditRepository::new(pool)),
        }
    }
}

/// Wires the services against PostgreSQL.
pub fn build_postgres_services(
    pool: PgPool,
    config: &AdminConfig,
) -> Result<AdminServices, AppError> {
    build_admin_services(RepositorySet::postgres(pool), config)
}

/// Wires the services against a process-local store seeded with the role table.
///
/// Nothing outlives the process, so each invocation starts from the seeded roles.
pub async fn build_in_memory_services(config: &AdminConfig) -> Result<AdminServices, AppError> {
    let services = build_admin_services(RepositorySet::in_memory(), config)?;
    let table = config.role_seed_table()?;
    let outcome = services
        .role_admin_service
        .seed_defaults(&Actor::system(), &table)
        .await?;

    info!(
        table_version = outcome.table_version,
        roles = outcome.created.len(),
        "seeded in-memory role store"
    );

    Ok(services)
}

fn build_admin_services(
    repositories: RepositorySet,
    config: &AdminConfig,
) -> Result<AdminServices, AppError> {
    let permission_cache = build_permission_cache(config)?;

    let authorization_service = AuthorizationService::new(
        repositories.role_repository.clone(),
        repositories.assignment_repository.clone(),
    )
    .with_permission_cache(permission_cache, config.cache_ttl_seconds);

    Ok(AdminServices {
        role_admin_service: RoleAdminService::new(
            authorization_service.clone(),
            repositories.role_repository.clone(),
            repositories.assignment_repository.clone(),
            repositories.audit_repository.clone(),
        ),
        assignment_service: AssignmentService::new(
            authorization_service.clone(),
            repositories.role_repository,
            repositories.assignment_repository,
            repositories.audit_repository,
        ),
        authorization_service,
    })
}

fn build_permission_cache(config: &AdminConfig) -> Result<Arc<dyn PermissionCache>, AppError> {
    match config.redis_url.as_deref() {
        Some(redis_url) => Ok(Arc::new(RedisPermissionCache::new(
            build_redis_client(redis_url)?,
            config.cache_key_prefix.clone(),
        ))),
        None => Ok(Arc::new(InMemoryPermissionCache::new())),
    }
}
