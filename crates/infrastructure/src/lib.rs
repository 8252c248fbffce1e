//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_permission_cache;
mod in_memory_rbac_repository;
mod postgres_audit_repository;
mod postgres_rbac_repository;
mod redis_permission_cache;
mod tracing_audit_repository;

pub use in_memory_permission_cache::InMemoryPermissionCache;
pub use in_memory_rbac_repository::InMemoryRbacRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_rbac_repository::PostgresRbacRepository;
pub use redis_permission_cache::RedisPermissionCache;
pub use tracing_audit_repository::TracingAuditRepository;

/// Embedded SQL migrations for the RBAC schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
