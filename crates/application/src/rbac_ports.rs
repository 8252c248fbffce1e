mod assignments;
mod audit;
mod cache;
mod roles;

pub use assignments::{AssignmentRepository, GrantOutcome};
pub use audit::{AuditEvent, AuditRepository};
pub use cache::PermissionCache;
pub use roles::{DefineRoleInput, RoleRepository};
