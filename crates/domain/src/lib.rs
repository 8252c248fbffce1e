//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod assignment;
mod role;
mod security;
mod seed;

pub use assignment::{AssignmentKey, RoleAssignment};
pub use role::{
    ROLE_LEVEL_MAX, ROLE_NAME_MAX_LENGTH, Role, RoleDefinitionInput, RoleId, RoleName,
    sort_roles_by_rank,
};
pub use security::{AuditAction, Permission};
pub use seed::{RoleSeedEntry, RoleSeedTable};
