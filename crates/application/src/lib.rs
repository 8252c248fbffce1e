//! Application services and ports.

#![forbid(unsafe_code)]

mod assignment_service;
mod audit_trail;
mod authorization_service;
mod rbac_ports;
mod role_admin_service;

#[cfg(test)]
mod test_support;

pub use assignment_service::AssignmentService;
pub use authorization_service::{
    AssignmentOutcome, AssignmentTrace, AuthorizationService, ContributionSource,
    DiagnosticReport, FallbackDecision, PermissionExplanation, RoleContribution, evaluate,
};
pub use rbac_ports::{
    AssignmentRepository, AuditEvent, AuditRepository, DefineRoleInput, GrantOutcome,
    PermissionCache, RoleRepository,
};
pub use role_admin_service::{RoleAdminService, SeedOutcome};
