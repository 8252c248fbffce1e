//! The single resolution algorithm shared by `resolve` and `explain`.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use warden_core::{Scope, UserId};
use warden_domain::{Permission, Role, RoleAssignment, RoleId, RoleName};

/// How one stored assignment was treated during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// Assignment applies and its role contributed permissions.
    Applied,
    /// Assignment is bound to another scope.
    ScopeMismatch,
    /// Assignment applies but its role was already contributed by another assignment.
    DuplicateRole,
    /// Assignment applies but references a role that no longer exists.
    RoleMissing,
}

/// One assignment found for the user, with the resolver's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentTrace {
    /// Referenced role.
    pub role_id: RoleId,
    /// Role name, when the role exists.
    pub role_name: Option<RoleName>,
    /// Scope of the assignment.
    pub scope: Scope,
    /// User who granted it.
    pub granted_by: UserId,
    /// Grant timestamp.
    pub granted_at: DateTime<Utc>,
    /// Verdict.
    pub outcome: AssignmentOutcome,
}

/// Why a role participated in the resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContributionSource {
    /// Reached through an explicit assignment in this scope.
    Assignment {
        /// Scope of the first assignment that reached the role.
        scope: Scope,
    },
    /// Reached through the default-role fallback.
    DefaultFallback,
}

/// Permissions one role contributed to the final set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleContribution {
    /// Contributing role.
    pub role_id: RoleId,
    /// Role name.
    pub role_name: RoleName,
    /// Role level, informational only.
    pub level: u16,
    /// How the role was reached.
    pub source: ContributionSource,
    /// Every permission the role grants.
    pub permissions: BTreeSet<Permission>,
    /// Permissions not already granted by a higher-ranked contribution.
    pub new_permissions: BTreeSet<Permission>,
}

/// Outcome of the default-role fallback check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum FallbackDecision {
    /// User holds at least one applicable assignment, so no fallback.
    NotNeeded {
        /// Number of applicable assignments found.
        applicable_assignments: usize,
    },
    /// No applicable assignment and a default role exists.
    Applied {
        /// Default role id.
        role_id: RoleId,
        /// Default role name.
        role_name: RoleName,
    },
    /// No applicable assignment and no default role is configured.
    NoDefaultRole,
}

/// Resolution with its intermediate state retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    /// Resolved user.
    pub user_id: UserId,
    /// Requested scope.
    pub scope: Scope,
    /// Every assignment found for the user, in any scope.
    pub assignments: Vec<AssignmentTrace>,
    /// Roles that contributed, highest level first.
    pub contributions: Vec<RoleContribution>,
    /// Default-role fallback decision.
    pub fallback: FallbackDecision,
    /// Effective permission set.
    pub final_permissions: BTreeSet<Permission>,
}

impl DiagnosticReport {
    /// Returns the highest level among contributing roles.
    #[must_use]
    pub fn highest_level(&self) -> Option<u16> {
        self.contributions
            .iter()
            .map(|contribution| contribution.level)
            .max()
    }

    /// Returns the number of assignments that apply to the requested scope.
    #[must_use]
    pub fn applicable_assignment_count(&self) -> usize {
        self.assignments
            .iter()
            .filter(|trace| trace.outcome != AssignmentOutcome::ScopeMismatch)
            .count()
    }

    /// Returns whether any applicable assignment points at a missing role.
    #[must_use]
    pub fn has_dangling_assignments(&self) -> bool {
        self.assignments
            .iter()
            .any(|trace| trace.outcome == AssignmentOutcome::RoleMissing)
    }
}

/// Resolves a user's effective permissions in `scope` from loaded records.
///
/// `roles` must contain every role referenced by an applicable assignment that still
/// exists. Permissions are the union over distinct applicable roles. The default
/// role is used only when no assignment applies at all, never to top up an
/// assignment that grants nothing.
#[must_use]
pub fn evaluate(
    user_id: &UserId,
    scope: &Scope,
    assignments: &[RoleAssignment],
    roles: &HashMap<RoleId, Role>,
    default_role: Option<&Role>,
) -> DiagnosticReport {
    let mut traces = Vec::with_capacity(assignments.len());
    let mut reached: Vec<(&Role, Scope)> = Vec::new();
    let mut seen_roles: HashSet<RoleId> = HashSet::new();
    let mut applicable_assignments = 0_usize;

    for assignment in assignments {
        let role = roles.get(&assignment.role_id());
        let outcome = if !assignment.applies_to(scope) {
            AssignmentOutcome::ScopeMismatch
        } else {
            applicable_assignments += 1;
            match role {
                None => AssignmentOutcome::RoleMissing,
                Some(role) if !seen_roles.insert(role.id()) => AssignmentOutcome::DuplicateRole,
                Some(role) => {
                    reached.push((role, assignment.scope().clone()));
                    AssignmentOutcome::Applied
                }
            }
        };

        traces.push(AssignmentTrace {
            role_id: assignment.role_id(),
            role_name: role.map(|role| role.name().clone()),
            scope: assignment.scope().clone(),
            granted_by: assignment.granted_by().clone(),
            granted_at: assignment.granted_at(),
            outcome,
        });
    }

    reached.sort_by(|(left, _), (right, _)| {
        right
            .level()
            .cmp(&left.level())
            .then_with(|| left.name().cmp(right.name()))
    });

    let mut final_permissions = BTreeSet::new();
    let mut contributions = Vec::with_capacity(reached.len());
    for (role, assignment_scope) in reached {
        contributions.push(contribute(
            role,
            ContributionSource::Assignment {
                scope: assignment_scope,
            },
            &mut final_permissions,
        ));
    }

    let fallback = if applicable_assignments > 0 {
        FallbackDecision::NotNeeded {
            applicable_assignments,
        }
    } else if let Some(default_role) = default_role {
        contributions.push(contribute(
            default_role,
            ContributionSource::DefaultFallback,
            &mut final_permissions,
        ));
        FallbackDecision::Applied {
            role_id: default_role.id(),
            role_name: default_role.name().clone(),
        }
    } else {
        FallbackDecision::NoDefaultRole
    };

    DiagnosticReport {
        user_id: user_id.clone(),
        scope: scope.clone(),
        assignments: traces,
        contributions,
        fallback,
        final_permissions,
    }
}

fn contribute(
    role: &Role,
    source: ContributionSource,
    final_permissions: &mut BTreeSet<Permission>,
) -> RoleContribution {
    let new_permissions = role
        .permissions()
        .iter()
        .copied()
        .filter(|permission| final_permissions.insert(*permission))
        .collect();

    RoleContribution {
        role_id: role.id(),
        role_name: role.name().clone(),
        level: role.level(),
        source,
        permissions: role.permissions().clone(),
        new_permissions,
    }
}
