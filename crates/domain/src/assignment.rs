use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{Scope, UserId};

use crate::RoleId;

/// Uniqueness key of an assignment: one row per (user, role, scope).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentKey {
    /// Assigned user.
    pub user_id: UserId,
    /// Assigned role.
    pub role_id: RoleId,
    /// Scope the role applies within.
    pub scope: Scope,
}

/// Binding of a user to a role within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    user_id: UserId,
    role_id: RoleId,
    scope: Scope,
    granted_by: UserId,
    granted_at: DateTime<Utc>,
}

impl RoleAssignment {
    /// Creates an assignment stamped with the current time.
    #[must_use]
    pub fn new(key: AssignmentKey, granted_by: UserId) -> Self {
        Self::hydrate(key, granted_by, Utc::now())
    }

    /// Rebuilds an assignment from persisted state.
    #[must_use]
    pub fn hydrate(key: AssignmentKey, granted_by: UserId, granted_at: DateTime<Utc>) -> Self {
        let AssignmentKey {
            user_id,
            role_id,
            scope,
        } = key;

        Self {
            user_id,
            role_id,
            scope,
            granted_by,
            granted_at,
        }
    }

    /// Returns the assigned user.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the assigned role.
    #[must_use]
    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    /// Returns the scope the role applies within.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns the user who created the assignment.
    #[must_use]
    pub fn granted_by(&self) -> &UserId {
        &self.granted_by
    }

    /// Returns the immutable grant timestamp.
    #[must_use]
    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }

    /// Returns the uniqueness key of this assignment.
    #[must_use]
    pub fn key(&self) -> AssignmentKey {
        AssignmentKey {
            user_id: self.user_id.clone(),
            role_id: self.role_id,
            scope: self.scope.clone(),
        }
    }

    /// Returns whether the assignment participates in a resolution for `requested`.
    #[must_use]
    pub fn applies_to(&self, requested: &Scope) -> bool {
        self.scope.applies_to(requested)
    }
}
