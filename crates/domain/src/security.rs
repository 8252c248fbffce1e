use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_core::AppError;

/// Closed catalog of permissions recognized by the platform.
///
/// Every permission is a `resource:action` pair; the storage value returned by
/// [`Permission::as_str`] is the only accepted spelling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Permission {
    /// Allows reading organization profile data.
    OrganizationsRead,
    /// Allows editing organization profile data.
    OrganizationsUpdate,
    /// Allows deleting an organization.
    OrganizationsDelete,
    /// Allows reading workspaces.
    WorkspacesRead,
    /// Allows creating workspaces.
    WorkspacesCreate,
    /// Allows editing workspaces.
    WorkspacesUpdate,
    /// Allows deleting workspaces.
    WorkspacesDelete,
    /// Allows listing members.
    MembersRead,
    /// Allows inviting members.
    MembersInvite,
    /// Allows changing member profiles.
    MembersUpdate,
    /// Allows removing members.
    MembersRemove,
    /// Allows reading role definitions.
    RolesRead,
    /// Allows granting and revoking roles.
    RolesAssign,
    /// Allows defining and editing roles.
    RolesManage,
    /// Allows reading agents.
    AgentsRead,
    /// Allows creating agents.
    AgentsCreate,
    /// Allows editing agents.
    AgentsUpdate,
    /// Allows deleting agents.
    AgentsDelete,
    /// Allows running agents.
    AgentsExecute,
    /// Allows reading workflows.
    WorkflowsRead,
    /// Allows creating workflows.
    WorkflowsCreate,
    /// Allows editing workflows.
    WorkflowsUpdate,
    /// Allows deleting workflows.
    WorkflowsDelete,
    /// Allows running workflows.
    WorkflowsExecute,
    /// Allows reading datasets.
    DatasetsRead,
    /// Allows uploading datasets.
    DatasetsCreate,
    /// Allows editing datasets.
    DatasetsUpdate,
    /// Allows deleting datasets.
    DatasetsDelete,
    /// Allows reading fine-tuning jobs.
    FineTuningRead,
    /// Allows starting fine-tuning jobs.
    FineTuningCreate,
    /// Allows cancelling fine-tuning jobs.
    FineTuningCancel,
    /// Allows listing API keys.
    ApiKeysRead,
    /// Allows issuing API keys.
    ApiKeysCreate,
    /// Allows revoking API keys.
    ApiKeysRevoke,
    /// Allows reading invoices and usage.
    BillingRead,
    /// Allows changing plans and payment methods.
    BillingManage,
    /// Allows reading the audit log.
    AuditRead,
    /// Allows reading settings.
    SettingsRead,
    /// Allows changing settings.
    SettingsUpdate,
    /// Allows viewing dashboards.
    DashboardsRead,
}

impl Permission {
    /// Returns a stable storage value for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrganizationsRead => "organizations:read",
            Self::OrganizationsUpdate => "organizations:update",
            Self::OrganizationsDelete => "organizations:delete",
            Self::WorkspacesRead => "workspaces:read",
            Self::WorkspacesCreate => "workspaces:create",
            Self::WorkspacesUpdate => "workspaces:update",
            Self::WorkspacesDelete => "workspaces:delete",
            Self::MembersRead => "members:read",
            Self::MembersInvite => "members:invite",
            Self::MembersUpdate => "members:update",
            Self::MembersRemove => "members:remove",
            Self::RolesRead => "roles:read",
            Self::RolesAssign => "roles:assign",
            Self::RolesManage => "roles:manage",
            Self::AgentsRead => "agents:read",
            Self::AgentsCreate => "agents:create",
            Self::AgentsUpdate => "agents:update",
            Self::AgentsDelete => "agents:delete",
            Self::AgentsExecute => "agents:execute",
            Self::WorkflowsRead => "workflows:read",
            Self::WorkflowsCreate => "workflows:create",
            Self::WorkflowsUpdate => "workflows:update",
            Self::WorkflowsDelete => "workflows:delete",
            Self::WorkflowsExecute => "workflows:execute",
            Self::DatasetsRead => "datasets:read",
            Self::DatasetsCreate => "datasets:create",
            Self::DatasetsUpdate => "datasets:update",
            Self::DatasetsDelete => "datasets:delete",
            Self::FineTuningRead => "fine_tuning:read",
            Self::FineTuningCreate => "fine_tuning:create",
            Self::FineTuningCancel => "fine_tuning:cancel",
            Self::ApiKeysRead => "api_keys:read",
            Self::ApiKeysCreate => "api_keys:create",
            Self::ApiKeysRevoke => "api_keys:revoke",
            Self::BillingRead => "billing:read",
            Self::BillingManage => "billing:manage",
            Self::AuditRead => "audit:read",
            Self::SettingsRead => "settings:read",
            Self::SettingsUpdate => "settings:update",
            Self::DashboardsRead => "dashboards:read",
        }
    }

    /// Returns all known permissions in catalog order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Permission] = &[
            Permission::OrganizationsRead,
            Permission::OrganizationsUpdate,
            Permission::OrganizationsDelete,
            Permission::WorkspacesRead,
            Permission::WorkspacesCreate,
            Permission::WorkspacesUpdate,
            Permission::WorkspacesDelete,
            Permission::MembersRead,
            Permission::MembersInvite,
            Permission::MembersUpdate,
            Permission::MembersRemove,
            Permission::RolesRead,
            Permission::RolesAssign,
            Permission::RolesManage,
            Permission::AgentsRead,
            Permission::AgentsCreate,
            Permission::AgentsUpdate,
            Permission::AgentsDelete,
            Permission::AgentsExecute,
            Permission::WorkflowsRead,
            Permission::WorkflowsCreate,
            Permission::WorkflowsUpdate,
            Permission::WorkflowsDelete,
            Permission::WorkflowsExecute,
            Permission::DatasetsRead,
            Permission::DatasetsCreate,
            Permission::DatasetsUpdate,
            Permission::DatasetsDelete,
            Permission::FineTuningRead,
            Permission::FineTuningCreate,
            Permission::FineTuningCancel,
            Permission::ApiKeysRead,
            Permission::ApiKeysCreate,
            Permission::ApiKeysRevoke,
            Permission::BillingRead,
            Permission::BillingManage,
            Permission::AuditRead,
            Permission::SettingsRead,
            Permission::SettingsUpdate,
            Permission::DashboardsRead,
        ];

        ALL
    }

    /// Returns the resource half of the permission.
    #[must_use]
    pub fn resource(&self) -> &'static str {
        self.as_str()
            .split_once(':')
            .map_or(self.as_str(), |(resource, _)| resource)
    }

    /// Returns the action half of the permission.
    #[must_use]
    pub fn action(&self) -> &'static str {
        self.as_str()
            .split_once(':')
            .map_or(self.as_str(), |(_, action)| action)
    }

    /// Returns whether the permission only grants read access.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.action() == "read"
    }

    /// Parses a list of transport values, rejecting the first unknown entry.
    pub fn parse_all<I, S>(values: I) -> Result<Vec<Self>, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|value| Self::from_str(value.as_ref()))
            .collect()
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        Self::all()
            .iter()
            .copied()
            .find(|permission| permission.as_str() == normalized)
            .ok_or_else(|| {
                AppError::Validation(format!("unknown permission value '{value}'"))
            })
    }
}

impl TryFrom<String> for Permission {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.as_str().to_owned()
    }
}

impl Display for Permission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Stable audit actions emitted by the RBAC engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a role is defined.
    RoleCreated,
    /// Emitted when a role's permission set is replaced.
    RolePermissionsUpdated,
    /// Emitted when a role is deleted.
    RoleDeleted,
    /// Emitted when the deployment default role changes.
    RoleDefaultChanged,
    /// Emitted when a role is granted to a user.
    RoleGranted,
    /// Emitted when a role assignment is removed.
    RoleRevoked,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleCreated => "role.created",
            Self::RolePermissionsUpdated => "role.permissions_updated",
            Self::RoleDeleted => "role.deleted",
            Self::RoleDefaultChanged => "role.default_changed",
            Self::RoleGranted => "role.granted",
            Self::RoleRevoked => "role.revoked",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::Permission;

    #[test]
    fn permission_roundtrip_storage_value() {
        for permission in Permission::all() {
            let restored = Permission::from_str(permission.as_str());
            assert_eq!(restored.ok(), Some(*permission));
        }
    }

    #[test]
    fn catalog_has_forty_unique_entries() {
        let values: HashSet<&str> = Permission::all()
            .iter()
            .map(Permission::as_str)
            .collect();
        assert_eq!(values.len(), 40);
        assert_eq!(Permission::all().len(), 40);
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let parsed = Permission::from_str("agents:teleport");
        assert!(parsed.is_err());
    }

    #[test]
    fn permission_splits_into_resource_and_action() {
        assert_eq!(Permission::FineTuningCancel.resource(), "fine_tuning");
        assert_eq!(Permission::FineTuningCancel.action(), "cancel");
        assert!(Permission::AgentsRead.is_read_only());
        assert!(!Permission::AgentsDelete.is_read_only());
    }

    #[test]
    fn permission_deserialization_validates_catalog() {
        let parsed: Result<Vec<Permission>, _> =
            serde_json::from_str(r#"["agents:read", "billing:read"]"#);
        assert_eq!(
            parsed.ok(),
            Some(vec![Permission::AgentsRead, Permission::BillingRead])
        );

        let rejected: Result<Vec<Permission>, _> = serde_json::from_str(r#"["agents:fly"]"#);
        assert!(rejected.is_err());
    }

    proptest! {
        #[test]
        fn arbitrary_strings_parse_only_when_in_catalog(value in "[a-z_]{1,12}:[a-z]{1,8}") {
            let known = Permission::all().iter().any(|permission| permission.as_str() == value);
            prop_assert_eq!(Permission::from_str(value.as_str()).is_ok(), known);
        }
    }
}
