//! Role definitions and their invariants.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{AppError, AppResult, NonEmptyString};

use crate::Permission;

/// Highest accepted hierarchy level.
pub const ROLE_LEVEL_MAX: u16 = 1000;

/// Maximum role name length after normalization.
pub const ROLE_NAME_MAX_LENGTH: usize = 64;

/// Unique identifier for a role record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a new random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Parses a role identifier from its textual UUID form.
    pub fn parse(value: &str) -> AppResult<Self> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid role id '{value}': {error}")))
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Case-insensitive role key, stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleName(String);

impl RoleName {
    /// Normalizes and validates a role name.
    ///
    /// Accepts `[a-z0-9_-]` after trimming and lower-casing.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let normalized = value.trim().to_lowercase();

        if normalized.is_empty() {
            return Err(AppError::Validation(
                "role name must not be empty".to_owned(),
            ));
        }

        if normalized.len() > ROLE_NAME_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "role name must not exceed {ROLE_NAME_MAX_LENGTH} characters"
            )));
        }

        if !normalized
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '-'))
        {
            return Err(AppError::Validation(format!(
                "role name '{value}' may only contain letters, digits, '_' and '-'"
            )));
        }

        Ok(Self(normalized))
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for RoleName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoleName> for String {
    fn from(value: RoleName) -> Self {
        value.0
    }
}

impl Display for RoleName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Input for creating a role definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDefinitionInput {
    /// Unique, case-insensitive role name.
    pub name: String,
    /// Presentation name; falls back to `name` when blank.
    pub display_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Catalog permissions granted by the role.
    pub permissions: Vec<Permission>,
    /// Hierarchy rank used for ordering and escalation checks.
    pub level: u16,
    /// Marks a built-in role.
    pub is_system: bool,
    /// Marks the deployment fallback role.
    pub is_default: bool,
}

/// Named, leveled bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: RoleName,
    display_name: NonEmptyString,
    description: Option<String>,
    level: u16,
    permissions: BTreeSet<Permission>,
    is_system: bool,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Role {
    /// Creates a validated role with a fresh identifier.
    pub fn new(input: RoleDefinitionInput) -> AppResult<Self> {
        let now = Utc::now();
        Self::hydrate(RoleId::new(), input, now, now)
    }

    /// Rebuilds a role from persisted state, re-running validation.
    pub fn hydrate(
        id: RoleId,
        input: RoleDefinitionInput,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let RoleDefinitionInput {
            name,
            display_name,
            description,
            permissions,
            level,
            is_system,
            is_default,
        } = input;

        let name = RoleName::new(name)?;

        if level > ROLE_LEVEL_MAX {
            return Err(AppError::Validation(format!(
                "role level must be less than or equal to {ROLE_LEVEL_MAX}"
            )));
        }

        let display_name = if display_name.trim().is_empty() {
            NonEmptyString::new(name.as_str())?
        } else {
            NonEmptyString::new(display_name)?
        };

        let description = description.and_then(|value| {
            let trimmed = value.trim().to_owned();
            (!trimmed.is_empty()).then_some(trimmed)
        });

        Ok(Self {
            id,
            name,
            display_name,
            description,
            level,
            permissions: permissions.into_iter().collect(),
            is_system,
            is_default,
            created_at,
            updated_at,
        })
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the normalized role name.
    #[must_use]
    pub fn name(&self) -> &RoleName {
        &self.name
    }

    /// Returns the presentation name.
    #[must_use]
    pub fn display_name(&self) -> &NonEmptyString {
        &self.display_name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the hierarchy level.
    #[must_use]
    pub fn level(&self) -> u16 {
        self.level
    }

    /// Returns the explicit permission set.
    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    /// Returns whether the role grants one permission.
    #[must_use]
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Returns whether this is a built-in role.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// Returns whether this is the deployment default role.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last modification timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replaces the permission set.
    pub fn replace_permissions(
        &mut self,
        permissions: impl IntoIterator<Item = Permission>,
        at: DateTime<Utc>,
    ) {
        self.permissions = permissions.into_iter().collect();
        self.updated_at = at;
    }

    /// Sets or clears the default flag.
    pub fn set_default(&mut self, is_default: bool, at: DateTime<Utc>) {
        self.is_default = is_default;
        self.updated_at = at;
    }

    /// Returns the permissions present in `permissions` but not granted by this role.
    #[must_use]
    pub fn added_permissions<'a>(
        &self,
        permissions: &'a BTreeSet<Permission>,
    ) -> BTreeSet<&'a Permission> {
        permissions
            .iter()
            .filter(|permission| !self.permissions.contains(permission))
            .collect()
    }
}

/// Orders roles by level descending, then by name.
pub fn sort_roles_by_rank(roles: &mut [Role]) {
    roles.sort_by(|left, right| {
        right
            .level
            .cmp(&left.level)
            .then_with(|| left.name.cmp(&right.name))
    });
}
