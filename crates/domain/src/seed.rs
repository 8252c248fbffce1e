//! Versioned table of built-in roles.
//!
//! The table ships embedded in the binary and can be replaced by an operator-supplied
//! JSON document with the same shape. Seeding only ever creates missing roles, so a
//! newer table version never clobbers permission sets customized in a deployment.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult};

use crate::{Permission, RoleDefinitionInput, RoleName};

const BUILTIN_ROLE_TABLE: &str = include_str!("../config/builtin_roles.json");

/// One built-in role entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSeedEntry {
    /// Role name, unique within the table.
    pub name: String,
    /// Presentation name.
    pub display_name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Hierarchy level.
    pub level: u16,
    /// Granted permissions.
    pub permissions: Vec<Permission>,
    /// Marks the deployment default role.
    #[serde(default)]
    pub is_default: bool,
}

/// Versioned built-in role table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSeedTable {
    /// Table version, bumped whenever built-in definitions change.
    pub version: u32,
    /// Built-in roles.
    pub roles: Vec<RoleSeedEntry>,
}

impl RoleSeedTable {
    /// Returns the table embedded at build time.
    pub fn builtin() -> AppResult<Self> {
        Self::from_json(BUILTIN_ROLE_TABLE)
    }

    /// Parses and validates a table from JSON.
    pub fn from_json(value: &str) -> AppResult<Self> {
        let table: Self = serde_json::from_str(value).map_err(|error| {
            AppError::Validation(format!("invalid role seed table: {error}"))
        })?;
        table.validate()?;
        Ok(table)
    }

    /// Returns validated role inputs, all flagged as system roles.
    #[must_use]
    pub fn role_inputs(&self) -> Vec<RoleDefinitionInput> {
        self.roles
            .iter()
            .map(|entry| RoleDefinitionInput {
                name: entry.name.clone(),
                display_name: entry.display_name.clone(),
                description: entry.description.clone(),
                permissions: entry.permissions.clone(),
                level: entry.level,
                is_system: true,
                is_default: entry.is_default,
            })
            .collect()
    }

    fn validate(&self) -> AppResult<()> {
        if self.roles.is_empty() {
            return Err(AppError::Validation(
                "role seed table must define at least one role".to_owned(),
            ));
        }

        let mut names = HashSet::new();
        for entry in &self.roles {
            let name = RoleName::new(entry.name.as_str())?;
            if !names.insert(name.clone()) {
                return Err(AppError::Validation(format!(
                    "role seed table defines '{name}' more than once"
                )));
            }
        }

        let default_count = self.roles.iter().filter(|entry| entry.is_default).count();
        if default_count > 1 {
            return Err(AppError::Validation(format!(
                "role seed table marks {default_count} roles as default; at most one is allowed"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RoleSeedTable;
    use crate::Permission;

    #[test]
    fn builtin_table_matches_canonical_roles() {
        let table = RoleSeedTable::builtin();
        assert!(table.is_ok());
        let table = table.unwrap_or_else(|_| unreachable!());

        let summary: Vec<(&str, u16, usize, bool)> = table
            .roles
            .iter()
            .map(|entry| {
                (
                    entry.name.as_str(),
                    entry.level,
                    entry.permissions.len(),
                    entry.is_default,
                )
            })
            .collect();

        assert_eq!(summary, vec![
            ("owner", 100, 40, false),
            ("admin", 80, 25, false),
            ("member", 50, 15, true),
            ("viewer", 20, 9, false),
        ]);
    }

    #[test]
    fn builtin_viewer_is_read_only() {
        let table = RoleSeedTable::builtin().unwrap_or_else(|_| unreachable!());
        let viewer = table.roles.iter().find(|entry| entry.name == "viewer");
        assert!(viewer.is_some_and(|entry| entry.permissions.iter().all(Permission::is_read_only)));
    }

    #[test]
    fn builtin_member_lacks_deletion() {
        let table = RoleSeedTable::builtin().unwrap_or_else(|_| unreachable!());
        let member = table.roles.iter().find(|entry| entry.name == "member");
        assert!(member.is_some_and(|entry| {
            entry.permissions.contains(&Permission::AgentsRead)
                && !entry.permissions.contains(&Permission::AgentsDelete)
        }));
    }

    #[test]
    fn role_inputs_are_system_roles() {
        let table = RoleSeedTable::builtin().unwrap_or_else(|_| unreachable!());
        assert!(table.role_inputs().iter().all(|input| input.is_system));
    }

    #[test]
    fn table_with_unknown_permission_is_rejected() {
        let table = RoleSeedTable::from_json(
            r#"{"version":1,"roles":[{"name":"x","display_name":"X","level":1,"permissions":["x:y"]}]}"#,
        );
        assert!(table.is_err());
    }

    #[test]
    fn table_with_duplicate_names_is_rejected() {
        let table = RoleSeedTable::from_json(
            r#"{"version":1,"roles":[
                {"name":"ops","display_name":"Ops","level":1,"permissions":[]},
                {"name":"OPS","display_name":"Ops","level":2,"permissions":[]}
            ]}"#,
        );
        assert!(table.is_err());
    }

    #[test]
    fn table_with_two_defaults_is_rejected() {
        let table = RoleSeedTable::from_json(
            r#"{"version":1,"roles":[
                {"name":"a","display_name":"A","level":1,"permissions":[],"is_default":true},
                {"name":"b","display_name":"B","level":2,"permissions":[],"is_default":true}
            ]}"#,
        );
        assert!(table.is_err());
    }
}
