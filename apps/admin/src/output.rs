use std::collections::BTreeSet;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use warden_application::{DiagnosticReport, PermissionExplanation, SeedOutcome};
use warden_core::{AppError, AppResult, Scope, UserId};
use warden_domain::{Permission, Role, RoleAssignment, RoleId, RoleName};

/// Assignment row with its role name resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentView {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub role_name: Option<RoleName>,
    pub scope: Scope,
    pub granted_by: UserId,
    pub granted_at: DateTime<Utc>,
}

impl AssignmentView {
    pub fn new(assignment: &RoleAssignment, role_name: Option<&RoleName>) -> Self {
        Self {
            user_id: assignment.user_id().clone(),
            role_id: assignment.role_id(),
            role_name: role_name.cloned(),
            scope: assignment.scope().clone(),
            granted_by: assignment.granted_by().clone(),
            granted_at: assignment.granted_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPermissions {
    pub user_id: UserId,
    pub scope: Scope,
    pub permissions: BTreeSet<Permission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionCheck {
    pub user_id: UserId,
    pub scope: Scope,
    pub permission: Permission,
    pub granted: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Message { message: String },
    Role(Role),
    Roles(Vec<Role>),
    DefaultRole { default_role: Option<Role> },
    Seed(SeedOutcome),
    Assignment(AssignmentView),
    Assignments(Vec<AssignmentView>),
    Permissions(ResolvedPermissions),
    Check(PermissionCheck),
    Report(Box<DiagnosticReport>),
    Explanation(Box<PermissionExplanation>),
}

impl CommandOutput {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|error| AppError::Internal(format!("failed to encode output: {error}")))
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Message { message } => message.clone(),
            Self::Role(role) => role_details(role),
            Self::Roles(roles) if roles.is_empty() => "(no roles)".to_owned(),
            Self::Roles(roles) => roles
                .iter()
                .map(role_summary)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::DefaultRole { default_role } => match default_role {
                Some(role) => format!("default role is now '{}'", role.name()),
                None => "default role cleared".to_owned(),
            },
            Self::Seed(outcome) => seed_summary(outcome),
            Self::Assignment(assignment) => assignment_line(assignment),
            Self::Assignments(assignments) if assignments.is_empty() => {
                "(no assignments)".to_owned()
            }
            Self::Assignments(assignments) => assignments
                .iter()
                .map(assignment_line)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Permissions(resolved) => {
                let mut text = format!(
                    "effective permissions for user '{}' in {} ({}):",
                    resolved.user_id,
                    resolved.scope,
                    resolved.permissions.len()
                );
                for permission in &resolved.permissions {
                    let _ = write!(text, "\n  {permission}");
                }
                text
            }
            Self::Check(check) => format!(
                "user '{}' holds '{}' in {}",
                check.user_id, check.permission, check.scope
            ),
            Self::Report(report) => report.to_string(),
            Self::Explanation(explanation) => explanation_text(explanation),
        }
    }
}

fn role_flags(role: &Role) -> String {
    let mut flags = Vec::new();
    if role.is_system() {
        flags.push("system");
    }
    if role.is_default() {
        flags.push("default");
    }
    flags.join(",")
}

fn role_summary(role: &Role) -> String {
    format!(
        "{:<20} level {:>4}  {:<14} {} permissions",
        role.name().as_str(),
        role.level(),
        role_flags(role),
        role.permissions().len()
    )
}

fn role_details(role: &Role) -> String {
    let mut text = format!(
        "{} ({}) id {} level {}",
        role.name(),
        role.display_name(),
        role.id(),
        role.level()
    );
    let flags = role_flags(role);
    if !flags.is_empty() {
        let _ = write!(text, " [{flags}]");
    }
    if let Some(description) = role.description() {
        let _ = write!(text, "\n  {description}");
    }
    let _ = write!(text, "\npermissions ({}):", role.permissions().len());
    for permission in role.permissions() {
        let _ = write!(text, "\n  {permission}");
    }
    text
}

fn seed_summary(outcome: &SeedOutcome) -> String {
    let mut text = format!(
        "applied role table v{}: {} created, {} already present",
        outcome.table_version,
        outcome.created.len(),
        outcome.existing.len()
    );
    for role in &outcome.created {
        let _ = write!(text, "\n  + {}", role.name());
    }
    text
}

fn assignment_line(assignment: &AssignmentView) -> String {
    let role = assignment
        .role_name
        .as_ref()
        .map_or_else(|| format!("<missing role {}>", assignment.role_id), ToString::to_string);

    format!(
        "{} -> {role} in {} (granted by '{}' at {})",
        assignment.user_id,
        assignment.scope,
        assignment.granted_by,
        assignment.granted_at.to_rfc3339()
    )
}

fn join_names(names: &[RoleName]) -> String {
    if names.is_empty() {
        return "(none)".to_owned();
    }
    names
        .iter()
        .map(RoleName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn explanation_text(explanation: &PermissionExplanation) -> String {
    let verdict = if explanation.granted {
        "granted"
    } else {
        "denied"
    };
    let mut text = format!(
        "'{}' is {verdict} for user '{}' in {}",
        explanation.permission, explanation.report.user_id, explanation.report.scope
    );
    let _ = write!(text, "\ngranted by: {}", join_names(&explanation.granted_by));
    if explanation.via_default_fallback {
        text.push_str(" (default-role fallback)");
    }
    let _ = write!(
        text,
        "\noffered by: {}\n\n{}",
        join_names(&explanation.roles_offering_permission),
        explanation.report
    );
    text
}
