use std::fmt::{Display, Formatter};

use serde::Serialize;
use warden_domain::{RoleName, sort_roles_by_rank};

use super::*;

/// Answer to "why does (or doesn't) this user hold this permission".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionExplanation {
    /// Checked permission.
    pub permission: Permission,
    /// Whether the resolution contains it.
    pub granted: bool,
    /// Contributing roles that grant it.
    pub granted_by: Vec<RoleName>,
    /// Whether the grant came only through the default-role fallback.
    pub via_default_fallback: bool,
    /// Every defined role that would grant it, highest level first.
    pub roles_offering_permission: Vec<RoleName>,
    /// Full resolution trace.
    pub report: DiagnosticReport,
}

impl AuthorizationService {
    /// Replays the resolution of a user in a scope, keeping every intermediate step.
    ///
    /// Always reads the stores; the cache is never consulted.
    pub async fn explain(&self, user_id: &UserId, scope: &Scope) -> AppResult<DiagnosticReport> {
        self.evaluate_from_store(user_id, scope).await
    }

    /// Explains the presence or absence of one permission.
    pub async fn explain_permission(
        &self,
        user_id: &UserId,
        scope: &Scope,
        permission: Permission,
    ) -> AppResult<PermissionExplanation> {
        let report = self.explain(user_id, scope).await?;

        let granted_by: Vec<RoleName> = report
            .contributions
            .iter()
            .filter(|contribution| contribution.permissions.contains(&permission))
            .map(|contribution| contribution.role_name.clone())
            .collect();

        let via_default_fallback = !granted_by.is_empty()
            && matches!(report.fallback, FallbackDecision::Applied { .. });

        let mut roles = self.role_repository.list_roles().await?;
        sort_roles_by_rank(&mut roles);
        let roles_offering_permission = roles
            .into_iter()
            .filter(|role| role.grants(permission))
            .map(|role| role.name().clone())
            .collect();

        Ok(PermissionExplanation {
            permission,
            granted: report.final_permissions.contains(&permission),
            granted_by,
            via_default_fallback,
            roles_offering_permission,
            report,
        })
    }

    /// Returns the highest role level effective for the user in the scope.
    pub(crate) async fn highest_level(&self, user_id: &UserId, scope: &Scope) -> AppResult<Option<u16>> {
        Ok(self.explain(user_id, scope).await?.highest_level())
    }
}

impl Display for DiagnosticReport {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            formatter,
            "resolution for user '{}' in {}",
            self.user_id, self.scope
        )?;

        writeln!(formatter, "assignments ({}):", self.assignments.len())?;
        if self.assignments.is_empty() {
            writeln!(formatter, "  (none)")?;
        }
        for trace in &self.assignments {
            let role = trace
                .role_name
                .as_ref()
                .map_or_else(|| format!("<missing role {}>", trace.role_id), ToString::to_string);
            writeln!(
                formatter,
                "  - {role} in {} granted by '{}' at {}: {}",
                trace.scope,
                trace.granted_by,
                trace.granted_at.to_rfc3339(),
                outcome_label(trace.outcome)
            )?;
        }

        writeln!(formatter, "contributions:")?;
        if self.contributions.is_empty() {
            writeln!(formatter, "  (none)")?;
        }
        for contribution in &self.contributions {
            let source = match &contribution.source {
                ContributionSource::Assignment { scope } => format!("assignment in {scope}"),
                ContributionSource::DefaultFallback => "default-role fallback".to_owned(),
            };
            writeln!(
                formatter,
                "  - {} (level {}) via {source}: {} permissions, {} new",
                contribution.role_name,
                contribution.level,
                contribution.permissions.len(),
                contribution.new_permissions.len()
            )?;
            for permission in &contribution.new_permissions {
                writeln!(formatter, "      + {permission}")?;
            }
        }

        let fallback = match &self.fallback {
            FallbackDecision::NotNeeded {
                applicable_assignments,
            } => format!("not applied ({applicable_assignments} applicable assignments)"),
            FallbackDecision::Applied { role_name, .. } => {
                format!("applied default role '{role_name}' (no applicable assignments)")
            }
            FallbackDecision::NoDefaultRole => {
                "not applied (no applicable assignments and no default role)".to_owned()
            }
        };
        writeln!(formatter, "fallback: {fallback}")?;

        write!(
            formatter,
            "effective permissions ({}):",
            self.final_permissions.len()
        )?;
        for permission in &self.final_permissions {
            write!(formatter, "\n  {permission}")?;
        }

        Ok(())
    }
}

fn outcome_label(outcome: AssignmentOutcome) -> &'static str {
    match outcome {
        AssignmentOutcome::Applied => "applied",
        AssignmentOutcome::ScopeMismatch => "skipped, other scope",
        AssignmentOutcome::DuplicateRole => "skipped, role already counted",
        AssignmentOutcome::RoleMissing => "skipped, role no longer exists",
    }
}
