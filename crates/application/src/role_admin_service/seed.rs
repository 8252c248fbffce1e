use serde::Serialize;
use tracing::warn;
use warden_domain::RoleSeedTable;

use super::*;

/// Result of seeding built-in roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedOutcome {
    /// Version of the table that was applied.
    pub table_version: u32,
    /// Roles created by this run.
    pub created: Vec<Role>,
    /// Roles that already existed by name and were left untouched.
    pub existing: Vec<Role>,
}

impl SeedOutcome {
    /// Returns every built-in role covered by the table, highest level first.
    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self
            .created
            .iter()
            .chain(self.existing.iter())
            .cloned()
            .collect();
        sort_roles_by_rank(&mut roles);
        roles
    }
}

impl RoleAdminService {
    /// Ensures every role in the table exists.
    ///
    /// Roles already present by name are skipped, not overwritten, so operator edits
    /// survive redeploys. Safe to run on every deployment.
    pub async fn seed_defaults(
        &self,
        actor: &Actor,
        table: &RoleSeedTable,
    ) -> AppResult<SeedOutcome> {
        self.require_role_manage_permission(actor).await?;

        let mut created = Vec::new();
        let mut existing = Vec::new();

        for mut input in table.role_inputs() {
            let name = RoleName::new(input.name.as_str())?;
            if let Some(role) = self.role_repository.find_role_by_name(&name).await? {
                existing.push(role);
                continue;
            }

            if input.is_default
                && let Some(current_default) = self.role_repository.find_default_role().await?
            {
                warn!(
                    role = %name,
                    current_default = %current_default.name(),
                    "seeded role is marked default but another default exists; seeding without the flag"
                );
                input.is_default = false;
            }

            let role = Role::new(input)?;
            match self.role_repository.insert_role(role).await {
                Ok(role) => created.push(role),
                Err(AppError::Validation(_) | AppError::Conflict(_)) => {
                    let role = self
                        .role_repository
                        .find_role_by_name(&name)
                        .await?
                        .ok_or_else(|| {
                            AppError::Conflict(format!(
                                "role '{name}' could not be seeded because of a conflicting write"
                            ))
                        })?;
                    existing.push(role);
                }
                Err(error) => return Err(error),
            }
        }

        if !created.is_empty() {
            self.authorization_service.invalidate_all().await?;
        }

        info!(
            table_version = table.version,
            created = created.len(),
            existing = existing.len(),
            "built-in roles seeded"
        );

        for role in &created {
            self.append_role_event(
                actor,
                AuditAction::RoleCreated,
                role,
                format!(
                    "seeded built-in role '{}' from table version {}",
                    role.name(),
                    table.version
                ),
            )
            .await;
        }

        Ok(SeedOutcome {
            table_version: table.version,
            created,
            existing,
        })
    }
}
