use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use warden_application::DefineRoleInput;
use warden_core::{Actor, AppError, AppResult, Scope, ScopeId, UserId};
use warden_domain::{Permission, Role, RoleAssignment, RoleId, RoleName};

use crate::admin_config::{AdminConfig, load_role_seed_table};
use crate::admin_services::AdminServices;
use crate::output::{AssignmentView, CommandOutput, PermissionCheck, ResolvedPermissions};

#[derive(Debug, Parser)]
#[command(
    name = "warden-admin",
    version,
    about = "Manage roles, role assignments and permission checks"
)]
pub struct Cli {
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Use a process-local store seeded with the role table instead of PostgreSQL.
    #[arg(long, global = true)]
    pub in_memory: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply database migrations.
    Migrate,
    /// Create missing built-in roles from the seed table.
    Seed {
        /// Seed table to apply instead of RBAC_ROLE_SEED_PATH or the built-in table.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Define a custom role.
    DefineRole(DefineRoleArgs),
    /// Replace the permissions of a role.
    UpdateRole {
        /// Role name or id.
        role: String,
        /// Complete new permission set.
        #[arg(long = "permission", value_delimiter = ',')]
        permissions: Vec<String>,
    },
    /// Delete a role without assignments.
    DeleteRole {
        /// Role name or id.
        role: String,
    },
    /// Move the default role, or clear it.
    SetDefault {
        /// Role name or id.
        #[arg(required_unless_present = "clear")]
        role: Option<String>,
        /// Leave the deployment without a default role.
        #[arg(long, conflicts_with = "role")]
        clear: bool,
    },
    /// List roles, highest level first.
    ListRoles,
    /// Grant a role to a user.
    Grant {
        user: String,
        /// Role name or id.
        role: String,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Revoke a role from a user.
    Revoke {
        user: String,
        /// Role name or id.
        role: String,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Revoke every assignment a user holds in one scope.
    RevokeScope {
        user: String,
        #[arg(long)]
        scope: String,
    },
    /// List assignments of a user or of a role.
    ListAssignments {
        #[arg(long, required_unless_present = "role", conflicts_with = "role")]
        user: Option<String>,
        /// Role name or id.
        #[arg(long)]
        role: Option<String>,
        /// Only assignments bound to this scope; requires --user.
        #[arg(long, requires = "user")]
        scope: Option<String>,
    },
    /// Print the effective permissions of a user.
    Resolve {
        user: String,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Fail with a forbidden error unless the user holds the permission.
    Check {
        user: String,
        permission: String,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Trace how the permissions of a user were resolved.
    Explain {
        user: String,
        #[arg(long)]
        scope: Option<String>,
        /// Explain a single permission.
        #[arg(long)]
        permission: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct DefineRoleArgs {
    name: String,
    #[arg(long)]
    display_name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    level: u16,
    #[arg(long = "permission", value_delimiter = ',')]
    permissions: Vec<String>,
    /// Mark the role as the deployment default.
    #[arg(long)]
    default: bool,
}

impl Command {
    /// Returns whether the command only touches the database schema.
    pub fn is_migrate(&self) -> bool {
        matches!(self, Self::Migrate)
    }
}

pub async fn execute(
    services: &AdminServices,
    config: &AdminConfig,
    command: Command,
) -> AppResult<CommandOutput> {
    let actor = &config.actor;

    match command {
        Command::Migrate => Ok(CommandOutput::message(
            "the in-memory store needs no migrations",
        )),
        Command::Seed { path } => {
            let table =
                load_role_seed_table(path.as_deref().or(config.role_seed_path.as_deref()))?;
            let outcome = services
                .role_admin_service
                .seed_defaults(actor, &table)
                .await?;
            Ok(CommandOutput::Seed(outcome))
        }
        Command::DefineRole(args) => {
            let role = services
                .role_admin_service
                .define_role(
                    actor,
                    DefineRoleInput {
                        display_name: args.display_name.unwrap_or_default(),
                        name: args.name,
                        description: args.description,
                        permissions: args.permissions,
                        level: args.level,
                        is_system: false,
                        is_default: args.default,
                    },
                )
                .await?;
            Ok(CommandOutput::Role(role))
        }
        Command::UpdateRole { role, permissions } => {
            let role = find_role(services, role.as_str()).await?;
            let role = services
                .role_admin_service
                .update_role_permissions(actor, role.id(), permissions)
                .await?;
            Ok(CommandOutput::Role(role))
        }
        Command::DeleteRole { role } => {
            let role = find_role(services, role.as_str()).await?;
            services
                .role_admin_service
                .delete_role(actor, role.id())
                .await?;
            Ok(CommandOutput::message(format!("deleted role '{}'", role.name())))
        }
        Command::SetDefault { role, clear: _ } => {
            let role_id = match role {
                Some(role) => Some(find_role(services, role.as_str()).await?.id()),
                None => None,
            };
            let default_role = services
                .role_admin_service
                .set_default_role(actor, role_id)
                .await?;
            Ok(CommandOutput::DefaultRole { default_role })
        }
        Command::ListRoles => Ok(CommandOutput::Roles(
            services.role_admin_service.list_roles().await?,
        )),
        Command::Grant { user, role, scope } => {
            let user_id = UserId::new(user)?;
            let scope = Scope::parse(scope.as_deref())?;
            require_assign_permission(services, actor).await?;
            let role = find_role(services, role.as_str()).await?;

            let assignment = services
                .assignment_service
                .grant(&user_id, role.id(), &scope, actor.user_id())
                .await?;
            Ok(CommandOutput::Assignment(AssignmentView::new(
                &assignment,
                Some(role.name()),
            )))
        }
        Command::Revoke { user, role, scope } => {
            let user_id = UserId::new(user)?;
            let scope = Scope::parse(scope.as_deref())?;
            require_assign_permission(services, actor).await?;
            let role = find_role(services, role.as_str()).await?;

            let revoked = services
                .assignment_service
                .revoke(&user_id, role.id(), &scope, actor.user_id())
                .await?;
            let message = if revoked {
                format!("revoked role '{}' from '{user_id}' in {scope}", role.name())
            } else {
                format!(
                    "user '{user_id}' did not hold role '{}' in {scope}; nothing to revoke",
                    role.name()
                )
            };
            Ok(CommandOutput::message(message))
        }
        Command::RevokeScope { user, scope } => {
            let user_id = UserId::new(user)?;
            let scope_id = ScopeId::new(scope)?;
            require_assign_permission(services, actor).await?;

            let removed = services
                .assignment_service
                .revoke_all_in_scope(&user_id, &scope_id, actor.user_id())
                .await?;
            assignment_views(services, removed).await
        }
        Command::ListAssignments { user, role, scope } => {
            let assignments = match (user, role) {
                (Some(user), _) => {
                    let user_id = UserId::new(user)?;
                    let scope = scope
                        .as_deref()
                        .map(|scope| Scope::parse(Some(scope)))
                        .transpose()?;
                    services
                        .assignment_service
                        .list_for_user(&user_id, scope.as_ref())
                        .await?
                }
                (None, Some(role)) => {
                    let role = find_role(services, role.as_str()).await?;
                    services.assignment_service.list_for_role(role.id()).await?
                }
                (None, None) => {
                    return Err(AppError::Validation(
                        "list-assignments requires --user or --role".to_owned(),
                    ));
                }
            };
            assignment_views(services, assignments).await
        }
        Command::Resolve { user, scope } => {
            let user_id = UserId::new(user)?;
            let scope = Scope::parse(scope.as_deref())?;
            let permissions = services
                .authorization_service
                .resolve(&user_id, &scope)
                .await?;
            Ok(CommandOutput::Permissions(ResolvedPermissions {
                user_id,
                scope,
                permissions,
            }))
        }
        Command::Check {
            user,
            permission,
            scope,
        } => {
            let user_id = UserId::new(user)?;
            let scope = Scope::parse(scope.as_deref())?;
            let permission: Permission = permission.parse()?;
            services
                .authorization_service
                .require_permission(&user_id, &scope, permission)
                .await?;
            Ok(CommandOutput::Check(PermissionCheck {
                user_id,
                scope,
                permission,
                granted: true,
            }))
        }
        Command::Explain {
            user,
            scope,
            permission,
        } => {
            let user_id = UserId::new(user)?;
            let scope = Scope::parse(scope.as_deref())?;
            match permission {
                Some(permission) => {
                    let explanation = services
                        .authorization_service
                        .explain_permission(&user_id, &scope, permission.parse()?)
                        .await?;
                    Ok(CommandOutput::Explanation(Box::new(explanation)))
                }
                None => {
                    let report = services
                        .authorization_service
                        .explain(&user_id, &scope)
                        .await?;
                    Ok(CommandOutput::Report(Box::new(report)))
                }
            }
        }
    }
}

/// Accepts a role id or a case-insensitive role name.
async fn find_role(services: &AdminServices, reference: &str) -> AppResult<Role> {
    match RoleId::parse(reference) {
        Ok(role_id) => services.role_admin_service.find_role(role_id).await,
        Err(_) => services.role_admin_service.find_role_by_name(reference).await,
    }
}

/// User actors need `roles:assign` in their own scope to change assignments.
async fn require_assign_permission(services: &AdminServices, actor: &Actor) -> AppResult<()> {
    if actor.is_system() {
        return Ok(());
    }

    services
        .authorization_service
        .require_permission(actor.user_id(), actor.scope(), Permission::RolesAssign)
        .await
}

async fn assignment_views(
    services: &AdminServices,
    assignments: Vec<RoleAssignment>,
) -> AppResult<CommandOutput> {
    let names: HashMap<RoleId, RoleName> = services
        .role_admin_service
        .list_roles()
        .await?
        .into_iter()
        .map(|role| (role.id(), role.name().clone()))
        .collect();

    Ok(CommandOutput::Assignments(
        assignments
            .iter()
            .map(|assignment| AssignmentView::new(assignment, names.get(&assignment.role_id())))
            .collect(),
    ))
}
