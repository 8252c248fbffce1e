use std::env;
use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;
use warden_core::{Actor, AppError, Scope, UserId};
use warden_domain::RoleSeedTable;

const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CACHE_TTL_SECONDS: u32 = 30;
const DEFAULT_CACHE_KEY_PREFIX: &str = "warden:rbac";

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub cache_ttl_seconds: u32,
    pub cache_key_prefix: String,
    pub role_seed_path: Option<PathBuf>,
    pub actor: Actor,
}

impl AdminConfig {
    pub fn load() -> Result<Self, AppError> {
        Ok(Self {
            database_url: optional_env("DATABASE_URL"),
            database_max_connections: parse_u32(
                "DATABASE_MAX_CONNECTIONS",
                optional_env("DATABASE_MAX_CONNECTIONS"),
                DEFAULT_DATABASE_MAX_CONNECTIONS,
            )?,
            redis_url: optional_env("REDIS_URL"),
            cache_ttl_seconds: parse_u32(
                "RBAC_CACHE_TTL_SECONDS",
                optional_env("RBAC_CACHE_TTL_SECONDS"),
                DEFAULT_CACHE_TTL_SECONDS,
            )?,
            cache_key_prefix: optional_env("RBAC_CACHE_KEY_PREFIX")
                .unwrap_or_else(|| DEFAULT_CACHE_KEY_PREFIX.to_owned()),
            role_seed_path: optional_env("RBAC_ROLE_SEED_PATH").map(PathBuf::from),
            actor: parse_actor(
                optional_env("RBAC_ACTOR").as_deref(),
                optional_env("RBAC_ACTOR_SCOPE").as_deref(),
            )?,
        })
    }

    pub fn required_database_url(&self) -> Result<&str, AppError> {
        self.database_url.as_deref().ok_or_else(|| {
            AppError::Validation(
                "DATABASE_URL is required unless --in-memory is set".to_owned(),
            )
        })
    }

    /// Loads the override table from `RBAC_ROLE_SEED_PATH`, or the built-in table.
    pub fn role_seed_table(&self) -> Result<RoleSeedTable, AppError> {
        load_role_seed_table(self.role_seed_path.as_deref())
    }
}

pub fn load_role_seed_table(path: Option<&Path>) -> Result<RoleSeedTable, AppError> {
    let Some(path) = path else {
        return RoleSeedTable::builtin();
    };

    let contents = std::fs::read_to_string(path).map_err(|error| {
        AppError::Validation(format!(
            "failed to read role seed table '{}': {error}",
            path.display()
        ))
    })?;
    RoleSeedTable::from_json(contents.as_str())
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Treats unset and blank variables alike.
fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_u32(name: &str, value: Option<String>, default: u32) -> Result<u32, AppError> {
    match value {
        Some(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_actor(actor: Option<&str>, scope: Option<&str>) -> Result<Actor, AppError> {
    match actor {
        None => Ok(Actor::system()),
        Some(subject) if subject.eq_ignore_ascii_case(Actor::SYSTEM_SUBJECT) => {
            if scope.is_some() {
                return Err(AppError::Validation(
                    "RBAC_ACTOR_SCOPE cannot be combined with the system actor".to_owned(),
                ));
            }
            Ok(Actor::system())
        }
        Some(subject) => Ok(Actor::user(UserId::new(subject)?, Scope::parse(scope)?)),
    }
}
