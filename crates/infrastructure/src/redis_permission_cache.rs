//! Redis-backed permission cache.
//!
//! Entries live in one hash per user under the current generation. Invalidating a
//! user deletes that hash; invalidating everything bumps the generation so older
//! hashes are never read again and age out with their ttl.
//!
//! Both invalidations also bump the epoch key inside the same script. Writes carry
//! the epoch observed before the store lookup and are dropped when it moved.

use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use warden_application::PermissionCache;
use warden_core::{AppError, AppResult, Scope, UserId};
use warden_domain::Permission;

const GET_PERMISSIONS_SCRIPT: &str = r#"
local generation = redis.call('GET', KEYS[1]) or '0'
local key = ARGV[1] .. ':g' .. generation .. ':user:' .. ARGV[2]
return redis.call('HGET', key, ARGV[3])
"#;

const SET_PERMISSIONS_SCRIPT: &str = r#"
if (redis.call('GET', KEYS[2]) or '0') ~= ARGV[6] then
  return 0
end

local generation = redis.call('GET', KEYS[1]) or '0'
local key = ARGV[1] .. ':g' .. generation .. ':user:' .. ARGV[2]
local ttl = tonumber(ARGV[5])

redis.call('HSET', key, ARGV[3], ARGV[4])
if redis.call('TTL', key) < ttl then
  redis.call('EXPIRE', key, ttl)
end
return 1
"#;

const INVALIDATE_USER_SCRIPT: &str = r#"
local generation = redis.call('GET', KEYS[1]) or '0'
redis.call('DEL', ARGV[1] .. ':g' .. generation .. ':user:' .. ARGV[2])
return redis.call('INCR', KEYS[2])
"#;

const INVALIDATE_ALL_SCRIPT: &str = r#"
redis.call('INCR', KEYS[1])
return redis.call('INCR', KEYS[2])
"#;

/// Redis implementation of the permission cache port.
#[derive(Clone)]
pub struct RedisPermissionCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisPermissionCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn generation_key(&self) -> String {
        format!("{}:generation", self.key_prefix)
    }

    fn epoch_key(&self) -> String {
        format!("{}:epoch", self.key_prefix)
    }

    fn field_for(scope: &Scope) -> String {
        match scope.scope_id() {
            Some(scope_id) => format!("scope:{scope_id}"),
            None => "global".to_owned(),
        }
    }

    fn encode_permissions(permissions: &BTreeSet<Permission>, expires_at: i64) -> String {
        let values: Vec<&str> = permissions.iter().map(Permission::as_str).collect();
        format!("{expires_at}|{}", values.join(","))
    }

    fn decode_permissions(value: &str, now: i64) -> AppResult<Option<BTreeSet<Permission>>> {
        let (expires_at, permissions) = value.split_once('|').ok_or_else(|| {
            AppError::Internal(format!("invalid permission cache value '{value}'"))
        })?;

        let expires_at = expires_at.parse::<i64>().map_err(|error| {
            AppError::Internal(format!(
                "invalid permission cache expiry '{expires_at}': {error}"
            ))
        })?;
        if expires_at <= now {
            return Ok(None);
        }

        permissions
            .split(',')
            .filter(|permission| !permission.is_empty())
            .map(|permission| {
                Permission::from_str(permission).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid cached permission '{permission}': {error}"
                    ))
                })
            })
            .collect::<AppResult<BTreeSet<_>>>()
            .map(Some)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl PermissionCache for RedisPermissionCache {
    async fn get_permissions(
        &self,
        user_id: &UserId,
        scope: &Scope,
    ) -> AppResult<Option<BTreeSet<Permission>>> {
        let mut connection = self.connection().await?;

        let encoded: Option<String> = Script::new(GET_PERMISSIONS_SCRIPT)
            .key(self.generation_key())
            .arg(self.key_prefix.as_str())
            .arg(user_id.as_str())
            .arg(Self::field_for(scope))
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read permission cache entry: {error}"))
            })?;

        match encoded {
            Some(value) => Self::decode_permissions(value.as_str(), Utc::now().timestamp()),
            None => Ok(None),
        }
    }

    async fn current_epoch(&self) -> AppResult<u64> {
        let mut connection = self.connection().await?;

        let epoch: Option<u64> = connection.get(self.epoch_key()).await.map_err(|error| {
            AppError::Internal(format!("failed to read permission cache epoch: {error}"))
        })?;

        Ok(epoch.unwrap_or_default())
    }

    async fn set_permissions(
        &self,
        user_id: &UserId,
        scope: &Scope,
        permissions: &BTreeSet<Permission>,
        epoch: u64,
        ttl_seconds: u32,
    ) -> AppResult<bool> {
        if ttl_seconds == 0 {
            return Ok(false);
        }

        let expires_at = Utc::now().timestamp() + i64::from(ttl_seconds);
        let mut connection = self.connection().await?;

        let stored: i64 = Script::new(SET_PERMISSIONS_SCRIPT)
            .key(self.generation_key())
            .key(self.epoch_key())
            .arg(self.key_prefix.as_str())
            .arg(user_id.as_str())
            .arg(Self::field_for(scope))
            .arg(Self::encode_permissions(permissions, expires_at))
            .arg(ttl_seconds)
            .arg(epoch.to_string())
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write permission cache entry: {error}"))
            })?;

        Ok(stored == 1)
    }

    async fn invalidate_user(&self, user_id: &UserId) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let _: i64 = Script::new(INVALIDATE_USER_SCRIPT)
            .key(self.generation_key())
            .key(self.epoch_key())
            .arg(self.key_prefix.as_str())
            .arg(user_id.as_str())
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to invalidate permission cache for user '{user_id}': {error}"
                ))
            })?;

        Ok(())
    }

    async fn invalidate_all(&self) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let _: i64 = Script::new(INVALIDATE_ALL_SCRIPT)
            .key(self.generation_key())
            .key(self.epoch_key())
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to invalidate permission cache: {error}"))
            })?;

        Ok(())
    }
}
