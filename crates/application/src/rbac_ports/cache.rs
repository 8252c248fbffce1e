use std::collections::BTreeSet;

use async_trait::async_trait;

use warden_core::{AppResult, Scope, UserId};
use warden_domain::Permission;

/// Optional cache port for resolved permission sets.
///
/// Writers invalidate synchronously: assignment changes drop one user's entries,
/// role changes drop everything. Every invalidation also advances the cache epoch,
/// and a write only lands when the epoch read before the store lookup is still
/// current, so a resolution computed before an invalidation is never stored after it.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Returns the cached resolution for one user and scope.
    async fn get_permissions(
        &self,
        user_id: &UserId,
        scope: &Scope,
    ) -> AppResult<Option<BTreeSet<Permission>>>;

    /// Returns the current invalidation epoch.
    async fn current_epoch(&self) -> AppResult<u64>;

    /// Stores a resolution with ttl if `epoch` is still current.
    ///
    /// Returns whether the entry was stored.
    async fn set_permissions(
        &self,
        user_id: &UserId,
        scope: &Scope,
        permissions: &BTreeSet<Permission>,
        epoch: u64,
        ttl_seconds: u32,
    ) -> AppResult<bool>;

    /// Drops every cached resolution of one user and advances the epoch.
    async fn invalidate_user(&self, user_id: &UserId) -> AppResult<()>;

    /// Drops every cached resolution and advances the epoch.
    async fn invalidate_all(&self) -> AppResult<()>;
}
