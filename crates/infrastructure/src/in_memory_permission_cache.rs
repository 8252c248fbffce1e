use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use warden_application::PermissionCache;
use warden_core::{AppResult, Scope, UserId};
use warden_domain::Permission;

/// Writes between two sweeps of expired entries.
const SWEEP_INTERVAL: u32 = 256;

#[derive(Debug, Clone)]
struct PermissionCacheEntry {
    permissions: BTreeSet<Permission>,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    epoch: u64,
    writes_since_sweep: u32,
    users: HashMap<UserId, HashMap<Scope, PermissionCacheEntry>>,
}

impl CacheState {
    fn insert(
        &mut self,
        user_id: &UserId,
        scope: &Scope,
        entry: PermissionCacheEntry,
        now: Instant,
    ) {
        self.writes_since_sweep += 1;
        if self.writes_since_sweep >= SWEEP_INTERVAL {
            self.sweep_expired(now);
        }

        self.users
            .entry(user_id.clone())
            .or_default()
            .insert(scope.clone(), entry);
    }

    fn sweep_expired(&mut self, now: Instant) {
        self.writes_since_sweep = 0;
        self.users.retain(|_, scopes| {
            scopes.retain(|_, entry| entry.expires_at > now);
            !scopes.is_empty()
        });
    }

    fn advance_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }
}

/// In-memory cache adapter for resolved permission sets.
///
/// Expired entries are dropped on read and swept periodically on write.
#[derive(Debug, Default)]
pub struct InMemoryPermissionCache {
    state: RwLock<CacheState>,
}

impl InMemoryPermissionCache {
    /// Creates an empty in-memory permission cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get_permissions(
        &self,
        user_id: &UserId,
        scope: &Scope,
    ) -> AppResult<Option<BTreeSet<Permission>>> {
        {
            let state = self.state.read().await;
            match state.users.get(user_id).and_then(|scopes| scopes.get(scope)) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.permissions.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut state = self.state.write().await;
        if let Some(scopes) = state.users.get_mut(user_id) {
            scopes.retain(|_, entry| entry.expires_at > Instant::now());
            if scopes.is_empty() {
                state.users.remove(user_id);
            }
        }

        Ok(None)
    }

    async fn current_epoch(&self) -> AppResult<u64> {
        Ok(self.state.read().await.epoch)
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

        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return Ok(false);
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);
        state.insert(
            user_id,
            scope,
            PermissionCacheEntry {
                permissions: permissions.clone(),
                expires_at,
            },
            now,
        );

        Ok(true)
    }

    async fn invalidate_user(&self, user_id: &UserId) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.users.remove(user_id);
        state.advance_epoch();
        Ok(())
    }

    async fn invalidate_all(&self) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.users.clear();
        state.advance_epoch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::time::{Duration, Instant};

    use warden_application::PermissionCache;
    use warden_core::{Scope, ScopeId, UserId};
    use warden_domain::Permission;

    use super::{CacheState, InMemoryPermissionCache, PermissionCacheEntry, SWEEP_INTERVAL};

    fn user(value: &str) -> UserId {
        UserId::new(value).unwrap_or_else(|_| unreachable!())
    }

    fn org(value: &str) -> Scope {
        Scope::Scoped(ScopeId::new(value).unwrap_or_else(|_| unreachable!()))
    }

    #[tokio::test]
    async fn stores_entries_per_user_and_scope() {
        let cache = InMemoryPermissionCache::new();
        let permissions = BTreeSet::from([Permission::AgentsRead]);

        let stored = cache
            .set_permissions(&user("alice"), &org("o1"), &permissions, 0, 30)
            .await;
        assert!(stored.is_ok());

        assert_eq!(
            cache
                .get_permissions(&user("alice"), &org("o1"))
                .await
                .unwrap_or_default(),
            Some(permissions)
        );
        assert!(
            cache
                .get_permissions(&user("alice"), &org("o2"))
                .await
                .unwrap_or_default()
                .is_none()
        );
        assert!(
            cache
                .get_permissions(&user("bob"), &org("o1"))
                .await
                .unwrap_or_default()
                .is_none()
        );
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let cache = InMemoryPermissionCache::new();

        let stored = cache
            .set_permissions(&user("alice"), &Scope::Global, &BTreeSet::new(), 0, 0)
            .await;
        assert_eq!(stored.ok(), Some(false));
        assert!(
            cache
                .get_permissions(&user("alice"), &Scope::Global)
                .await
                .unwrap_or_default()
                .is_none()
        );
    }

    #[tokio::test]
    async fn invalidation_drops_user_or_everything() {
        let cache = InMemoryPermissionCache::new();
        let permissions = BTreeSet::from([Permission::AuditRead]);
        for name in ["alice", "bob"] {
            let stored = cache
                .set_permissions(&user(name), &Scope::Global, &permissions, 0, 30)
                .await;
            assert!(stored.is_ok());
        }

        assert!(cache.invalidate_user(&user("alice")).await.is_ok());
        assert!(
            cache
                .get_permissions(&user("alice"), &Scope::Global)
                .await
                .unwrap_or_default()
                .is_none()
        );
        assert!(
            cache
                .get_permissions(&user("bob"), &Scope::Global)
                .await
                .unwrap_or_default()
                .is_some()
        );

        assert!(cache.invalidate_all().await.is_ok());
        assert!(
            cache
                .get_permissions(&user("bob"), &Scope::Global)
                .await
                .unwrap_or_default()
                .is_none()
        );
    }

    #[tokio::test]
    async fn write_with_stale_epoch_is_rejected() {
        let cache = InMemoryPermissionCache::new();
        let permissions = BTreeSet::from([Permission::OrganizationsDelete]);
        let epoch = cache.current_epoch().await.unwrap_or_default();

        assert!(cache.invalidate_user(&user("bob")).await.is_ok());

        let stored = cache
            .set_permissions(&user("alice"), &Scope::Global, &permissions, epoch, 30)
            .await;
        assert_eq!(stored.ok(), Some(false));
        assert!(
            cache
                .get_permissions(&user("alice"), &Scope::Global)
                .await
                .unwrap_or_default()
                .is_none()
        );

        let current = cache.current_epoch().await.unwrap_or_default();
        assert_ne!(current, epoch);
        let stored = cache
            .set_permissions(&user("alice"), &Scope::Global, &permissions, current, 30)
            .await;
        assert_eq!(stored.ok(), Some(true));
    }

    #[test]
    fn periodic_sweep_drops_expired_entries_of_other_users() {
        let mut state = CacheState::default();
        let start = Instant::now();
        let entry = |expires_at| PermissionCacheEntry {
            permissions: BTreeSet::from([Permission::AgentsRead]),
            expires_at,
        };

        state.insert(
            &user("alice"),
            &org("o1"),
            entry(start + Duration::from_secs(1)),
            start,
        );
        state.insert(
            &user("carol"),
            &org("o1"),
            entry(start + Duration::from_secs(600)),
            start,
        );

        let later = start + Duration::from_secs(60);
        for index in 0..SWEEP_INTERVAL {
            state.insert(
                &user("bob"),
                &org(&format!("o{index}")),
                entry(later + Duration::from_secs(30)),
                later,
            );
        }

        assert!(!state.users.contains_key(&user("alice")));
        assert!(state.users.contains_key(&user("carol")));
        assert_eq!(
            state.users.get(&user("bob")).map(HashMap::len),
            usize::try_from(SWEEP_INTERVAL).ok()
        );
    }
}
