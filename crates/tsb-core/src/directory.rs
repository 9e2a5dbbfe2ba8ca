//! Read-through lookups over the caches and the store, plus the invalidation
//! hooks every mutation path calls.

use std::sync::Arc;

use tracing::debug;

use crate::{
    cache::{keys, Caches},
    domain::{normalize_handle, UserId, UserRecord},
    permissions::{self, Capability, PermissionSet, Role},
    store::Store,
    Result,
};

/// The sender of an update, resolved against the registry.
#[derive(Clone, Debug)]
pub struct Actor {
    pub user_id: UserId,
    pub handle: Option<String>,
    pub record: Option<UserRecord>,
    pub role: Role,
    pub permissions: PermissionSet,
}

impl Actor {
    pub fn can(&self, cap: Capability) -> bool {
        self.permissions.has(cap)
    }

    pub fn is_blocked(&self) -> bool {
        self.role == Role::Blocked
    }

    /// Name written into audit records.
    pub fn audit_name(&self) -> String {
        match &self.handle {
            Some(h) => h.clone(),
            None => self.user_id.0.to_string(),
        }
    }
}

pub struct Directory {
    store: Arc<dyn Store>,
    caches: Arc<Caches>,
    bootstrap_owners: Vec<String>,
}

impl Directory {
    pub fn new(store: Arc<dyn Store>, caches: Arc<Caches>, bootstrap_owners: Vec<String>) -> Self {
        let bootstrap_owners = bootstrap_owners
            .iter()
            .filter_map(|h| normalize_handle(h))
            .collect();
        Self {
            store,
            caches,
            bootstrap_owners,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn user_by_handle(&self, handle: &str) -> Result<Option<UserRecord>> {
        let Some(norm) = normalize_handle(handle) else {
            return Ok(None);
        };
        let key = keys::user(&norm);
        if let Some(hit) = self.caches.users.get(&key).await {
            return Ok(Some(hit));
        }
        let found = self.store.user_by_handle(&norm).await?;
        if let Some(record) = &found {
            self.caches.users.set(key, record.clone()).await;
        }
        Ok(found)
    }

    pub async fn user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<UserRecord>> {
        let key = keys::user_id(telegram_id);
        if let Some(hit) = self.caches.users.get(&key).await {
            return Ok(Some(hit));
        }
        let found = self.store.user_by_telegram_id(telegram_id).await?;
        if let Some(record) = &found {
            self.caches.users.set(key, record.clone()).await;
        }
        Ok(found)
    }

    /// Row-id lookups always go to the store; they back the views that must
    /// show post-mutation state.
    pub async fn user_by_row_id(&self, id: i64) -> Result<Option<UserRecord>> {
        Ok(self.store.user_by_row_id(id).await?)
    }

    fn is_bootstrap_owner(&self, handle: Option<&str>) -> bool {
        handle.is_some_and(|h| self.bootstrap_owners.iter().any(|o| o == h))
    }

    /// Resolve a sender by handle first, then by numeric id.
    pub async fn resolve_actor(&self, user_id: UserId, raw_handle: Option<&str>) -> Result<Actor> {
        let handle = raw_handle.and_then(normalize_handle);

        let mut record = match &handle {
            Some(h) => self.user_by_handle(h).await?,
            None => None,
        };
        if record.is_none() {
            record = self.user_by_telegram_id(user_id.0).await?;
        }

        let (role, perms) = if self.is_bootstrap_owner(handle.as_deref()) {
            (Role::Owner, PermissionSet::for_role(Role::Owner))
        } else {
            (
                permissions::effective_role(record.as_ref()),
                permissions::permissions_of(record.as_ref()),
            )
        };

        debug!(user_id = user_id.0, role = role.as_str(), "actor resolved");
        Ok(Actor {
            user_id,
            handle,
            record,
            role,
            permissions: perms,
        })
    }

    /// Group titles the actor may report on.
    pub async fn accessible_groups(&self, actor: &Actor) -> Result<Vec<String>> {
        if actor.is_blocked() {
            return Ok(Vec::new());
        }
        let sees_all = actor.can(Capability::ViewAllGroups)
            || actor
                .record
                .as_ref()
                .is_some_and(permissions::can_see_all_groups);
        if sees_all {
            return self.all_groups().await;
        }
        match actor.record.as_ref().and_then(|r| r.handle.clone()) {
            Some(handle) => self.granted_groups(&handle).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn all_groups(&self) -> Result<Vec<String>> {
        if let Some(hit) = self.caches.groups.get(keys::ALL_GROUPS).await {
            return Ok(hit);
        }
        let titles = self.store.all_group_titles().await?;
        self.caches
            .groups
            .set(keys::ALL_GROUPS, titles.clone())
            .await;
        Ok(titles)
    }

    pub async fn granted_groups(&self, handle: &str) -> Result<Vec<String>> {
        let key = keys::groups(handle);
        if let Some(hit) = self.caches.groups.get(&key).await {
            return Ok(hit);
        }
        let titles = self.store.granted_titles(handle).await?;
        self.caches.groups.set(key, titles.clone()).await;
        Ok(titles)
    }

    /// Drop every cached entry derived from this user.
    pub async fn after_user_mutation(&self, handle: Option<&str>, telegram_id: Option<i64>) {
        if let Some(h) = handle {
            self.caches.users.invalidate(&keys::user(h)).await;
            self.caches.groups.invalidate(&keys::groups(h)).await;
        }
        if let Some(id) = telegram_id {
            self.caches.users.invalidate(&keys::user_id(id)).await;
        }
    }

    pub async fn after_grant_mutation(&self, handle: &str) {
        self.caches.groups.invalidate(&keys::groups(handle)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::RolePatch;
    use crate::store::memory::MemoryStore;

    fn directory(store: Arc<MemoryStore>, owners: &[&str]) -> Directory {
        Directory::new(
            store,
            Arc::new(Caches::new(
                Duration::from_secs(120),
                Duration::from_secs(300),
            )),
            owners.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn lookups_are_served_from_cache_until_invalidated() {
        let store = Arc::new(MemoryStore::new());
        let alice = store.seed_user(Some("alice"), Some(11), "user").await;
        let dir = directory(store.clone(), &[]);

        dir.user_by_handle("@Alice").await.unwrap();
        dir.user_by_handle("alice").await.unwrap();
        assert_eq!(store.user_reads(), 1);

        store
            .update_user_role(
                alice.id,
                &RolePatch {
                    role: "admin".into(),
                    is_active: true,
                    is_admin: true,
                },
            )
            .await
            .unwrap();
        // Still within TTL: stale until the mutation path invalidates.
        let stale = dir.user_by_handle("alice").await.unwrap().unwrap();
        assert_eq!(stale.role, "user");

        dir.after_user_mutation(alice.handle.as_deref(), alice.telegram_id)
            .await;
        let fresh = dir.user_by_handle("alice").await.unwrap().unwrap();
        assert_eq!(fresh.role, "admin");
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let dir = directory(store.clone(), &[]);
        assert!(dir.user_by_handle("ghost").await.unwrap().is_none());
        store.seed_user(Some("ghost"), None, "user").await;
        assert!(dir.user_by_handle("ghost").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn actor_falls_back_to_numeric_id() {
        let store = Arc::new(MemoryStore::new());
        store.seed_user(None, Some(99), "admin").await;
        let dir = directory(store, &[]);

        let actor = dir.resolve_actor(UserId(99), None).await.unwrap();
        assert_eq!(actor.role, Role::Admin);
        assert!(actor.can(Capability::ManageUsers));
        assert_eq!(actor.audit_name(), "99");
    }

    #[tokio::test]
    async fn bootstrap_owner_needs_no_record() {
        let store = Arc::new(MemoryStore::new());
        store.seed_group("Ops").await;
        let dir = directory(store, &["@Root"]);

        let actor = dir.resolve_actor(UserId(1), Some("root")).await.unwrap();
        assert_eq!(actor.role, Role::Owner);
        assert!(actor.can(Capability::DeleteData));
        assert_eq!(dir.accessible_groups(&actor).await.unwrap(), vec!["Ops"]);

        let stranger = dir.resolve_actor(UserId(2), Some("eve")).await.unwrap();
        assert!(stranger.is_blocked());
        assert!(stranger.permissions.is_empty());
    }

    #[tokio::test]
    async fn grants_limit_regular_users() {
        let store = Arc::new(MemoryStore::new());
        store.seed_user(Some("bob"), Some(5), "user").await;
        store.seed_group("Ops").await;
        store.seed_grant("bob", "Sales").await;
        let dir = directory(store, &[]);

        let bob = dir.resolve_actor(UserId(5), Some("bob")).await.unwrap();
        assert_eq!(dir.accessible_groups(&bob).await.unwrap(), vec!["Sales"]);
    }
}
