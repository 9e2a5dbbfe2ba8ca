//! Small TTL caches in front of the store.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

use crate::domain::UserRecord;

#[derive(Clone)]
struct CacheEntry<T> {
    data: T,
    at: Instant,
}

/// Keyed cache with one fixed TTL. Expired entries are evicted on access.
pub struct TtlCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.get_at(key, Instant::now()).await
    }

    pub async fn get_at(&self, key: &str, now: Instant) -> Option<T> {
        let mut map = self.entries.lock().await;
        let fresh = map
            .get(key)
            .map(|e| now.saturating_duration_since(e.at) < self.ttl)?;
        if fresh {
            map.get(key).map(|e| e.data.clone())
        } else {
            map.remove(key);
            None
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: T) {
        self.set_at(key, value, Instant::now()).await;
    }

    pub async fn set_at(&self, key: impl Into<String>, value: T, at: Instant) {
        self.entries
            .lock()
            .await
            .insert(key.into(), CacheEntry { data: value, at });
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Cache keys shared by the lookup helpers and the invalidation paths.
pub mod keys {
    pub const ALL_GROUPS: &str = "all_groups";

    pub fn user(handle: &str) -> String {
        format!("user:{handle}")
    }

    pub fn user_id(telegram_id: i64) -> String {
        format!("user_id:{telegram_id}")
    }

    pub fn groups(handle: &str) -> String {
        format!("groups:{handle}")
    }
}

/// The two cache instances, constructed once at startup.
pub struct Caches {
    pub users: TtlCache<UserRecord>,
    pub groups: TtlCache<Vec<String>>,
}

impl Caches {
    pub fn new(user_ttl: Duration, groups_ttl: Duration) -> Self {
        Self {
            users: TtlCache::new(user_ttl),
            groups: TtlCache::new(groups_ttl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_lazily() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(120));
        let t0 = Instant::now();
        cache.set_at("user:alice", 1, t0).await;

        assert_eq!(
            cache
                .get_at("user:alice", t0 + Duration::from_secs(119))
                .await,
            Some(1)
        );
        assert_eq!(cache.len().await, 1);

        assert_eq!(
            cache
                .get_at("user:alice", t0 + Duration::from_secs(120))
                .await,
            None
        );
        // Evicted on that access.
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn invalidate_and_clear_are_idempotent() {
        let cache: TtlCache<&str> = TtlCache::new(Duration::from_secs(60));
        cache.invalidate("missing").await;
        cache.set("a", "x").await;
        cache.set("b", "y").await;
        cache.invalidate("a").await;
        cache.invalidate("a").await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some("y"));
        cache.clear().await;
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }

    #[test]
    fn key_shapes() {
        assert_eq!(keys::user("alice"), "user:alice");
        assert_eq!(keys::user_id(42), "user_id:42");
        assert_eq!(keys::groups("alice"), "groups:alice");
    }
}
