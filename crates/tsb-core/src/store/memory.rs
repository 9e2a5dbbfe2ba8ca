//! In-process `Store` used by tests and by `STORE_BACKEND=memory`.
//!
//! Nothing survives a restart, so pending modes are only as durable as the
//! process. Group titles are learned from logged group traffic, the way the
//! hosted store fills its group table.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    AuditRecord, BotSettings, GroupMessage, GroupStats, LogRow, NewUser, RolePatch, UserRecord,
    UserSettings,
};
use crate::store::{Store, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    users: Vec<UserRecord>,
    next_id: i64,
    groups: BTreeSet<String>,
    grants: BTreeSet<(String, String)>,
    pending: HashMap<i64, String>,
    user_settings: HashMap<i64, UserSettings>,
    bot_settings: BotSettings,
    logs: Vec<LogRow>,
    audits: Vec<AuditRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    writes: AtomicU64,
    user_reads: AtomicU64,
    failing: AtomicBool,
    failing_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user directly. Not counted as a write.
    pub async fn seed_user(
        &self,
        handle: Option<&str>,
        telegram_id: Option<i64>,
        role: &str,
    ) -> UserRecord {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let record = UserRecord {
            id: inner.next_id,
            handle: handle.and_then(crate::domain::normalize_handle),
            telegram_id,
            role: role.to_string(),
            is_active: role != "blocked",
            is_admin: matches!(role, "owner" | "admin"),
            allow_all_groups: false,
            extra_permissions: None,
            created_at: Some(Utc::now()),
        };
        inner.users.push(record.clone());
        record
    }

    pub async fn seed_group(&self, title: &str) {
        self.inner.lock().await.groups.insert(title.to_string());
    }

    pub async fn seed_grant(&self, handle: &str, title: &str) {
        let mut inner = self.inner.lock().await;
        inner.groups.insert(title.to_string());
        inner
            .grants
            .insert((handle.to_string(), title.to_string()));
    }

    /// Add a group message as if it had been logged at `date`.
    pub async fn seed_message(&self, title: &str, from: &str, text: &str, date: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        inner.groups.insert(title.to_string());
        inner.logs.push(LogRow {
            update_id: None,
            chat_id: Some(-100),
            chat_type: Some("supergroup".into()),
            chat_title: Some(title.to_string()),
            message_id: None,
            from_id: 1,
            from_is_bot: false,
            username: Some(from.to_string()),
            first_name: Some(from.to_string()),
            last_name: None,
            language_code: None,
            text: Some(text.to_string()),
            callback_data: None,
            date_ts: date.timestamp(),
            date,
        });
    }

    /// Make every call fail with `StoreError::Unavailable` until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only mutating calls fail; reads keep working.
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Number of mutating calls that reached the store (logs excluded).
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of single-user lookups served.
    pub fn user_reads(&self) -> u64 {
        self.user_reads.load(Ordering::SeqCst)
    }

    pub async fn users(&self) -> Vec<UserRecord> {
        self.inner.lock().await.users.clone()
    }

    pub async fn audits(&self) -> Vec<AuditRecord> {
        self.inner.lock().await.audits.clone()
    }

    pub async fn logs(&self) -> Vec<LogRow> {
        self.inner.lock().await.logs.clone()
    }

    pub async fn pending_of(&self, user_id: i64) -> Option<String> {
        self.inner.lock().await.pending.get(&user_id).cloned()
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        Ok(())
    }

    fn count_write(&self) -> StoreResult<()> {
        self.check()?;
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store writes set to fail".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn count_user_read(&self) -> StoreResult<()> {
        self.check()?;
        self.user_reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_by_handle(&self, handle: &str) -> StoreResult<Option<UserRecord>> {
        self.count_user_read()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.handle.as_deref() == Some(handle))
            .cloned())
    }

    async fn user_by_telegram_id(&self, telegram_id: i64) -> StoreResult<Option<UserRecord>> {
        self.count_user_read()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.telegram_id == Some(telegram_id))
            .cloned())
    }

    async fn user_by_row_id(&self, id: i64) -> StoreResult<Option<UserRecord>> {
        self.count_user_read()?;
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        self.check()?;
        let mut users = self.inner.lock().await.users.clone();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(users)
    }

    async fn search_users(&self, query: &str, limit: usize) -> StoreResult<Vec<UserRecord>> {
        self.check()?;
        let needle = query.trim().trim_start_matches('@').to_lowercase();
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .filter(|u| u.handle.as_deref().is_some_and(|h| h.contains(&needle)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_user(&self, user: &NewUser) -> StoreResult<()> {
        self.count_write()?;
        let mut inner = self.inner.lock().await;
        let duplicate = inner.users.iter().any(|u| {
            (user.handle.is_some() && u.handle == user.handle)
                || (user.telegram_id.is_some() && u.telegram_id == user.telegram_id)
        });
        if duplicate {
            return Err(StoreError::Rejected {
                status: 409,
                body: "duplicate key value violates unique constraint".into(),
            });
        }
        inner.next_id += 1;
        let record = UserRecord {
            id: inner.next_id,
            handle: user.handle.clone(),
            telegram_id: user.telegram_id,
            role: user.role.clone(),
            is_active: user.is_active,
            is_admin: user.is_admin,
            allow_all_groups: false,
            extra_permissions: None,
            created_at: Some(Utc::now()),
        };
        inner.users.push(record);
        Ok(())
    }

    async fn update_user_role(&self, id: i64, patch: &RolePatch) -> StoreResult<()> {
        self.count_write()?;
        let mut inner = self.inner.lock().await;
        if let Some(u) = inner.users.iter_mut().find(|u| u.id == id) {
            u.role = patch.role.clone();
            u.is_active = patch.is_active;
            u.is_admin = patch.is_admin;
        }
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        self.count_write()?;
        self.inner.lock().await.users.retain(|u| u.id != id);
        Ok(())
    }

    async fn all_group_titles(&self) -> StoreResult<Vec<String>> {
        self.check()?;
        Ok(self.inner.lock().await.groups.iter().cloned().collect())
    }

    async fn granted_titles(&self, handle: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .grants
            .iter()
            .filter(|(h, _)| h == handle)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn add_grant(&self, handle: &str, title: &str) -> StoreResult<()> {
        self.count_write()?;
        self.inner
            .lock()
            .await
            .grants
            .insert((handle.to_string(), title.to_string()));
        Ok(())
    }

    async fn remove_grant(&self, handle: &str, title: &str) -> StoreResult<()> {
        self.count_write()?;
        self.inner
            .lock()
            .await
            .grants
            .remove(&(handle.to_string(), title.to_string()));
        Ok(())
    }

    async fn group_stats(&self, title: &str, now: DateTime<Utc>) -> StoreResult<GroupStats> {
        self.check()?;
        let inner = self.inner.lock().await;
        let week_ago = now - Duration::days(7);
        let month_ago = now - Duration::days(30);
        let mut stats = GroupStats::default();
        for row in inner
            .logs
            .iter()
            .filter(|r| r.chat_title.as_deref() == Some(title))
        {
            stats.total += 1;
            if row.date >= week_ago {
                stats.weekly += 1;
            }
            if row.date >= month_ago {
                stats.monthly += 1;
            }
        }
        Ok(stats)
    }

    async fn group_messages(
        &self,
        title: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<GroupMessage>> {
        self.check()?;
        let inner = self.inner.lock().await;
        let mut rows: Vec<&LogRow> = inner
            .logs
            .iter()
            .filter(|r| r.chat_title.as_deref() == Some(title) && r.date >= since)
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|r| GroupMessage {
                text: r.text.clone(),
                first_name: r.first_name.clone(),
                username: r.username.clone(),
                date: r.date,
            })
            .collect())
    }

    async fn set_pending(&self, user_id: i64, mode: &str) -> StoreResult<()> {
        self.count_write()?;
        self.inner
            .lock()
            .await
            .pending
            .insert(user_id, mode.to_string());
        Ok(())
    }

    async fn get_pending(&self, user_id: i64) -> StoreResult<Option<String>> {
        self.check()?;
        Ok(self.inner.lock().await.pending.get(&user_id).cloned())
    }

    async fn clear_pending(&self, user_id: i64) -> StoreResult<()> {
        self.check()?;
        // Clearing an empty slot is not a write.
        if self.inner.lock().await.pending.remove(&user_id).is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn user_settings(&self, user_id: i64) -> StoreResult<Option<UserSettings>> {
        self.check()?;
        Ok(self.inner.lock().await.user_settings.get(&user_id).cloned())
    }

    async fn save_user_settings(&self, user_id: i64, settings: &UserSettings) -> StoreResult<()> {
        self.count_write()?;
        self.inner
            .lock()
            .await
            .user_settings
            .insert(user_id, settings.clone());
        Ok(())
    }

    async fn bot_settings(&self) -> StoreResult<BotSettings> {
        self.check()?;
        Ok(self.inner.lock().await.bot_settings.clone())
    }

    async fn save_bot_settings(&self, settings: &BotSettings) -> StoreResult<()> {
        self.count_write()?;
        self.inner.lock().await.bot_settings = settings.clone();
        Ok(())
    }

    async fn insert_log(&self, row: &LogRow) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let is_group = matches!(row.chat_type.as_deref(), Some("group" | "supergroup"));
        if let (true, Some(title)) = (is_group, row.chat_title.as_ref()) {
            inner.groups.insert(title.clone());
        }
        inner.logs.push(row.clone());
        Ok(())
    }

    async fn insert_audit(&self, record: &AuditRecord) -> StoreResult<()> {
        self.check()?;
        self.inner.lock().await.audits.push(record.clone());
        Ok(())
    }

    async fn recent_audit(&self, limit: usize) -> StoreResult<Vec<AuditRecord>> {
        self.check()?;
        let inner = self.inner.lock().await;
        let mut out = inner.audits.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_slot_is_a_keyed_upsert() {
        let store = MemoryStore::new();
        store.set_pending(7, "await_search_query").await.unwrap();
        store.set_pending(7, "await_adduser|admin").await.unwrap();
        assert_eq!(
            store.get_pending(7).await.unwrap().as_deref(),
            Some("await_adduser|admin")
        );
        store.clear_pending(7).await.unwrap();
        store.clear_pending(7).await.unwrap();
        assert_eq!(store.get_pending(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_handle_is_rejected() {
        let store = MemoryStore::new();
        let new = NewUser {
            handle: Some("alice".into()),
            telegram_id: None,
            role: "user".into(),
            is_active: true,
            is_admin: false,
        };
        store.insert_user(&new).await.unwrap();
        let err = store.insert_user(&new).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 409, .. }));
        assert_eq!(store.users().await.len(), 1);
    }

    #[tokio::test]
    async fn group_messages_are_newest_first_within_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .seed_message("Ops", "a", "old", now - Duration::days(40))
            .await;
        store
            .seed_message("Ops", "b", "recent", now - Duration::days(2))
            .await;
        store
            .seed_message("Ops", "c", "newest", now - Duration::hours(1))
            .await;

        let msgs = store
            .group_messages("Ops", now - Duration::days(7), 500)
            .await
            .unwrap();
        let texts: Vec<_> = msgs.iter().filter_map(|m| m.text.as_deref()).collect();
        assert_eq!(texts, vec!["newest", "recent"]);

        let stats = store.group_stats("Ops", now).await.unwrap();
        assert_eq!(
            stats,
            GroupStats {
                total: 3,
                weekly: 2,
                monthly: 2
            }
        );
    }

    #[tokio::test]
    async fn failing_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(matches!(
            store.list_users().await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.writes(), 0);
    }
}
