//! Supabase adapter: the `Store` port over PostgREST.
//!
//! Handles are kept in `telegram_username` with a leading `@`; older rows may
//! lack it, so lookups match both spellings.

mod client;
mod rows;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use tsb_core::{
    domain::{
        AuditRecord, BotSettings, GroupMessage, GroupStats, LogRow, NewUser, RolePatch, UserRecord,
        UserSettings,
    },
    store::{Store, StoreResult},
};

use client::{eq, in_list, Rest};
use rows::{
    settings_from_row, settings_with_key, titles, AuditRow, GrantRow, MessageRow, NewUserRow,
    PendingRow, TitleRow, UserRow,
};

const USERS: &str = "allowed_users";
const GROUPS: &str = "chat_groups";
const GRANTS: &str = "user_group_permissions";
const PENDING: &str = "pending_requests";
const USER_SETTINGS: &str = "user_settings";
const BOT_SETTINGS: &str = "bot_settings";
const UPDATES: &str = "telegram_updates";
const AUDIT: &str = "audit_logs";

const BOT_SETTINGS_ROW: i64 = 1;

#[derive(Clone)]
pub struct SupabaseStore {
    rest: Rest,
}

impl SupabaseStore {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> StoreResult<Self> {
        Ok(Self {
            rest: Rest::new(url, api_key, timeout)?,
        })
    }

    async fn first_user(&self, column: &str, filter: String) -> StoreResult<Option<UserRecord>> {
        let rows: Vec<UserRow> = self
            .rest
            .select(
                USERS,
                &[("select", "*".into()), (column, filter), ("limit", "1".into())],
            )
            .await?;
        Ok(rows.into_iter().next().map(UserRecord::from))
    }

    async fn count_updates(&self, title: &str, since: Option<DateTime<Utc>>) -> StoreResult<u64> {
        let mut query = vec![("chat_title", eq(title))];
        if let Some(since) = since {
            query.push(("date", format!("gte.{}", since.to_rfc3339())));
        }
        self.rest.count(UPDATES, &query).await
    }
}

fn handle_spellings(handle: &str) -> String {
    in_list([handle, format!("@{handle}").as_str()])
}

#[async_trait]
impl Store for SupabaseStore {
    async fn user_by_handle(&self, handle: &str) -> StoreResult<Option<UserRecord>> {
        self.first_user("telegram_username", handle_spellings(handle))
            .await
    }

    async fn user_by_telegram_id(&self, telegram_id: i64) -> StoreResult<Option<UserRecord>> {
        self.first_user("telegram_user_id", eq(telegram_id)).await
    }

    async fn user_by_row_id(&self, id: i64) -> StoreResult<Option<UserRecord>> {
        self.first_user("id", eq(id)).await
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        let rows: Vec<UserRow> = self
            .rest
            .select(
                USERS,
                &[("select", "*".into()), ("order", "created_at.asc".into())],
            )
            .await?;
        Ok(rows.into_iter().map(UserRecord::from).collect())
    }

    async fn search_users(&self, query: &str, limit: usize) -> StoreResult<Vec<UserRecord>> {
        let needle = query.trim().trim_start_matches('@').replace('*', "");
        let rows: Vec<UserRow> = self
            .rest
            .select(
                USERS,
                &[
                    ("select", "*".into()),
                    ("telegram_username", format!("ilike.*{needle}*")),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(UserRecord::from).collect())
    }

    async fn insert_user(&self, user: &NewUser) -> StoreResult<()> {
        self.rest.insert(USERS, &NewUserRow::from(user), None).await
    }

    async fn update_user_role(&self, id: i64, patch: &RolePatch) -> StoreResult<()> {
        self.rest.update(USERS, &[("id", eq(id))], patch).await
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        self.rest.delete(USERS, &[("id", eq(id))]).await
    }

    async fn all_group_titles(&self) -> StoreResult<Vec<String>> {
        let rows: Vec<TitleRow> = self
            .rest
            .select(
                GROUPS,
                &[("select", "chat_title".into()), ("order", "chat_title.asc".into())],
            )
            .await?;
        Ok(titles(rows))
    }

    async fn granted_titles(&self, handle: &str) -> StoreResult<Vec<String>> {
        let rows: Vec<TitleRow> = self
            .rest
            .select(
                GRANTS,
                &[
                    ("select", "chat_title".into()),
                    ("telegram_username", handle_spellings(handle)),
                ],
            )
            .await?;
        Ok(titles(rows))
    }

    async fn add_grant(&self, handle: &str, title: &str) -> StoreResult<()> {
        let row = GrantRow {
            telegram_username: format!("@{handle}"),
            chat_title: title,
        };
        self.rest.insert(GRANTS, &row, None).await
    }

    async fn remove_grant(&self, handle: &str, title: &str) -> StoreResult<()> {
        self.rest
            .delete(
                GRANTS,
                &[
                    ("telegram_username", handle_spellings(handle)),
                    ("chat_title", eq(title)),
                ],
            )
            .await
    }

    async fn group_stats(&self, title: &str, now: DateTime<Utc>) -> StoreResult<GroupStats> {
        let total = self.count_updates(title, None).await?;
        let weekly = self
            .count_updates(title, Some(now - chrono::Duration::days(7)))
            .await?;
        let monthly = self
            .count_updates(title, Some(now - chrono::Duration::days(30)))
            .await?;
        Ok(GroupStats {
            total,
            weekly,
            monthly,
        })
    }

    async fn group_messages(
        &self,
        title: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<GroupMessage>> {
        let rows: Vec<MessageRow> = self
            .rest
            .select(
                UPDATES,
                &[
                    ("select", "text,first_name,username,date".into()),
                    ("chat_title", eq(title)),
                    ("date", format!("gte.{}", since.to_rfc3339())),
                    ("order", "date.desc".into()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().filter_map(MessageRow::into_message).collect())
    }

    async fn set_pending(&self, user_id: i64, mode: &str) -> StoreResult<()> {
        let row = PendingRow {
            user_id,
            mode: Some(mode.to_string()),
        };
        self.rest.insert(PENDING, &row, Some("user_id")).await
    }

    async fn get_pending(&self, user_id: i64) -> StoreResult<Option<String>> {
        let rows: Vec<PendingRow> = self
            .rest
            .select(
                PENDING,
                &[
                    ("select", "user_id,mode".into()),
                    ("user_id", eq(user_id)),
                    ("limit", "1".into()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next().and_then(|r| r.mode))
    }

    async fn clear_pending(&self, user_id: i64) -> StoreResult<()> {
        self.rest.delete(PENDING, &[("user_id", eq(user_id))]).await
    }

    async fn user_settings(&self, user_id: i64) -> StoreResult<Option<UserSettings>> {
        let rows: Vec<Value> = self
            .rest
            .select(
                USER_SETTINGS,
                &[
                    ("select", "*".into()),
                    ("telegram_user_id", eq(user_id)),
                    ("limit", "1".into()),
                ],
            )
            .await?;
        rows.into_iter()
            .next()
            .map(|row| settings_from_row(USER_SETTINGS, row))
            .transpose()
    }

    async fn save_user_settings(&self, user_id: i64, settings: &UserSettings) -> StoreResult<()> {
        let body = settings_with_key(USER_SETTINGS, "telegram_user_id", user_id, settings)?;
        self.rest
            .insert(USER_SETTINGS, &body, Some("telegram_user_id"))
            .await
    }

    async fn bot_settings(&self) -> StoreResult<BotSettings> {
        let rows: Vec<Value> = self
            .rest
            .select(BOT_SETTINGS, &[("select", "*".into()), ("limit", "1".into())])
            .await?;
        match rows.into_iter().next() {
            Some(row) => settings_from_row(BOT_SETTINGS, row),
            None => Ok(BotSettings::default()),
        }
    }

    async fn save_bot_settings(&self, settings: &BotSettings) -> StoreResult<()> {
        let body = settings_with_key(BOT_SETTINGS, "id", BOT_SETTINGS_ROW, settings)?;
        self.rest.insert(BOT_SETTINGS, &body, Some("id")).await
    }

    async fn insert_log(&self, row: &LogRow) -> StoreResult<()> {
        self.rest.insert(UPDATES, row, None).await?;
        let is_group = matches!(row.chat_type.as_deref(), Some("group" | "supergroup"));
        if let (true, Some(title)) = (is_group, row.chat_title.as_deref()) {
            debug!(group = title, "registering group");
            self.rest
                .insert_ignoring_duplicates(GROUPS, &serde_json::json!({ "chat_title": title }), "chat_title")
                .await?;
        }
        Ok(())
    }

    async fn insert_audit(&self, record: &AuditRecord) -> StoreResult<()> {
        self.rest.insert(AUDIT, &AuditRow::from(record), None).await
    }

    async fn recent_audit(&self, limit: usize) -> StoreResult<Vec<AuditRecord>> {
        let rows: Vec<AuditRow> = self
            .rest
            .select(
                AUDIT,
                &[
                    ("select", "action,admin_username,target,details,created_at".into()),
                    ("order", "created_at.desc".into()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(AuditRow::into_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_match_both_spellings() {
        assert_eq!(handle_spellings("alice"), r#"in.("alice","@alice")"#);
    }
}
