//! Backing-store port.
//!
//! Every call is async and reports failures as `StoreError`; this is the one
//! place where store failures are mapped before the engine sees them.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AuditRecord, BotSettings, GroupMessage, GroupStats, LogRow, NewUser, RolePatch, UserRecord,
    UserSettings,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport-level failure: the store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but refused the request.
    #[error("store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The response did not have the expected shape.
    #[error("could not decode store response: {0}")]
    Decode(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // Users. Handles passed in are already normalized.
    async fn user_by_handle(&self, handle: &str) -> StoreResult<Option<UserRecord>>;
    async fn user_by_telegram_id(&self, telegram_id: i64) -> StoreResult<Option<UserRecord>>;
    async fn user_by_row_id(&self, id: i64) -> StoreResult<Option<UserRecord>>;
    /// All users, oldest first.
    async fn list_users(&self) -> StoreResult<Vec<UserRecord>>;
    /// Case-insensitive handle substring match.
    async fn search_users(&self, query: &str, limit: usize) -> StoreResult<Vec<UserRecord>>;
    async fn insert_user(&self, user: &NewUser) -> StoreResult<()>;
    async fn update_user_role(&self, id: i64, patch: &RolePatch) -> StoreResult<()>;
    async fn delete_user(&self, id: i64) -> StoreResult<()>;

    // Groups and grants.
    /// Every known group title, sorted and de-duplicated.
    async fn all_group_titles(&self) -> StoreResult<Vec<String>>;
    /// Titles granted to a handle, sorted and de-duplicated.
    async fn granted_titles(&self, handle: &str) -> StoreResult<Vec<String>>;
    async fn add_grant(&self, handle: &str, title: &str) -> StoreResult<()>;
    async fn remove_grant(&self, handle: &str, title: &str) -> StoreResult<()>;
    async fn group_stats(&self, title: &str, now: DateTime<Utc>) -> StoreResult<GroupStats>;
    /// Messages logged for a group since `since`, newest first.
    async fn group_messages(
        &self,
        title: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<GroupMessage>>;

    // Pending conversation slot (keyed upsert / delete).
    async fn set_pending(&self, user_id: i64, mode: &str) -> StoreResult<()>;
    async fn get_pending(&self, user_id: i64) -> StoreResult<Option<String>>;
    async fn clear_pending(&self, user_id: i64) -> StoreResult<()>;

    // Settings.
    async fn user_settings(&self, user_id: i64) -> StoreResult<Option<UserSettings>>;
    async fn save_user_settings(&self, user_id: i64, settings: &UserSettings) -> StoreResult<()>;
    async fn bot_settings(&self) -> StoreResult<BotSettings>;
    async fn save_bot_settings(&self, settings: &BotSettings) -> StoreResult<()>;

    // Append-only logs.
    async fn insert_log(&self, row: &LogRow) -> StoreResult<()>;
    async fn insert_audit(&self, record: &AuditRecord) -> StoreResult<()>;
    /// Newest first.
    async fn recent_audit(&self, limit: usize) -> StoreResult<Vec<AuditRecord>>;
}
