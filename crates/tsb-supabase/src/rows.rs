//! Wire shapes of the PostgREST tables and their conversion to domain types.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tsb_core::{
    domain::{normalize_handle, AuditRecord, GroupMessage, NewUser, UserRecord},
    store::{StoreError, StoreResult},
};

/// Postgres timestamps arrive with or without an offset.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|n| n.and_utc())
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserRow {
    id: i64,
    #[serde(default)]
    telegram_username: Option<String>,
    #[serde(default)]
    telegram_user_id: Option<i64>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    is_admin: Option<bool>,
    #[serde(default)]
    allow_all_groups: Option<bool>,
    #[serde(default)]
    extra_permissions: Option<Value>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        let extra_permissions = match row.extra_permissions {
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        };
        UserRecord {
            id: row.id,
            handle: row.telegram_username.as_deref().and_then(normalize_handle),
            telegram_id: row.telegram_user_id,
            role: row.role.unwrap_or_default(),
            is_active: row.is_active.unwrap_or(true),
            is_admin: row.is_admin.unwrap_or(false),
            allow_all_groups: row.allow_all_groups.unwrap_or(false),
            extra_permissions,
            created_at: row.created_at.as_deref().and_then(parse_timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct NewUserRow<'a> {
    telegram_username: Option<String>,
    telegram_user_id: Option<i64>,
    role: &'a str,
    is_active: bool,
    is_admin: bool,
}

impl<'a> From<&'a NewUser> for NewUserRow<'a> {
    fn from(u: &'a NewUser) -> Self {
        Self {
            telegram_username: u.handle.as_ref().map(|h| format!("@{h}")),
            telegram_user_id: u.telegram_id,
            role: &u.role,
            is_active: u.is_active,
            is_admin: u.is_admin,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GrantRow<'a> {
    pub(crate) telegram_username: String,
    pub(crate) chat_title: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TitleRow {
    #[serde(default)]
    pub(crate) chat_title: Option<String>,
}

/// Sorted, de-duplicated, blanks dropped.
pub(crate) fn titles(rows: Vec<TitleRow>) -> Vec<String> {
    let mut out: Vec<String> = rows
        .into_iter()
        .filter_map(|r| r.chat_title)
        .filter(|t| !t.trim().is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PendingRow {
    #[serde(default)]
    pub(crate) user_id: i64,
    pub(crate) mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageRow {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

impl MessageRow {
    /// Rows without a readable date are skipped.
    pub(crate) fn into_message(self) -> Option<GroupMessage> {
        let date = self.date.as_deref().and_then(parse_timestamp)?;
        Some(GroupMessage {
            text: self.text,
            first_name: self.first_name,
            username: self.username,
            date,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AuditRow {
    pub(crate) action: String,
    #[serde(default)]
    pub(crate) admin_username: Option<String>,
    #[serde(default)]
    pub(crate) target: Option<String>,
    #[serde(default)]
    pub(crate) details: Option<Value>,
    pub(crate) created_at: String,
}

impl From<&AuditRecord> for AuditRow {
    fn from(r: &AuditRecord) -> Self {
        Self {
            action: r.action.clone(),
            admin_username: Some(r.actor.clone()),
            target: Some(r.target.clone()),
            details: Some(r.details.clone()),
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

impl AuditRow {
    pub(crate) fn into_record(self) -> AuditRecord {
        AuditRecord {
            created_at: parse_timestamp(&self.created_at).unwrap_or_default(),
            action: self.action,
            actor: self.admin_username.unwrap_or_default(),
            target: self.target.unwrap_or_default(),
            details: self.details.unwrap_or(Value::Null),
        }
    }
}

/// Decode a settings row, letting null columns fall back to defaults.
pub(crate) fn settings_from_row<T: serde::de::DeserializeOwned>(
    table: &str,
    row: Value,
) -> StoreResult<T> {
    let cleaned = match row {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    };
    serde_json::from_value(cleaned).map_err(|e| StoreError::Decode(format!("{table}: {e}")))
}

/// A settings struct plus its key column, for upserts.
pub(crate) fn settings_with_key<T: Serialize>(
    table: &str,
    key: &str,
    id: i64,
    settings: &T,
) -> StoreResult<Value> {
    let mut value =
        serde_json::to_value(settings).map_err(|e| StoreError::Decode(format!("{table}: {e}")))?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert(key.to_string(), Value::from(id));
            Ok(value)
        }
        None => Err(StoreError::Decode(format!("{table}: settings are not an object"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tsb_core::domain::{BotSettings, Language, UserSettings};

    use super::*;

    #[test]
    fn user_rows_are_normalized_and_tolerant() {
        let row: UserRow = serde_json::from_value(json!({
            "id": 7,
            "telegram_username": "@Alice",
            "role": null,
            "is_active": null,
            "extra_permissions": ["export_data", 3],
            "created_at": "2024-05-01T10:00:00.123456"
        }))
        .unwrap();
        let rec = UserRecord::from(row);
        assert_eq!(rec.handle.as_deref(), Some("alice"));
        assert_eq!(rec.role, "");
        assert!(rec.is_active);
        assert!(!rec.is_admin);
        assert_eq!(rec.extra_permissions, Some(vec!["export_data".to_string()]));
        assert!(rec.created_at.is_some());
    }

    #[test]
    fn new_users_are_written_with_at_prefix() {
        let u = NewUser {
            handle: Some("bob".into()),
            telegram_id: None,
            role: "user".into(),
            is_active: true,
            is_admin: false,
        };
        let v = serde_json::to_value(NewUserRow::from(&u)).unwrap();
        assert_eq!(v["telegram_username"], "@bob");
        assert_eq!(v["telegram_user_id"], Value::Null);
    }

    #[test]
    fn timestamps_with_and_without_offset() {
        assert!(parse_timestamp("2024-05-01T10:00:00+00:00").is_some());
        assert!(parse_timestamp("2024-05-01 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn title_rows_are_sorted_and_unique() {
        let rows = vec![
            TitleRow { chat_title: Some("Sales".into()) },
            TitleRow { chat_title: None },
            TitleRow { chat_title: Some("Ops".into()) },
            TitleRow { chat_title: Some("Sales".into()) },
            TitleRow { chat_title: Some(" ".into()) },
        ];
        assert_eq!(titles(rows), vec!["Ops", "Sales"]);
    }

    #[test]
    fn null_settings_columns_use_defaults() {
        let s: UserSettings = settings_from_row(
            "user_settings",
            json!({"telegram_user_id": 5, "notifications": null, "language": "en"}),
        )
        .unwrap();
        assert!(s.notifications);
        assert_eq!(s.language, Language::En);

        let b: BotSettings = settings_from_row("bot_settings", json!({"id": 1, "welcome_message": null})).unwrap();
        assert_eq!(b, BotSettings::default());
    }

    #[test]
    fn settings_upsert_carries_key() {
        let v = settings_with_key("user_settings", "telegram_user_id", 9, &UserSettings::default()).unwrap();
        assert_eq!(v["telegram_user_id"], 9);
        assert_eq!(v["page_size"], 5);
    }

    #[test]
    fn audit_rows_use_admin_username_column() {
        let rec = AuditRecord::new("ADD_USER", "op", "@bob", json!({"role": "user"}));
        let row = AuditRow::from(&rec);
        assert_eq!(row.admin_username.as_deref(), Some("op"));
        let back = row.into_record();
        assert_eq!(back.actor, "op");
        assert_eq!(back.details["role"], "user");
    }
}
