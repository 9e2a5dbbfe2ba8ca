use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Registry row for a user the console knows about.
///
/// `role` is kept as the raw stored string; `permissions::effective_role`
/// decides what it means.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Store row id (used in action strings).
    pub id: i64,
    /// Normalized handle: no `@`, lowercase.
    pub handle: Option<String>,
    pub telegram_id: Option<i64>,
    pub role: String,
    pub is_active: bool,
    /// Legacy flag from before roles existed.
    pub is_admin: bool,
    /// Legacy "sees every group" flag.
    pub allow_all_groups: bool,
    pub extra_permissions: Option<Vec<String>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// `@handle`, or the numeric id when the user was registered without one.
    pub fn display_name(&self) -> String {
        match (&self.handle, self.telegram_id) {
            (Some(h), _) => format!("@{h}"),
            (None, Some(id)) => format!("#{id}"),
            (None, None) => format!("row {}", self.id),
        }
    }
}

/// Insert payload for a new registry row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewUser {
    pub handle: Option<String>,
    pub telegram_id: Option<i64>,
    pub role: String,
    pub is_active: bool,
    pub is_admin: bool,
}

/// Fields written when an operator changes a user's role.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RolePatch {
    pub role: String,
    pub is_active: bool,
    pub is_admin: bool,
}

/// Per-group message counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub total: u64,
    pub weekly: u64,
    pub monthly: u64,
}

/// A logged group message, as fed to the report generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupMessage {
    pub text: Option<String>,
    pub first_name: Option<String>,
    pub username: Option<String>,
    pub date: DateTime<Utc>,
}

/// Traffic log row, built cheaply from an inbound update.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRow {
    pub update_id: Option<i64>,
    pub chat_id: Option<i64>,
    pub chat_type: Option<String>,
    pub chat_title: Option<String>,
    pub message_id: Option<i32>,
    pub from_id: i64,
    pub from_is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub text: Option<String>,
    pub callback_data: Option<String>,
    pub date_ts: i64,
    pub date: DateTime<Utc>,
}

/// Structured record of a privileged mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub actor: String,
    pub target: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        action: &str,
        actor: impl Into<String>,
        target: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            action: action.to_string(),
            actor: actor.into(),
            target: target.into(),
            details,
            created_at: Utc::now(),
        }
    }
}

/// Audit action names.
pub mod audit_action {
    pub const ADD_USER: &str = "ADD_USER";
    pub const DELETE_USER: &str = "DELETE_USER";
    pub const CHANGE_ROLE: &str = "CHANGE_ROLE";
    pub const ADD_USER_GROUP: &str = "ADD_USER_GROUP";
    pub const REMOVE_USER_GROUP: &str = "REMOVE_USER_GROUP";
    pub const UPDATE_BOT_SETTINGS: &str = "UPDATE_BOT_SETTINGS";
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fa,
    En,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Fa => "fa",
            Language::En => "en",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fa" => Some(Language::Fa),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Language::Fa => "🇮🇷 فارسی",
            Language::En => "🇬🇧 English",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    #[default]
    Shamsi,
    Miladi,
}

impl DateFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            DateFormat::Shamsi => "shamsi",
            DateFormat::Miladi => "miladi",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "shamsi" => Some(DateFormat::Shamsi),
            "miladi" => Some(DateFormat::Miladi),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DateFormat::Shamsi => "Solar Hijri",
            DateFormat::Miladi => "Gregorian",
        }
    }
}

pub const PAGE_SIZE_OPTIONS: [u8; 4] = [5, 10, 15, 20];

/// Per-user preferences. Missing fields fall back to defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub notifications: bool,
    pub page_size: u8,
    pub auto_report: bool,
    pub date_format: DateFormat,
    pub language: Language,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            notifications: true,
            page_size: 5,
            auto_report: false,
            date_format: DateFormat::default(),
            language: Language::default(),
        }
    }
}

/// Console-wide settings (single row).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// Greeting template; `{name}` is replaced with the user's name.
    pub welcome_message: Option<String>,
    pub default_language: Option<Language>,
}

/// Normalize a Telegram handle: trim, strip a leading `@`, lowercase.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let norm = raw.trim().trim_start_matches('@').trim().to_lowercase();
    if norm.is_empty() {
        None
    } else {
        Some(norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handle_strips_at_and_case() {
        assert_eq!(normalize_handle("  @Alice "), Some("alice".to_string()));
        assert_eq!(normalize_handle("bob"), Some("bob".to_string()));
        assert_eq!(normalize_handle("@"), None);
        assert_eq!(normalize_handle("   "), None);
    }

    #[test]
    fn user_settings_fill_missing_fields_with_defaults() {
        let s: UserSettings = serde_json::from_str(r#"{"page_size": 10}"#).unwrap();
        assert_eq!(s.page_size, 10);
        assert!(s.notifications);
        assert_eq!(s.language, Language::Fa);
    }

    #[test]
    fn display_name_prefers_handle() {
        let mut u = UserRecord {
            id: 3,
            handle: Some("alice".into()),
            telegram_id: Some(42),
            role: "user".into(),
            is_active: true,
            is_admin: false,
            allow_all_groups: false,
            extra_permissions: None,
            created_at: None,
        };
        assert_eq!(u.display_name(), "@alice");
        u.handle = None;
        assert_eq!(u.display_name(), "#42");
    }
}
