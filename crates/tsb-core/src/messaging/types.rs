use chrono::{DateTime, Utc};

use crate::domain::{ChatId, MessageId, MessageRef, UserId};

/// Inbound update, already stripped of transport types.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Text(TextMessage),
    Callback(CallbackQuery),
}

impl IncomingUpdate {
    pub fn sender(&self) -> &Sender {
        match self {
            IncomingUpdate::Text(m) => &m.sender,
            IncomingUpdate::Callback(q) => &q.sender,
        }
    }

    pub fn chat(&self) -> Option<&ChatInfo> {
        match self {
            IncomingUpdate::Text(m) => Some(&m.chat),
            IncomingUpdate::Callback(q) => q.chat.as_ref(),
        }
    }

    pub fn is_private(&self) -> bool {
        self.chat().is_some_and(|c| c.kind == ChatKind::Private)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Sender {
    pub user_id: UserId,
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl Sender {
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_string()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChatKind {
    #[default]
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
            ChatKind::Supergroup => "supergroup",
            ChatKind::Channel => "channel",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChatInfo {
    pub chat_id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
}

/// A user identity carried by a contact card or a forwarded message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityHint {
    pub user_id: Option<i64>,
    pub username: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct TextMessage {
    pub update_id: i64,
    pub chat: ChatInfo,
    pub message_id: MessageId,
    pub sender: Sender,
    /// Message text, or caption, or empty for contact cards.
    pub text: String,
    pub date: Option<DateTime<Utc>>,
    pub contact: Option<IdentityHint>,
    /// Original author of a forwarded message, when Telegram discloses it.
    pub forwarded_from: Option<IdentityHint>,
    /// True for any forward, including hidden-sender forwards.
    pub is_forwarded: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CallbackQuery {
    pub update_id: i64,
    pub chat: Option<ChatInfo>,
    pub sender: Sender,
    pub callback_id: String,
    pub data: String,
    /// Message the pressed button is attached to.
    pub message: Option<MessageRef>,
    pub message_text: Option<String>,
}

/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub data: String,
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Inline keyboard: rows of buttons attached to one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a one-button row.
    pub fn button(mut self, label: impl Into<String>, data: impl Into<String>) -> Self {
        self.rows.push(vec![InlineButton::callback(label, data)]);
        self
    }

    pub fn row(mut self, row: Vec<InlineButton>) -> Self {
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    pub fn push_row(&mut self, row: Vec<InlineButton>) {
        if !row.is_empty() {
            self.rows.push(row);
        }
    }

    /// All callback payloads, row-major.
    pub fn callback_data(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.data.as_str())
            .collect()
    }
}

/// Persistent reply keyboard (the main menu under the input box).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_edit: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
}
