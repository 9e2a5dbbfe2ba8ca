//! Telegram update handlers.
//!
//! Each handler converts the teloxide type into the engine's update model,
//! takes the per-chat lock and hands the update over. The engine never
//! fails, so handlers always return `Ok`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Chat, ForwardedFrom, User},
};

use tsb_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{
        CallbackQuery as InboundCallback, ChatInfo, ChatKind, IdentityHint, IncomingUpdate,
        Sender, TextMessage,
    },
};

use crate::router::AppState;

pub async fn handle_message(
    update: Update,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(inbound) = message_update(i64::from(update.id), &msg) else {
        return Ok(());
    };
    let _guard = state.chat_locks.lock_chat(msg.chat.id.0).await;
    state.engine.handle(inbound).await;
    Ok(())
}

pub async fn handle_callback(
    update: Update,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let inbound = callback_update(i64::from(update.id), &q);
    let chat = q.message.as_ref().map(|m| m.chat.id.0).unwrap_or(q.from.id.0 as i64);
    let _guard = state.chat_locks.lock_chat(chat).await;
    state.engine.handle(inbound).await;
    Ok(())
}

fn sender(user: &User) -> Sender {
    Sender {
        user_id: UserId(user.id.0 as i64),
        is_bot: user.is_bot,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
    }
}

fn chat_info(chat: &Chat) -> ChatInfo {
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_group() {
        ChatKind::Group
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else {
        ChatKind::Channel
    };
    ChatInfo {
        chat_id: ChatId(chat.id.0),
        kind,
        title: chat.title().map(str::to_string),
    }
}

/// Messages without an author (channel posts) are dropped.
pub fn message_update(update_id: i64, msg: &Message) -> Option<IncomingUpdate> {
    let from = msg.from()?;

    let contact = msg.contact().map(|c| IdentityHint {
        user_id: c.user_id.map(|id| id.0 as i64),
        username: None,
    });
    let forward = msg.forward();
    let forwarded_from = forward.and_then(|f| match &f.from {
        ForwardedFrom::User(u) => Some(IdentityHint {
            user_id: Some(u.id.0 as i64),
            username: u.username.clone(),
        }),
        _ => None,
    });

    Some(IncomingUpdate::Text(TextMessage {
        update_id,
        chat: chat_info(&msg.chat),
        message_id: MessageId(msg.id.0),
        sender: sender(from),
        text: msg
            .text()
            .or_else(|| msg.caption())
            .unwrap_or_default()
            .to_string(),
        date: Some(msg.date),
        contact,
        forwarded_from,
        is_forwarded: forward.is_some(),
    }))
}

pub fn callback_update(update_id: i64, q: &CallbackQuery) -> IncomingUpdate {
    IncomingUpdate::Callback(InboundCallback {
        update_id,
        chat: q.message.as_ref().map(|m| chat_info(&m.chat)),
        sender: sender(&q.from),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
        message: q.message.as_ref().map(|m| MessageRef {
            chat_id: ChatId(m.chat.id.0),
            message_id: MessageId(m.id.0),
        }),
        message_text: q.message.as_ref().and_then(|m| m.text()).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(extra: serde_json::Value) -> Message {
        let mut base = json!({
            "message_id": 10,
            "date": 1_700_000_000,
            "chat": { "id": 42, "type": "private", "first_name": "Ann" },
            "from": { "id": 42, "is_bot": false, "first_name": "Ann", "username": "ann" },
        });
        if let (Some(b), Some(e)) = (base.as_object_mut(), extra.as_object()) {
            b.extend(e.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn text_message_converts() {
        let msg = message(json!({ "text": "/start" }));
        let Some(IncomingUpdate::Text(t)) = message_update(5, &msg) else {
            panic!("expected text update");
        };
        assert_eq!(t.update_id, 5);
        assert_eq!(t.text, "/start");
        assert_eq!(t.chat.kind, ChatKind::Private);
        assert_eq!(t.sender.username.as_deref(), Some("ann"));
        assert!(!t.is_forwarded);
    }

    #[test]
    fn contact_card_carries_user_id() {
        let msg = message(json!({
            "contact": { "phone_number": "+100", "first_name": "Bob", "user_id": 77 }
        }));
        let Some(IncomingUpdate::Text(t)) = message_update(1, &msg) else {
            panic!("expected text update");
        };
        assert_eq!(t.text, "");
        assert_eq!(t.contact.and_then(|c| c.user_id), Some(77));
    }

    #[test]
    fn forward_discloses_original_author() {
        let msg = message(json!({
            "text": "hello",
            "forward_date": 1_700_000_000,
            "forward_from": { "id": 99, "is_bot": false, "first_name": "Cy", "username": "cy" }
        }));
        let Some(IncomingUpdate::Text(t)) = message_update(1, &msg) else {
            panic!("expected text update");
        };
        assert!(t.is_forwarded);
        let hint = t.forwarded_from.unwrap();
        assert_eq!(hint.user_id, Some(99));
        assert_eq!(hint.username.as_deref(), Some("cy"));
    }

    #[test]
    fn hidden_forward_has_no_author() {
        let msg = message(json!({
            "text": "hello",
            "forward_date": 1_700_000_000,
            "forward_sender_name": "Someone"
        }));
        let Some(IncomingUpdate::Text(t)) = message_update(1, &msg) else {
            panic!("expected text update");
        };
        assert!(t.is_forwarded);
        assert!(t.forwarded_from.is_none());
    }

    #[test]
    fn group_chat_keeps_title() {
        let msg = message(json!({
            "text": "hi all",
            "chat": { "id": -100, "type": "supergroup", "title": "Ops" }
        }));
        let update = message_update(1, &msg).unwrap();
        assert!(!update.is_private());
        assert_eq!(update.chat().and_then(|c| c.title.as_deref()), Some("Ops"));
        assert_eq!(update.chat().map(|c| c.kind), Some(ChatKind::Supergroup));
    }
}
