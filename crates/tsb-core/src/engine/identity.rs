use crate::{
    domain::normalize_handle,
    messaging::types::{IdentityHint, TextMessage},
};

/// Who an operator means when answering the add-user prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Identity {
    pub telegram_id: Option<i64>,
    /// Normalized.
    pub handle: Option<String>,
}

impl Identity {
    pub(crate) fn display(&self) -> String {
        match (&self.handle, self.telegram_id) {
            (Some(h), _) => format!("@{h}"),
            (None, Some(id)) => id.to_string(),
            (None, None) => "-".to_string(),
        }
    }

    fn from_hint(hint: &IdentityHint) -> Option<Self> {
        let handle = hint.username.as_deref().and_then(normalize_handle);
        if hint.user_id.is_none() && handle.is_none() {
            return None;
        }
        Some(Self {
            telegram_id: hint.user_id,
            handle,
        })
    }
}

fn is_handle(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Contact card first, then a disclosed forward, then the text itself.
///
/// Hidden-sender forwards are never read as text: their body is somebody
/// else's words.
pub(crate) fn extract_identity(msg: &TextMessage) -> Option<Identity> {
    if let Some(contact) = &msg.contact {
        return Identity::from_hint(contact);
    }
    if let Some(fwd) = &msg.forwarded_from {
        return Identity::from_hint(fwd);
    }
    if msg.is_forwarded {
        return None;
    }

    let text = msg.text.trim();
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().ok().map(|id| Identity {
            telegram_id: Some(id),
            handle: None,
        });
    }
    let handle = normalize_handle(text).filter(|h| is_handle(h))?;
    Some(Identity {
        telegram_id: None,
        handle: Some(handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> TextMessage {
        TextMessage {
            text: s.to_string(),
            ..TextMessage::default()
        }
    }

    #[test]
    fn plain_text_is_id_or_handle() {
        assert_eq!(
            extract_identity(&text(" 123456 ")),
            Some(Identity {
                telegram_id: Some(123456),
                handle: None
            })
        );
        assert_eq!(
            extract_identity(&text("@New_Member")).map(|i| i.display()),
            Some("@new_member".to_string())
        );
        assert_eq!(extract_identity(&text("two words")), None);
        assert_eq!(extract_identity(&text("@")), None);
        assert_eq!(extract_identity(&text("")), None);
    }

    #[test]
    fn contact_wins_over_text() {
        let mut msg = text("ignored");
        msg.contact = Some(IdentityHint {
            user_id: Some(77),
            username: None,
        });
        assert_eq!(extract_identity(&msg).map(|i| i.telegram_id), Some(Some(77)));
    }

    #[test]
    fn forwards_use_the_original_author() {
        let mut msg = text("hello there");
        msg.is_forwarded = true;
        msg.forwarded_from = Some(IdentityHint {
            user_id: Some(5),
            username: Some("Carol".into()),
        });
        let id = extract_identity(&msg).unwrap();
        assert_eq!(id.handle.as_deref(), Some("carol"));
        assert_eq!(id.telegram_id, Some(5));
    }

    #[test]
    fn hidden_forwards_are_unidentifiable() {
        let mut msg = text("somebody");
        msg.is_forwarded = true;
        assert_eq!(extract_identity(&msg), None);
    }
}
