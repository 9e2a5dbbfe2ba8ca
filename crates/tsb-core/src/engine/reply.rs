use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::InlineKeyboard,
    Result,
};

use super::Engine;

/// Where a view goes: a fresh message, or the message whose button was
/// pressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Surface {
    Send(ChatId),
    Edit(MessageRef),
}

impl Surface {
    pub(crate) fn chat_id(self) -> ChatId {
        match self {
            Surface::Send(chat) => chat,
            Surface::Edit(msg) => msg.chat_id,
        }
    }
}

impl Engine {
    /// Render `html` with an optional keyboard on `at`.
    pub(crate) async fn show(
        &self,
        at: Surface,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        match at {
            Surface::Send(chat) if keyboard.rows.is_empty() => {
                self.messenger.send_html(chat, html).await?;
            }
            Surface::Send(chat) => {
                self.messenger
                    .send_inline_keyboard(chat, html, keyboard)
                    .await?;
            }
            Surface::Edit(msg) if keyboard.rows.is_empty() => {
                self.messenger.edit_html(msg, html).await?;
            }
            Surface::Edit(msg) => {
                self.messenger
                    .edit_inline_keyboard(msg, html, keyboard)
                    .await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn say(&self, chat: ChatId, html: &str) -> Result<()> {
        self.messenger.send_html(chat, html).await?;
        Ok(())
    }
}
