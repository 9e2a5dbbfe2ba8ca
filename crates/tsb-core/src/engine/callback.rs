use tracing::{debug, warn};

use crate::{
    action::{self, Action},
    domain::ChatId,
    messaging::types::{CallbackQuery, InlineKeyboard},
    permissions::Capability,
    texts,
    Result,
};

use super::{reply::Surface, Engine};

impl Engine {
    pub(crate) async fn on_callback(&self, q: &CallbackQuery) -> Result<()> {
        // Answer first so the client stops its spinner whatever happens next.
        if let Err(e) = self.messenger.answer_callback_query(&q.callback_id, None).await {
            debug!(error = %e, "callback answer failed");
        }

        let at = match q.message {
            Some(msg) => Surface::Edit(msg),
            None => Surface::Send(ChatId(q.sender.user_id.0)),
        };
        let data = q.data.trim();
        let actor = self.actor(&q.sender).await?;

        // Privilege check comes before any admin token is interpreted.
        if action::namespace(data) == "admin" && !actor.can(Capability::ManageUsers) {
            return self.show(at, texts::ACCESS_DENIED, InlineKeyboard::new()).await;
        }

        let parsed = match Action::decode(data) {
            Ok(a) => a,
            Err(e) => {
                warn!(user_id = actor.user_id.0, error = %e, "callback not understood");
                return self.show(at, texts::UNRECOGNIZED, InlineKeyboard::new()).await;
            }
        };
        debug!(user_id = actor.user_id.0, action = %parsed, "callback");

        match parsed {
            Action::Noop => Ok(()),
            Action::Cancel => {
                self.pending.clear(actor.user_id).await?;
                self.show(at, texts::CANCELLED, InlineKeyboard::new()).await
            }
            Action::Admin(a) => self.on_admin(&actor, at, a).await,
            Action::Report(r) => self.on_report(&actor, at, r).await,
            Action::Settings(s) => self.on_settings(&actor, at, s).await,
        }
    }
}
