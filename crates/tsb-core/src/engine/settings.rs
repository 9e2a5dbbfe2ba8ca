use tracing::debug;

use crate::{
    action::SettingsAction,
    directory::Actor,
    messaging::types::InlineKeyboard,
    texts,
    Result,
};

use super::{reply::Surface, views, Engine};

impl Engine {
    pub(crate) async fn on_settings(
        &self,
        actor: &Actor,
        at: Surface,
        s: SettingsAction,
    ) -> Result<()> {
        let user = actor.user_id;
        let mut settings = self.user_settings(user).await?;

        match s {
            SettingsAction::Main => {
                return self
                    .show(at, texts::SETTINGS_TITLE, views::settings_menu(&settings))
                    .await
            }
            SettingsAction::Back => {
                self.pending.clear(user).await?;
                return self.show(at, texts::CANCELLED, InlineKeyboard::new()).await;
            }
            SettingsAction::Notifications
            | SettingsAction::DateFormat
            | SettingsAction::PageSize
            | SettingsAction::AutoReport
            | SettingsAction::Language => {
                return match views::settings_choices(&s, &settings) {
                    Some((title, kb)) => self.show(at, title, kb).await,
                    None => self.show(at, texts::UNRECOGNIZED, InlineKeyboard::new()).await,
                };
            }
            SettingsAction::SetNotifications(b) => settings.notifications = b,
            SettingsAction::SetDateFormat(d) => settings.date_format = d,
            SettingsAction::SetPageSize(n) => settings.page_size = n,
            SettingsAction::SetAutoReport(b) => settings.auto_report = b,
            SettingsAction::SetLanguage(l) => settings.language = l,
        }

        self.store.save_user_settings(user.0, &settings).await?;
        debug!(user_id = user.0, "user settings saved");
        let body = format!("{}\n\n{}", texts::SETTINGS_SAVED, texts::SETTINGS_TITLE);
        self.show(at, &body, views::settings_menu(&settings)).await
    }
}
