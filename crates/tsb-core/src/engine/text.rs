use serde_json::json;
use tracing::{info, warn};

use crate::{
    action::{AdminAction, Action},
    directory::Actor,
    domain::{audit_action, ChatId, NewUser, UserRecord},
    formatting::escape_html,
    messaging::types::{InlineButton, InlineKeyboard, TextMessage},
    pending::PendingMode,
    permissions::{self, Capability, Role},
    texts::{self, MenuButton},
    Result,
};

use super::{
    identity::{extract_identity, Identity},
    views, Engine, SEARCH_LIMIT,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Start,
    Cancel,
    Help,
    Profile,
    Groups,
}

impl Command {
    /// `/name`, `/name@bot` and `/name args` all count.
    fn parse(text: &str) -> Option<Option<Self>> {
        let rest = text.strip_prefix('/')?;
        let word = rest.split_whitespace().next().unwrap_or_default();
        let name = word.split('@').next().unwrap_or_default().to_lowercase();
        Some(match name.as_str() {
            "start" => Some(Command::Start),
            "cancel" => Some(Command::Cancel),
            "help" => Some(Command::Help),
            "profile" => Some(Command::Profile),
            "groups" => Some(Command::Groups),
            _ => None,
        })
    }
}

impl Engine {
    pub(crate) async fn on_text(&self, msg: &TextMessage) -> Result<()> {
        let text = msg.text.trim();

        if let Some(cmd) = Command::parse(text) {
            return match cmd {
                Some(cmd) => self.on_command(msg, cmd).await,
                // Unknown commands are ignored.
                None => Ok(()),
            };
        }

        if let Some(button) = MenuButton::parse(text) {
            let cmd = match button {
                MenuButton::Home => Command::Start,
                MenuButton::Profile => Command::Profile,
                MenuButton::Groups => Command::Groups,
                MenuButton::Help => Command::Help,
                MenuButton::Cancel => Command::Cancel,
                MenuButton::Reports => return self.reports_entry(msg).await,
                MenuButton::Settings => return self.settings_entry(msg).await,
            };
            return self.on_command(msg, cmd).await;
        }

        let user = msg.sender.user_id;
        let chat = msg.chat.chat_id;
        match self.pending.get(user).await? {
            None | Some(PendingMode::Unrecognized(_)) => self.say(chat, texts::USE_MENU).await,
            Some(PendingMode::SearchQuery) => self.answer_search(msg).await,
            Some(PendingMode::WelcomeMessage) => self.answer_welcome(msg).await,
            Some(PendingMode::AddUser(role)) => self.answer_add_user(msg, role).await,
            Some(PendingMode::GroupNumber) => self.answer_group_number(msg).await,
        }
    }

    async fn on_command(&self, msg: &TextMessage, cmd: Command) -> Result<()> {
        let chat = msg.chat.chat_id;
        match cmd {
            Command::Start => self.start(msg).await,
            Command::Cancel => {
                self.pending.clear(msg.sender.user_id).await?;
                self.messenger
                    .send_reply_keyboard(chat, texts::CANCELLED, texts::main_menu())
                    .await?;
                Ok(())
            }
            Command::Help => self.say(chat, texts::HELP).await,
            Command::Profile => self.profile(msg).await,
            Command::Groups => self.groups_list(msg).await,
        }
    }

    async fn start(&self, msg: &TextMessage) -> Result<()> {
        let chat = msg.chat.chat_id;
        self.pending.clear(msg.sender.user_id).await?;

        let bot = self.store.bot_settings().await?;
        let greeting = texts::welcome(bot.welcome_message.as_deref(), &msg.sender.full_name());
        self.messenger
            .send_reply_keyboard(chat, &escape_html(&greeting), texts::main_menu())
            .await?;

        let actor = self.actor(&msg.sender).await?;
        if actor.can(Capability::ManageUsers) {
            self.messenger
                .send_inline_keyboard(chat, texts::ADMIN_MENU, views::admin_menu())
                .await?;
        }
        Ok(())
    }

    /// Fixed denial for senders without a usable registry entry.
    async fn refuse_unregistered(&self, chat: ChatId, actor: &Actor) -> Result<bool> {
        if actor.record.is_none() && actor.is_blocked() {
            self.say(chat, texts::NOT_ALLOWED).await?;
            return Ok(true);
        }
        if actor.is_blocked() {
            self.say(chat, texts::ACCESS_DENIED).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn profile(&self, msg: &TextMessage) -> Result<()> {
        let chat = msg.chat.chat_id;
        let actor = self.actor(&msg.sender).await?;

        let name = match msg.sender.full_name() {
            n if n.is_empty() => "-".to_string(),
            n => n,
        };
        let username = msg
            .sender
            .username
            .as_deref()
            .map(|u| format!("@{u}"))
            .unwrap_or_else(|| "-".to_string());
        let registered = actor.record.is_some() || !actor.is_blocked();
        let role = if registered {
            format!("{} {}", actor.role.icon(), actor.role.label())
        } else {
            "-".to_string()
        };

        let mut out = format!(
            "👤 <b>Your profile</b>\n\n📛 Name: {}\n🆔 ID: <code>{}</code>\n👤 Username: {}\n🎭 Role: {role}",
            escape_html(&name),
            msg.sender.user_id.0,
            escape_html(&username),
        );
        if !registered {
            out.push_str("\n\n");
            out.push_str(texts::NOT_ALLOWED);
            return self.say(chat, &out).await;
        }

        let groups = self.directory.accessible_groups(&actor).await?;
        out.push_str(&format!("\n📊 Groups: {}", groups.len()));
        if !groups.is_empty() {
            out.push_str("\n\n💬 Your groups:");
            for (i, g) in groups.iter().take(10).enumerate() {
                out.push_str(&format!("\n  {}. {}", i + 1, escape_html(g)));
            }
            if groups.len() > 10 {
                out.push_str(&format!("\n  … and {} more", groups.len() - 10));
            }
        }
        self.say(chat, &out).await
    }

    /// Numbered group list; the reply is a number.
    async fn groups_list(&self, msg: &TextMessage) -> Result<()> {
        let chat = msg.chat.chat_id;
        let actor = self.actor(&msg.sender).await?;
        if self.refuse_unregistered(chat, &actor).await? {
            return Ok(());
        }

        let groups = self.directory.accessible_groups(&actor).await?;
        if groups.is_empty() {
            return self.say(chat, texts::NO_GROUPS).await;
        }

        self.pending
            .set(msg.sender.user_id, &PendingMode::GroupNumber)
            .await?;
        let lines: Vec<String> = groups
            .iter()
            .enumerate()
            .map(|(i, g)| format!("{}. {}", i + 1, escape_html(g)))
            .collect();
        let body = format!(
            "💬 <b>Your groups</b>\n\n{}\n\n{}",
            lines.join("\n"),
            texts::PICK_NUMBER
        );
        self.messenger
            .send_inline_keyboard(chat, &body, views::cancel_only())
            .await?;
        Ok(())
    }

    async fn reports_entry(&self, msg: &TextMessage) -> Result<()> {
        let chat = msg.chat.chat_id;
        let actor = self.actor(&msg.sender).await?;
        if self.refuse_unregistered(chat, &actor).await? {
            return Ok(());
        }
        if !actor.can(Capability::RequestReports) {
            return self.say(chat, texts::ACCESS_DENIED).await;
        }
        self.messenger
            .send_inline_keyboard(
                chat,
                texts::PICK_PERIOD,
                views::period_picker(Action::Cancel, texts::CANCEL),
            )
            .await?;
        Ok(())
    }

    async fn settings_entry(&self, msg: &TextMessage) -> Result<()> {
        let settings = self.user_settings(msg.sender.user_id).await?;
        self.messenger
            .send_inline_keyboard(
                msg.chat.chat_id,
                texts::SETTINGS_TITLE,
                views::settings_menu(&settings),
            )
            .await?;
        Ok(())
    }

    /// Admin-only modes are re-checked: the sender may have lost the
    /// capability since the prompt was shown.
    async fn admin_for_mode(&self, msg: &TextMessage) -> Result<Option<Actor>> {
        let actor = self.actor(&msg.sender).await?;
        if actor.can(Capability::ManageUsers) {
            return Ok(Some(actor));
        }
        self.pending.clear(msg.sender.user_id).await?;
        self.say(msg.chat.chat_id, texts::ACCESS_DENIED).await?;
        Ok(None)
    }

    async fn answer_search(&self, msg: &TextMessage) -> Result<()> {
        let chat = msg.chat.chat_id;
        let Some(actor) = self.admin_for_mode(msg).await? else {
            return Ok(());
        };

        let results = self.store.search_users(msg.text.trim(), SEARCH_LIMIT).await?;
        self.pending.clear(actor.user_id).await?;

        if results.is_empty() {
            self.messenger
                .send_inline_keyboard(chat, texts::NO_USERS_FOUND, views::back_to(AdminAction::Back))
                .await?;
            return Ok(());
        }
        let mut kb = InlineKeyboard::new();
        for u in &results {
            kb.push_row(vec![views::user_button(u, self.settings.label_max_chars)]);
        }
        let kb = kb.row(vec![InlineButton::callback(
            texts::BACK,
            Action::from(AdminAction::Back).encode(),
        )]);
        let body = format!("🔍 <b>Results</b> ({})", results.len());
        self.messenger.send_inline_keyboard(chat, &body, kb).await?;
        Ok(())
    }

    async fn answer_welcome(&self, msg: &TextMessage) -> Result<()> {
        let chat = msg.chat.chat_id;
        let Some(actor) = self.admin_for_mode(msg).await? else {
            return Ok(());
        };
        let template = msg.text.trim();
        if template.is_empty() {
            return self.say(chat, "✏️ Send the new welcome message as text.").await;
        }

        let saved = async {
            let mut bot = self.store.bot_settings().await?;
            bot.welcome_message = Some(template.to_string());
            self.store.save_bot_settings(&bot).await
        }
        .await;
        self.pending.clear(actor.user_id).await?;
        if let Err(e) = saved {
            warn!(error = %e, "welcome message not saved");
            return self.say(chat, texts::SETTINGS_SAVE_FAILED).await;
        }

        self.record_audit(
            &actor,
            audit_action::UPDATE_BOT_SETTINGS,
            "welcome_message",
            json!({ "welcome_message": template }),
        );
        self.messenger
            .send_inline_keyboard(chat, texts::WELCOME_SAVED, views::back_to(AdminAction::Settings))
            .await?;
        Ok(())
    }

    async fn answer_add_user(&self, msg: &TextMessage, role: Role) -> Result<()> {
        let chat = msg.chat.chat_id;
        let Some(actor) = self.admin_for_mode(msg).await? else {
            return Ok(());
        };

        let Some(identity) = extract_identity(msg) else {
            // Mode kept: the operator tries again.
            self.messenger
                .send_inline_keyboard(chat, texts::IDENTIFY_FAILED, views::cancel_only())
                .await?;
            return Ok(());
        };

        if let Some(existing) = self.existing_user(&identity).await? {
            self.pending.clear(actor.user_id).await?;
            let current = permissions::effective_role(Some(&existing));
            let body = format!(
                "ℹ️ {} is already registered as {} {}.\nChange the role to {} {}?",
                escape_html(&existing.display_name()),
                current.icon(),
                current.label(),
                role.icon(),
                role.label(),
            );
            let kb = InlineKeyboard::new()
                .row(vec![
                    InlineButton::callback(
                        "✅ Yes, change",
                        Action::from(AdminAction::SetRole {
                            role,
                            id: existing.id,
                        })
                        .encode(),
                    ),
                    InlineButton::callback(
                        "❌ No",
                        Action::from(AdminAction::RoleList { role, page: 0 }).encode(),
                    ),
                ])
                .button(texts::ADMIN_HOME, Action::from(AdminAction::Back).encode());
            self.messenger.send_inline_keyboard(chat, &body, kb).await?;
            return Ok(());
        }

        let (is_active, is_admin) = role.stored_flags();
        let new_user = NewUser {
            handle: identity.handle.clone(),
            telegram_id: identity.telegram_id,
            role: role.as_str().to_string(),
            is_active,
            is_admin,
        };
        let inserted = self.store.insert_user(&new_user).await;
        self.pending.clear(actor.user_id).await?;
        if let Err(e) = inserted {
            warn!(error = %e, user = %identity.display(), "user insert failed");
            return self.say(chat, texts::ADD_USER_FAILED).await;
        }

        self.directory
            .after_user_mutation(identity.handle.as_deref(), identity.telegram_id)
            .await;
        self.record_audit(
            &actor,
            audit_action::ADD_USER,
            identity.display(),
            json!({ "role": role.as_str() }),
        );
        info!(user = %identity.display(), role = role.as_str(), "user added");

        let body = format!(
            "✅ {} added as {} {}.",
            escape_html(&identity.display()),
            role.icon(),
            role.label()
        );
        self.messenger
            .send_inline_keyboard(chat, &body, views::after_user_change(role))
            .await?;
        Ok(())
    }

    async fn existing_user(&self, identity: &Identity) -> Result<Option<UserRecord>> {
        if let Some(h) = &identity.handle {
            if let Some(found) = self.store.user_by_handle(h).await? {
                return Ok(Some(found));
            }
        }
        if let Some(id) = identity.telegram_id {
            return Ok(self.store.user_by_telegram_id(id).await?);
        }
        Ok(None)
    }

    async fn answer_group_number(&self, msg: &TextMessage) -> Result<()> {
        let chat = msg.chat.chat_id;
        let text = msg.text.trim();
        if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
            return self.say(chat, texts::NOT_A_NUMBER).await;
        }

        let actor = self.actor(&msg.sender).await?;
        if actor.is_blocked() || !actor.can(Capability::RequestReports) {
            self.pending.clear(actor.user_id).await?;
            return self.say(chat, texts::ACCESS_DENIED).await;
        }
        let groups = self.directory.accessible_groups(&actor).await?;
        if groups.is_empty() {
            self.pending.clear(actor.user_id).await?;
            return self.say(chat, texts::NO_GROUPS).await;
        }
        let picked = text
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| groups.get(i));
        let Some(title) = picked else {
            return self.say(chat, texts::INVALID_NUMBER).await;
        };

        self.pending.clear(actor.user_id).await?;
        let body = format!(
            "💬 <b>{}</b>\n\nChoose a report period:",
            escape_html(title)
        );
        self.messenger
            .send_inline_keyboard(chat, &body, views::periods_for_group(title))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_with_bot_suffix_and_args() {
        assert_eq!(Command::parse("/start"), Some(Some(Command::Start)));
        assert_eq!(Command::parse("/Groups@summary_bot"), Some(Some(Command::Groups)));
        assert_eq!(Command::parse("/cancel now"), Some(Some(Command::Cancel)));
        assert_eq!(Command::parse("/weather"), Some(None));
        assert_eq!(Command::parse("start"), None);
    }
}
