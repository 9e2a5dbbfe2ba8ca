//! `admin|…` actions. The caller has already checked `manage_users`.

use std::collections::BTreeSet;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    action::{resolve_title, Action, AdminAction},
    directory::Actor,
    domain::{audit_action, RolePatch, UserRecord},
    formatting::{escape_html, truncate_chars},
    messaging::types::{InlineButton, InlineKeyboard},
    pagination::paginate,
    pending::PendingMode,
    permissions::{self, Capability, Role},
    texts,
    Result,
};

use super::{reply::Surface, views, Engine, AUDIT_LISTING_LIMIT};

/// Capability an admin action needs beyond `manage_users`.
fn required_capability(a: &AdminAction) -> Option<Capability> {
    match a {
        AdminAction::UserGroups { .. }
        | AdminAction::AddGroup { .. }
        | AdminAction::RemoveGroup { .. }
        | AdminAction::Groups { .. }
        | AdminAction::GroupStats { .. } => Some(Capability::ManageGroups),
        AdminAction::ChangeRole(_) | AdminAction::SetRole { .. } => {
            Some(Capability::EditPermissions)
        }
        AdminAction::Audit => Some(Capability::ViewAuditLogs),
        AdminAction::Reports => Some(Capability::RequestReports),
        _ => None,
    }
}

impl Engine {
    pub(crate) async fn on_admin(&self, actor: &Actor, at: Surface, a: AdminAction) -> Result<()> {
        if let Some(cap) = required_capability(&a) {
            if !actor.can(cap) {
                return self.show(at, texts::ACCESS_DENIED, InlineKeyboard::new()).await;
            }
        }

        match a {
            AdminAction::Back => {
                self.pending.clear(actor.user_id).await?;
                self.show(at, texts::ADMIN_MENU, views::admin_menu()).await
            }
            AdminAction::Access => {
                let users = self.store.list_users().await?;
                let counts = views::role_counts(&users);
                let body = format!("👥 <b>User management</b>\n\nUsers: {}", users.len());
                self.show(at, &body, views::access_menu(&counts)).await
            }
            AdminAction::Search => {
                self.pending
                    .set(actor.user_id, &PendingMode::SearchQuery)
                    .await?;
                self.show(at, texts::SEARCH_PROMPT, views::cancel_only()).await
            }
            AdminAction::RoleList { role, page } => self.role_list(at, role, page).await,
            AdminAction::AddUser(role) => {
                self.pending
                    .set(actor.user_id, &PendingMode::AddUser(role))
                    .await?;
                let body = format!(
                    "➕ <b>Add {} {}</b>\n\n{}",
                    role.icon(),
                    role.label(),
                    texts::IDENTIFY_PROMPT
                );
                self.show(at, &body, views::cancel_only()).await
            }
            AdminAction::User(id) => {
                let Some(user) = self.directory.user_by_row_id(id).await? else {
                    return self.user_missing(at).await;
                };
                self.show(at, &views::user_detail(&user), views::user_actions(&user))
                    .await
            }
            AdminAction::UserGroups { id, page } => self.user_groups(at, id, page).await,
            AdminAction::AddGroup { id, title, page } => {
                self.toggle_grant(actor, at, id, &title, page, true).await
            }
            AdminAction::RemoveGroup { id, title, page } => {
                self.toggle_grant(actor, at, id, &title, page, false).await
            }
            AdminAction::ChangeRole(id) => {
                let Some(user) = self.directory.user_by_row_id(id).await? else {
                    return self.user_missing(at).await;
                };
                let role = permissions::effective_role(Some(&user));
                let body = format!(
                    "🔄 <b>Change role</b>\n\n{}\nCurrent role: {} {}",
                    escape_html(&user.display_name()),
                    role.icon(),
                    role.label()
                );
                self.show(at, &body, views::role_picker(&user)).await
            }
            AdminAction::SetRole { role, id } => self.set_role(actor, at, role, id).await,
            AdminAction::ConfirmDelete(id) => {
                let Some(user) = self.directory.user_by_row_id(id).await? else {
                    return self.user_missing(at).await;
                };
                let body = format!(
                    "🗑 <b>Delete this user?</b>\n\n{}",
                    views::user_detail(&user)
                );
                let kb = InlineKeyboard::new().row(vec![
                    InlineButton::callback(
                        "✅ Yes, delete",
                        Action::from(AdminAction::DeleteUser(id)).encode(),
                    ),
                    InlineButton::callback("❌ No", Action::from(AdminAction::User(id)).encode()),
                ]);
                self.show(at, &body, kb).await
            }
            AdminAction::DeleteUser(id) => self.delete_user(actor, at, id).await,
            AdminAction::Groups { page } => self.group_list(at, page).await,
            AdminAction::GroupStats { title } => {
                let groups = self.directory.all_groups().await?;
                let Some(title) = resolve_title(&title, &groups) else {
                    return self
                        .show(at, texts::GROUP_NOT_FOUND, views::back_to(AdminAction::Groups { page: 0 }))
                        .await;
                };
                let stats = self.store.group_stats(&title, Utc::now()).await?;
                self.show(
                    at,
                    &views::group_stats(&title, &stats),
                    views::back_to(AdminAction::Groups { page: 0 }),
                )
                .await
            }
            AdminAction::Reports => {
                self.show(
                    at,
                    texts::PICK_PERIOD,
                    views::period_picker(AdminAction::Back.into(), texts::BACK),
                )
                .await
            }
            AdminAction::Audit => {
                let records = self.store.recent_audit(AUDIT_LISTING_LIMIT).await?;
                let body = if records.is_empty() {
                    texts::NO_AUDIT.to_string()
                } else {
                    views::audit_listing(&records)
                };
                self.show(at, &body, views::back_to(AdminAction::Back)).await
            }
            AdminAction::Settings => self.bot_settings_view(at, None).await,
            AdminAction::SettingsWelcome => {
                let bot = self.store.bot_settings().await?;
                let current = bot
                    .welcome_message
                    .unwrap_or_else(|| texts::DEFAULT_WELCOME.to_string());
                self.pending
                    .set(actor.user_id, &PendingMode::WelcomeMessage)
                    .await?;
                let body = format!(
                    "✏️ <b>Current welcome message</b>\n\n{}\n\nSend the new message. Use <code>{{name}}</code> for the user's name.",
                    escape_html(&current)
                );
                self.show(at, &body, views::cancel_only()).await
            }
            AdminAction::SettingsLanguage(lang) => {
                let mut bot = self.store.bot_settings().await?;
                bot.default_language = Some(lang);
                self.store.save_bot_settings(&bot).await?;
                self.record_audit(
                    actor,
                    audit_action::UPDATE_BOT_SETTINGS,
                    "default_language",
                    json!({ "default_language": lang.as_str() }),
                );
                self.bot_settings_view(at, Some(texts::SETTINGS_SAVED)).await
            }
        }
    }

    async fn user_missing(&self, at: Surface) -> Result<()> {
        self.show(at, texts::USER_NOT_FOUND, views::back_to(AdminAction::Access))
            .await
    }

    async fn bot_settings_view(&self, at: Surface, notice: Option<&str>) -> Result<()> {
        let bot = self.store.bot_settings().await?;
        let body = match notice {
            Some(n) => format!("{n}\n\n{}", texts::BOT_SETTINGS_TITLE),
            None => texts::BOT_SETTINGS_TITLE.to_string(),
        };
        let kb = views::bot_settings_menu(&bot, self.settings.default_language);
        self.show(at, &body, kb).await
    }

    async fn role_list(&self, at: Surface, role: Role, page: usize) -> Result<()> {
        let users: Vec<UserRecord> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| permissions::effective_role(Some(u)) == role)
            .collect();

        let add_row = vec![InlineButton::callback(
            texts::ADD_USER,
            Action::from(AdminAction::AddUser(role)).encode(),
        )];
        let back_row = vec![InlineButton::callback(
            texts::BACK,
            Action::from(AdminAction::Access).encode(),
        )];

        if users.is_empty() {
            let body = format!("{} No users with role {}.", role.icon(), role.label());
            let kb = InlineKeyboard::new().row(add_row).row(back_row);
            return self.show(at, &body, kb).await;
        }

        let p = paginate(&users, page, self.settings.page_size);
        let mut kb = InlineKeyboard::new();
        for u in p.items {
            kb.push_row(vec![views::user_button(u, self.settings.label_max_chars)]);
        }
        if let Some(nav) = p.nav_row(|page| AdminAction::RoleList { role, page }.into()) {
            kb.push_row(nav);
        }
        let kb = kb.row(add_row).row(back_row);
        let body = format!(
            "{} <b>{}</b> ({})",
            role.icon(),
            role.label(),
            p.total_items
        );
        self.show(at, &body, kb).await
    }

    async fn user_groups(&self, at: Surface, id: i64, page: usize) -> Result<()> {
        let Some(user) = self.directory.user_by_row_id(id).await? else {
            return self.user_missing(at).await;
        };
        let Some(handle) = user.handle.clone() else {
            return self
                .show(
                    at,
                    "⚠️ Group access is granted by username; this user has none.",
                    views::back_to(AdminAction::User(id)),
                )
                .await;
        };

        let all = self.directory.all_groups().await?;
        if all.is_empty() {
            return self
                .show(at, texts::NO_GROUPS_AT_ALL, views::back_to(AdminAction::User(id)))
                .await;
        }
        let granted: BTreeSet<String> = self
            .directory
            .granted_groups(&handle)
            .await?
            .into_iter()
            .collect();

        let p = paginate(&all, page, self.settings.page_size);
        let label_max = self.settings.label_max_chars.saturating_sub(2);
        let mut kb = InlineKeyboard::new();
        for title in p.items {
            let (mark, action) = if granted.contains(title) {
                (
                    "✅",
                    AdminAction::RemoveGroup {
                        id,
                        title: title.clone(),
                        page: p.index,
                    },
                )
            } else {
                (
                    "❌",
                    AdminAction::AddGroup {
                        id,
                        title: title.clone(),
                        page: p.index,
                    },
                )
            };
            kb.push_row(vec![InlineButton::callback(
                format!("{mark} {}", truncate_chars(title, label_max)),
                Action::from(action).encode(),
            )]);
        }
        if let Some(nav) = p.nav_row(|page| AdminAction::UserGroups { id, page }.into()) {
            kb.push_row(nav);
        }
        let kb = kb.row(vec![InlineButton::callback(
            texts::BACK,
            Action::from(AdminAction::User(id)).encode(),
        )]);

        let body = format!(
            "💬 <b>Groups of {}</b>\n\n✅ has access, ❌ no access. Tap to toggle.\nGranted: {} of {}",
            escape_html(&user.display_name()),
            granted.iter().filter(|g| all.contains(*g)).count(),
            all.len()
        );
        self.show(at, &body, kb).await
    }

    async fn toggle_grant(
        &self,
        actor: &Actor,
        at: Surface,
        id: i64,
        token: &str,
        page: usize,
        grant: bool,
    ) -> Result<()> {
        let Some(user) = self.directory.user_by_row_id(id).await? else {
            return self.user_missing(at).await;
        };
        let Some(handle) = user.handle.clone() else {
            return self.user_groups(at, id, page).await;
        };
        let all = self.directory.all_groups().await?;
        let Some(title) = resolve_title(token, &all) else {
            return self
                .show(
                    at,
                    texts::GROUP_NOT_FOUND,
                    views::back_to(AdminAction::UserGroups { id, page }),
                )
                .await;
        };

        let written = if grant {
            self.store.add_grant(&handle, &title).await
        } else {
            self.store.remove_grant(&handle, &title).await
        };
        if let Err(e) = written {
            warn!(error = %e, handle = %handle, title = %title, "grant update failed");
            return self
                .show(at, texts::GRANT_FAILED, views::back_to(AdminAction::UserGroups { id, page }))
                .await;
        }

        self.directory.after_grant_mutation(&handle).await;
        let action = if grant {
            audit_action::ADD_USER_GROUP
        } else {
            audit_action::REMOVE_USER_GROUP
        };
        self.record_audit(actor, action, format!("{handle} -> {title}"), json!({}));

        self.user_groups(at, id, page).await
    }

    async fn set_role(&self, actor: &Actor, at: Surface, role: Role, id: i64) -> Result<()> {
        let Some(user) = self.directory.user_by_row_id(id).await? else {
            return self.user_missing(at).await;
        };
        let old = permissions::effective_role(Some(&user));
        let (is_active, is_admin) = role.stored_flags();
        let patch = RolePatch {
            role: role.as_str().to_string(),
            is_active,
            is_admin,
        };
        if let Err(e) = self.store.update_user_role(id, &patch).await {
            warn!(error = %e, user = id, "role update failed");
            return self
                .show(at, texts::ROLE_CHANGE_FAILED, views::back_to(AdminAction::User(id)))
                .await;
        }

        self.directory
            .after_user_mutation(user.handle.as_deref(), user.telegram_id)
            .await;
        self.record_audit(
            actor,
            audit_action::CHANGE_ROLE,
            user.display_name(),
            json!({ "old_role": old.as_str(), "new_role": role.as_str() }),
        );
        info!(user = id, from = old.as_str(), to = role.as_str(), "role changed");

        let body = format!(
            "✅ Role of {} changed to {} {}.",
            escape_html(&user.display_name()),
            role.icon(),
            role.label()
        );
        self.show(at, &body, views::after_user_change(role)).await
    }

    async fn delete_user(&self, actor: &Actor, at: Surface, id: i64) -> Result<()> {
        let Some(user) = self.directory.user_by_row_id(id).await? else {
            return self.user_missing(at).await;
        };
        let role = permissions::effective_role(Some(&user));
        if let Err(e) = self.store.delete_user(id).await {
            warn!(error = %e, user = id, "user delete failed");
            return self
                .show(at, texts::DELETE_FAILED, views::back_to(AdminAction::User(id)))
                .await;
        }

        self.directory
            .after_user_mutation(user.handle.as_deref(), user.telegram_id)
            .await;
        self.record_audit(
            actor,
            audit_action::DELETE_USER,
            user.display_name(),
            json!({ "role": role.as_str() }),
        );
        info!(user = id, "user deleted");

        let body = format!("✅ {} deleted.", escape_html(&user.display_name()));
        self.show(at, &body, views::after_user_change(role)).await
    }

    async fn group_list(&self, at: Surface, page: usize) -> Result<()> {
        let groups = self.directory.all_groups().await?;
        if groups.is_empty() {
            return self
                .show(at, texts::NO_GROUPS_AT_ALL, views::back_to(AdminAction::Back))
                .await;
        }
        let p = paginate(&groups, page, self.settings.page_size);
        let mut kb = InlineKeyboard::new();
        for title in p.items {
            kb.push_row(vec![InlineButton::callback(
                format!("💬 {}", truncate_chars(title, self.settings.label_max_chars)),
                Action::from(AdminAction::GroupStats {
                    title: title.clone(),
                })
                .encode(),
            )]);
        }
        if let Some(nav) = p.nav_row(|page| AdminAction::Groups { page }.into()) {
            kb.push_row(nav);
        }
        let kb = kb.row(vec![InlineButton::callback(
            texts::BACK,
            Action::from(AdminAction::Back).encode(),
        )]);
        let body = format!(
            "📚 <b>Groups</b> ({})\nTap a group for its statistics.",
            p.total_items
        );
        self.show(at, &body, kb).await
    }
}
