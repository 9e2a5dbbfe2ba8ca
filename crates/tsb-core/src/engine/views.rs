//! Keyboards and message bodies. Pure functions of their inputs.

use crate::{
    action::{Action, AdminAction, ReportAction, SettingsAction},
    domain::{
        audit_action, AuditRecord, BotSettings, DateFormat, GroupStats, Language, UserRecord,
        UserSettings, PAGE_SIZE_OPTIONS,
    },
    formatting::{escape_html, truncate_chars},
    messaging::types::{InlineButton, InlineKeyboard},
    permissions::{self, Role},
    report::ReportPeriod,
    texts,
};

fn button(label: impl Into<String>, action: impl Into<Action>) -> InlineButton {
    InlineButton::callback(label, action.into().encode())
}

fn one(label: impl Into<String>, action: impl Into<Action>) -> Vec<InlineButton> {
    vec![button(label, action)]
}

fn marked(label: &str, selected: bool) -> String {
    if selected {
        format!("✓ {label}")
    } else {
        label.to_string()
    }
}

pub(crate) fn admin_menu() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(one("👥 User management", AdminAction::Access))
        .row(one("🔍 Search user", AdminAction::Search))
        .row(one("💬 Groups", AdminAction::Groups { page: 0 }))
        .row(one("📊 Reports", AdminAction::Reports))
        .row(one("📝 Activity log", AdminAction::Audit))
        .row(one("⚙️ Bot settings", AdminAction::Settings))
}

pub(crate) fn cancel_only() -> InlineKeyboard {
    InlineKeyboard::new().row(one(texts::CANCEL, Action::Cancel))
}

pub(crate) fn back_to(action: impl Into<Action>) -> InlineKeyboard {
    InlineKeyboard::new().row(one(texts::BACK, action))
}

/// Weekly / monthly entry buttons of the report flow.
pub(crate) fn period_picker(back: Action, back_label: &str) -> InlineKeyboard {
    let mut kb = InlineKeyboard::new();
    for period in ReportPeriod::ALL {
        kb.push_row(one(
            period_label(period),
            ReportAction::Groups { period, page: 0 },
        ));
    }
    kb.row(one(back_label, back))
}

/// Period buttons for an already chosen group.
pub(crate) fn periods_for_group(title: &str) -> InlineKeyboard {
    let row = ReportPeriod::ALL
        .into_iter()
        .map(|period| {
            button(
                period_label(period),
                ReportAction::Generate {
                    period,
                    title: title.to_string(),
                },
            )
        })
        .collect();
    InlineKeyboard::new()
        .row(row)
        .row(one(texts::CANCEL, Action::Cancel))
}

pub(crate) fn period_label(period: ReportPeriod) -> &'static str {
    match period {
        ReportPeriod::Weekly => "📅 Weekly",
        ReportPeriod::Monthly => "📆 Monthly",
    }
}

pub(crate) fn role_counts(users: &[UserRecord]) -> Vec<(Role, usize)> {
    Role::ALL
        .into_iter()
        .map(|role| {
            let n = users
                .iter()
                .filter(|u| permissions::effective_role(Some(u)) == role)
                .count();
            (role, n)
        })
        .collect()
}

pub(crate) fn access_menu(counts: &[(Role, usize)]) -> InlineKeyboard {
    let mut kb = InlineKeyboard::new();
    for (role, n) in counts {
        kb.push_row(one(
            format!("{} {} ({n})", role.icon(), role.label()),
            AdminAction::RoleList {
                role: *role,
                page: 0,
            },
        ));
    }
    kb.row(one(texts::BACK, AdminAction::Back))
}

pub(crate) fn user_button(user: &UserRecord, max_chars: usize) -> InlineButton {
    let role = permissions::effective_role(Some(user));
    let label = format!("{} {}", role.icon(), user.display_name());
    button(truncate_chars(&label, max_chars), AdminAction::User(user.id))
}

pub(crate) fn user_detail(user: &UserRecord) -> String {
    let role = permissions::effective_role(Some(user));
    let telegram_id = user
        .telegram_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let created = user
        .created_at
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    let status = if user.is_active { "✅ Active" } else { "⛔ Inactive" };
    format!(
        "👤 <b>{}</b>\n\n🆔 Telegram id: <code>{telegram_id}</code>\n🎭 Role: {} {}\n📅 Added: {created}\n📌 Status: {status}",
        escape_html(&user.display_name()),
        role.icon(),
        role.label(),
    )
}

pub(crate) fn user_actions(user: &UserRecord) -> InlineKeyboard {
    let role = permissions::effective_role(Some(user));
    InlineKeyboard::new()
        .row(one("🔄 Change role", AdminAction::ChangeRole(user.id)))
        .row(one(
            "💬 Manage groups",
            AdminAction::UserGroups {
                id: user.id,
                page: 0,
            },
        ))
        .row(one("🗑 Delete", AdminAction::ConfirmDelete(user.id)))
        .row(one(texts::BACK, AdminAction::RoleList { role, page: 0 }))
}

pub(crate) fn role_picker(user: &UserRecord) -> InlineKeyboard {
    let current = permissions::effective_role(Some(user));
    let mut kb = InlineKeyboard::new();
    for role in Role::ALL {
        kb.push_row(one(
            marked(&format!("{} {}", role.icon(), role.label()), role == current),
            AdminAction::SetRole { role, id: user.id },
        ));
    }
    kb.row(one(texts::BACK, AdminAction::User(user.id)))
}

/// Buttons shown after a user mutation: the affected list and admin home.
pub(crate) fn after_user_change(role: Role) -> InlineKeyboard {
    InlineKeyboard::new()
        .row(one("🔙 Back to list", AdminAction::RoleList { role, page: 0 }))
        .row(one(texts::ADMIN_HOME, AdminAction::Back))
}

pub(crate) fn group_stats(title: &str, stats: &GroupStats) -> String {
    format!(
        "📊 <b>{}</b>\n\n📨 Total messages: {}\n📅 Last 7 days: {}\n📆 Last 30 days: {}",
        escape_html(title),
        stats.total,
        stats.weekly,
        stats.monthly
    )
}

pub(crate) fn audit_icon(action: &str) -> &'static str {
    match action {
        audit_action::ADD_USER => "➕",
        audit_action::DELETE_USER => "🗑",
        audit_action::CHANGE_ROLE => "🔄",
        audit_action::ADD_USER_GROUP => "✅",
        audit_action::REMOVE_USER_GROUP => "❌",
        _ => "📝",
    }
}

pub(crate) fn audit_listing(records: &[AuditRecord]) -> String {
    let mut out = String::from("📝 <b>Recent activity</b>\n");
    for r in records {
        out.push_str(&format!(
            "\n{} <b>{}</b> {} → {}\n    {}",
            audit_icon(&r.action),
            escape_html(&r.action),
            escape_html(&r.actor),
            escape_html(&r.target),
            r.created_at.format("%Y-%m-%d %H:%M"),
        ));
    }
    out
}

pub(crate) fn bot_settings_menu(bot: &BotSettings, fallback: Language) -> InlineKeyboard {
    let current = bot.default_language.unwrap_or(fallback);
    let langs = [Language::Fa, Language::En]
        .into_iter()
        .map(|l| button(marked(l.label(), l == current), AdminAction::SettingsLanguage(l)))
        .collect();
    InlineKeyboard::new()
        .row(one("✏️ Welcome message", AdminAction::SettingsWelcome))
        .row(langs)
        .row(one(texts::BACK, AdminAction::Back))
}

pub(crate) fn settings_menu(s: &UserSettings) -> InlineKeyboard {
    InlineKeyboard::new()
        .row(one(
            format!("🔔 Notifications: {}", texts::on_off(s.notifications)),
            SettingsAction::Notifications,
        ))
        .row(one(
            format!("📅 Date format: {}", s.date_format.label()),
            SettingsAction::DateFormat,
        ))
        .row(one(
            format!("📄 Page size: {}", s.page_size),
            SettingsAction::PageSize,
        ))
        .row(one(
            format!("🤖 Auto report: {}", texts::on_off(s.auto_report)),
            SettingsAction::AutoReport,
        ))
        .row(one(
            format!("🌐 Language: {}", s.language.label()),
            SettingsAction::Language,
        ))
        .row(one("🔙 Close", SettingsAction::Back))
}

/// Choices for one settings submenu, current value marked.
pub(crate) fn settings_choices(which: &SettingsAction, s: &UserSettings) -> Option<(&'static str, InlineKeyboard)> {
    let row: Vec<InlineButton> = match which {
        SettingsAction::Notifications => [true, false]
            .into_iter()
            .map(|b| {
                button(
                    marked(texts::on_off(b), b == s.notifications),
                    SettingsAction::SetNotifications(b),
                )
            })
            .collect(),
        SettingsAction::AutoReport => [true, false]
            .into_iter()
            .map(|b| {
                button(
                    marked(texts::on_off(b), b == s.auto_report),
                    SettingsAction::SetAutoReport(b),
                )
            })
            .collect(),
        SettingsAction::DateFormat => [DateFormat::Shamsi, DateFormat::Miladi]
            .into_iter()
            .map(|d| {
                button(
                    marked(d.label(), d == s.date_format),
                    SettingsAction::SetDateFormat(d),
                )
            })
            .collect(),
        SettingsAction::PageSize => PAGE_SIZE_OPTIONS
            .into_iter()
            .map(|n| {
                button(
                    marked(&n.to_string(), n == s.page_size),
                    SettingsAction::SetPageSize(n),
                )
            })
            .collect(),
        SettingsAction::Language => [Language::Fa, Language::En]
            .into_iter()
            .map(|l| {
                button(
                    marked(l.label(), l == s.language),
                    SettingsAction::SetLanguage(l),
                )
            })
            .collect(),
        _ => return None,
    };
    let title = match which {
        SettingsAction::Notifications => "🔔 <b>Notifications</b>",
        SettingsAction::AutoReport => "🤖 <b>Auto report</b>",
        SettingsAction::DateFormat => "📅 <b>Date format</b>",
        SettingsAction::PageSize => "📄 <b>Items per page</b>",
        _ => "🌐 <b>Language</b>",
    };
    let kb = InlineKeyboard::new()
        .row(row)
        .row(one(texts::BACK, SettingsAction::Main));
    Some((title, kb))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn user(role: &str, active: bool) -> UserRecord {
        UserRecord {
            id: 7,
            handle: Some("dana".into()),
            telegram_id: Some(70),
            role: role.into(),
            is_active: active,
            is_admin: false,
            allow_all_groups: false,
            extra_permissions: None,
            created_at: Some(Utc::now()),
        }
    }

    #[test]
    fn counts_use_effective_roles() {
        let users = vec![user("admin", true), user("user", true), user("user", false)];
        let counts = role_counts(&users);
        assert_eq!(
            counts,
            vec![
                (Role::Owner, 0),
                (Role::Admin, 1),
                (Role::User, 1),
                (Role::Blocked, 1)
            ]
        );
        let kb = access_menu(&counts);
        assert_eq!(kb.callback_data()[3], "admin|role|blocked|0");
        assert_eq!(kb.rows[1][0].label, "🛡 Admin (1)");
    }

    #[test]
    fn user_actions_link_back_to_their_role_list() {
        let kb = user_actions(&user("user", true));
        assert_eq!(
            kb.callback_data(),
            vec![
                "admin|changerole|7",
                "admin|usergroups|7|0",
                "admin|confirmdelete|7",
                "admin|role|user|0"
            ]
        );
    }

    #[test]
    fn role_picker_marks_current_role() {
        let kb = role_picker(&user("admin", true));
        assert_eq!(kb.rows[1][0].label, "✓ 🛡 Admin");
        assert_eq!(kb.rows[2][0].label, "👤 User");
        assert_eq!(kb.rows[4][0].data, "admin|user|7");
    }

    #[test]
    fn settings_submenus_only_for_choices() {
        let s = UserSettings::default();
        let (_, kb) = settings_choices(&SettingsAction::PageSize, &s).unwrap();
        assert_eq!(
            kb.callback_data(),
            vec!["setpage|5", "setpage|10", "setpage|15", "setpage|20", "settings|main"]
        );
        assert_eq!(kb.rows[0][0].label, "✓ 5");
        assert!(settings_choices(&SettingsAction::Main, &s).is_none());
    }

    #[test]
    fn audit_listing_escapes_and_marks_actions() {
        let rec = AuditRecord::new(
            audit_action::ADD_USER_GROUP,
            "root",
            "bob -> <Ops>",
            serde_json::json!({}),
        );
        let out = audit_listing(&[rec]);
        assert!(out.contains("✅ <b>ADD_USER_GROUP</b> root → bob -&gt; &lt;Ops&gt;"));
    }
}
