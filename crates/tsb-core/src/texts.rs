//! User-facing strings and the main-menu layout.

use crate::messaging::types::ReplyKeyboard;

pub const BUTTON_HOME: &str = "🏠 Home";
pub const BUTTON_PROFILE: &str = "👤 My Profile";
pub const BUTTON_REPORTS: &str = "📊 Reports";
pub const BUTTON_GROUPS: &str = "💬 Groups";
pub const BUTTON_SETTINGS: &str = "⚙️ Settings";
pub const BUTTON_HELP: &str = "❓ Help";
pub const BUTTON_CANCEL: &str = "❌ Cancel";

/// Menu buttons as they arrive in a text message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuButton {
    Home,
    Profile,
    Reports,
    Groups,
    Settings,
    Help,
    Cancel,
}

impl MenuButton {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text.trim() {
            BUTTON_HOME => MenuButton::Home,
            BUTTON_PROFILE => MenuButton::Profile,
            BUTTON_REPORTS => MenuButton::Reports,
            BUTTON_GROUPS => MenuButton::Groups,
            BUTTON_SETTINGS => MenuButton::Settings,
            BUTTON_HELP => MenuButton::Help,
            BUTTON_CANCEL => MenuButton::Cancel,
            _ => return None,
        })
    }
}

pub fn main_menu() -> ReplyKeyboard {
    let row = |a: &str, b: &str| vec![a.to_string(), b.to_string()];
    ReplyKeyboard {
        rows: vec![
            row(BUTTON_HOME, BUTTON_PROFILE),
            row(BUTTON_REPORTS, BUTTON_GROUPS),
            row(BUTTON_SETTINGS, BUTTON_HELP),
            vec![BUTTON_CANCEL.to_string()],
        ],
    }
}

pub const DEFAULT_WELCOME: &str = "Hello {name} 👋";
pub const FALLBACK_NAME: &str = "Friend";

pub const ADMIN_MENU: &str = "🔐 <b>Admin menu</b>";
pub const CANCELLED: &str = "❌ Operation cancelled.";
pub const UNRECOGNIZED: &str = "⚠️ Unrecognized request.";
pub const ACCESS_DENIED: &str = "⛔ You don't have access to this section.";
pub const NOT_ALLOWED: &str = "⚠️ You are not in the allowed users list.";
pub const USE_MENU: &str = "Use the menu below or send /groups.";
pub const USER_NOT_FOUND: &str = "User not found.";
pub const GROUP_NOT_FOUND: &str = "⚠️ Group not found. Open the list again.";
pub const NO_GROUPS: &str = "No groups are registered for you.";
pub const NO_GROUPS_AT_ALL: &str = "No groups registered yet.";
pub const NO_USERS_FOUND: &str = "No users found.";
pub const NO_AUDIT: &str = "No activity recorded yet.";

pub const SEARCH_PROMPT: &str = "🔍 Send part of a username to search for.";
pub const PICK_PERIOD: &str = "📊 <b>Reports</b>\n\nChoose a report period:";
pub const PICK_NUMBER: &str = "Send the group number, or /cancel.";
pub const INVALID_NUMBER: &str = "⚠️ Invalid number. Send a number from the list.";
pub const NOT_A_NUMBER: &str = "⚠️ Please send just the group number.";
pub const SETTINGS_TITLE: &str = "⚙️ <b>Your settings</b>\n\nTap an option to change it.";
pub const SETTINGS_SAVED: &str = "✅ Saved.";
pub const BOT_SETTINGS_TITLE: &str = "⚙️ <b>Bot settings</b>\n\nTap an option to change it.";
pub const WELCOME_SAVED: &str = "✅ Welcome message updated.";
pub const ADD_USER_FAILED: &str = "❌ Could not add the user.";
pub const ROLE_CHANGE_FAILED: &str = "❌ Could not change the role.";
pub const DELETE_FAILED: &str = "❌ Could not delete the user.";
pub const GRANT_FAILED: &str = "❌ Could not update group access.";
pub const SETTINGS_SAVE_FAILED: &str = "❌ Could not save the settings.";
pub const GENERATING: &str = "⏳ Generating report, please wait...";
pub const IDENTIFY_PROMPT: &str = "Send the user's @username or numeric id, forward one of their messages, or share their contact.";
pub const IDENTIFY_FAILED: &str = "⚠️ Could not identify the user. Try again with a username, numeric id, forwarded message or contact.";

pub const BACK: &str = "🔙 Back";
pub const CANCEL: &str = "❌ Cancel";
pub const ADMIN_HOME: &str = "🏠 Admin menu";
pub const HOME: &str = "🏠 Home";
pub const ANOTHER_REPORT: &str = "📊 Another report";
pub const ADD_USER: &str = "➕ Add user";

pub const HELP: &str = "📚 <b>How to use this bot</b>\n\n\
1) «📊 Reports» - get a group report\n\
2) «👤 My Profile» - view your info\n\
3) «💬 Groups» - your groups\n\
4) «⚙️ Settings» - personal settings\n\
5) /cancel - cancel the current operation";

/// Fill the `{name}` placeholder of a welcome template.
pub fn welcome(template: Option<&str>, name: &str) -> String {
    let template = template
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_WELCOME);
    let name = if name.trim().is_empty() {
        FALLBACK_NAME
    } else {
        name
    };
    template.replace("{name}", name)
}

pub fn on_off(b: bool) -> &'static str {
    if b {
        "On"
    } else {
        "Off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_buttons_parse_from_their_labels() {
        for row in main_menu().rows {
            for label in row {
                assert!(MenuButton::parse(&label).is_some(), "{label}");
            }
        }
        assert_eq!(MenuButton::parse("hello"), None);
    }

    #[test]
    fn welcome_fills_name_and_falls_back() {
        assert_eq!(welcome(Some("Hi {name}!"), "Ann"), "Hi Ann!");
        assert_eq!(welcome(None, ""), "Hello Friend 👋");
        assert_eq!(welcome(Some("   "), "Bo"), "Hello Bo 👋");
    }
}
