//! Button action strings.
//!
//! Wire format: `namespace|verb|arg…`. Decoding happens once, into a closed
//! set of variants; encoding guarantees the Telegram callback-data limit.

use std::fmt;

use crate::{
    domain::{DateFormat, Language, PAGE_SIZE_OPTIONS},
    permissions::Role,
    report::ReportPeriod,
};

pub const DELIM: char = '|';
/// Telegram rejects callback data longer than this many bytes.
pub const CALLBACK_DATA_MAX_BYTES: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Hosts the "page n / m" label.
    Noop,
    Cancel,
    Admin(AdminAction),
    Report(ReportAction),
    Settings(SettingsAction),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminAction {
    Back,
    Access,
    Search,
    RoleList { role: Role, page: usize },
    AddUser(Role),
    User(i64),
    UserGroups { id: i64, page: usize },
    /// `title` is the (possibly truncated) token from the button.
    AddGroup { id: i64, title: String, page: usize },
    RemoveGroup { id: i64, title: String, page: usize },
    ChangeRole(i64),
    SetRole { role: Role, id: i64 },
    ConfirmDelete(i64),
    DeleteUser(i64),
    Groups { page: usize },
    GroupStats { title: String },
    Reports,
    Audit,
    Settings,
    SettingsWelcome,
    SettingsLanguage(Language),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportAction {
    /// Group picker for a period.
    Groups { period: ReportPeriod, page: usize },
    Generate { period: ReportPeriod, title: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingsAction {
    Main,
    Back,
    Notifications,
    DateFormat,
    PageSize,
    AutoReport,
    Language,
    SetNotifications(bool),
    SetDateFormat(DateFormat),
    SetPageSize(u8),
    SetAutoReport(bool),
    SetLanguage(Language),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized action: {0:?}")]
pub struct UnknownAction(pub String);

/// First token of an action string.
pub fn namespace(data: &str) -> &str {
    data.split(DELIM).next().unwrap_or_default()
}

/// Remove the delimiter from a free-form argument.
pub fn sanitize_arg(raw: &str) -> String {
    raw.chars().filter(|c| *c != DELIM).collect::<String>().trim().to_string()
}

/// Longest char-boundary prefix of `s` within `max_bytes`.
fn clip_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Pick the group a title token refers to.
///
/// An exact (sanitized) match wins. Otherwise the token must be a truncated
/// prefix of exactly one candidate.
pub fn resolve_title(token: &str, candidates: &[String]) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    if let Some(exact) = candidates.iter().find(|c| sanitize_arg(c) == token) {
        return Some(exact.clone());
    }
    let mut prefixed = candidates
        .iter()
        .filter(|c| sanitize_arg(c).starts_with(token));
    match (prefixed.next(), prefixed.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

fn with_title(head: &str, title: &str, tail: &str) -> String {
    let fixed = head.len() + 1 + if tail.is_empty() { 0 } else { tail.len() + 1 };
    let budget = CALLBACK_DATA_MAX_BYTES.saturating_sub(fixed);
    let clean = sanitize_arg(title);
    let token = clip_bytes(&clean, budget);
    if tail.is_empty() {
        format!("{head}{DELIM}{token}")
    } else {
        format!("{head}{DELIM}{token}{DELIM}{tail}")
    }
}

fn on_off(b: bool) -> &'static str {
    if b {
        "on"
    } else {
        "off"
    }
}

impl Action {
    pub fn encode(&self) -> String {
        match self {
            Action::Noop => "noop".to_string(),
            Action::Cancel => "cancel".to_string(),
            Action::Admin(a) => a.encode(),
            Action::Report(r) => r.encode(),
            Action::Settings(s) => s.encode(),
        }
    }

    pub fn decode(data: &str) -> Result<Self, UnknownAction> {
        let unknown = || UnknownAction(data.to_string());
        let parts: Vec<&str> = data.split(DELIM).collect();
        match parts.as_slice() {
            ["noop"] => Ok(Action::Noop),
            ["cancel"] => Ok(Action::Cancel),
            ["admin", rest @ ..] => AdminAction::decode(rest).map(Action::Admin).ok_or_else(unknown),
            ["rpt", period] => Ok(Action::Report(ReportAction::Groups {
                period: ReportPeriod::parse(period).ok_or_else(unknown)?,
                page: 0,
            })),
            ["rpt", period, page] => Ok(Action::Report(ReportAction::Groups {
                period: ReportPeriod::parse(period).ok_or_else(unknown)?,
                page: parse_page(page).ok_or_else(unknown)?,
            })),
            ["genrpt" | "report", period, title] => Ok(Action::Report(ReportAction::Generate {
                period: ReportPeriod::parse(period).ok_or_else(unknown)?,
                title: title.to_string(),
            })),
            ["settings", verb] => SettingsAction::decode_menu(verb)
                .map(Action::Settings)
                .ok_or_else(unknown),
            [verb, value] => SettingsAction::decode_set(verb, value)
                .map(Action::Settings)
                .ok_or_else(unknown),
            _ => Err(unknown()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<AdminAction> for Action {
    fn from(a: AdminAction) -> Self {
        Action::Admin(a)
    }
}

impl From<ReportAction> for Action {
    fn from(r: ReportAction) -> Self {
        Action::Report(r)
    }
}

impl From<SettingsAction> for Action {
    fn from(s: SettingsAction) -> Self {
        Action::Settings(s)
    }
}

/// Page indexes are clamped later; negative numbers mean the first page.
fn parse_page(raw: &str) -> Option<usize> {
    let n: i64 = raw.trim().parse().ok()?;
    Some(usize::try_from(n.max(0)).unwrap_or(usize::MAX))
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

impl AdminAction {
    pub fn encode(&self) -> String {
        match self {
            AdminAction::Back => "admin|back".to_string(),
            AdminAction::Access => "admin|access".to_string(),
            AdminAction::Search => "admin|search".to_string(),
            AdminAction::RoleList { role, page } => format!("admin|role|{}|{page}", role.as_str()),
            AdminAction::AddUser(role) => format!("admin|adduser|{}", role.as_str()),
            AdminAction::User(id) => format!("admin|user|{id}"),
            AdminAction::UserGroups { id, page } => format!("admin|usergroups|{id}|{page}"),
            AdminAction::AddGroup { id, title, page } => {
                with_title(&format!("admin|addgroup|{id}"), title, &page.to_string())
            }
            AdminAction::RemoveGroup { id, title, page } => {
                with_title(&format!("admin|removegroup|{id}"), title, &page.to_string())
            }
            AdminAction::ChangeRole(id) => format!("admin|changerole|{id}"),
            AdminAction::SetRole { role, id } => format!("admin|setrole|{}|{id}", role.as_str()),
            AdminAction::ConfirmDelete(id) => format!("admin|confirmdelete|{id}"),
            AdminAction::DeleteUser(id) => format!("admin|deleteuser|{id}"),
            AdminAction::Groups { page } => format!("admin|groups|{page}"),
            AdminAction::GroupStats { title } => with_title("admin|groupstats", title, ""),
            AdminAction::Reports => "admin|reports".to_string(),
            AdminAction::Audit => "admin|audit".to_string(),
            AdminAction::Settings => "admin|settings".to_string(),
            AdminAction::SettingsWelcome => "admin|settings|welcome".to_string(),
            AdminAction::SettingsLanguage(lang) => {
                format!("admin|settings|lang|{}", lang.as_str())
            }
        }
    }

    /// Decode the tokens after `admin`.
    fn decode(rest: &[&str]) -> Option<Self> {
        let action = match rest {
            ["back"] => AdminAction::Back,
            ["access"] => AdminAction::Access,
            ["search"] => AdminAction::Search,
            ["role", role, page] => AdminAction::RoleList {
                role: Role::parse(role)?,
                page: parse_page(page)?,
            },
            ["adduser", role] => AdminAction::AddUser(Role::parse(role)?),
            ["user", id] => AdminAction::User(parse_id(id)?),
            ["usergroups", id] => AdminAction::UserGroups {
                id: parse_id(id)?,
                page: 0,
            },
            ["usergroups", id, page] => AdminAction::UserGroups {
                id: parse_id(id)?,
                page: parse_page(page)?,
            },
            ["addgroup", id, title] | ["addgroup", id, title, _] if !title.is_empty() => {
                AdminAction::AddGroup {
                    id: parse_id(id)?,
                    title: title.to_string(),
                    page: rest.get(3).map_or(Some(0), |p| parse_page(p))?,
                }
            }
            ["removegroup", id, title] | ["removegroup", id, title, _] if !title.is_empty() => {
                AdminAction::RemoveGroup {
                    id: parse_id(id)?,
                    title: title.to_string(),
                    page: rest.get(3).map_or(Some(0), |p| parse_page(p))?,
                }
            }
            ["changerole", id] => AdminAction::ChangeRole(parse_id(id)?),
            ["setrole", role, id] => AdminAction::SetRole {
                role: Role::parse(role)?,
                id: parse_id(id)?,
            },
            ["confirmdelete", id] => AdminAction::ConfirmDelete(parse_id(id)?),
            ["deleteuser", id] => AdminAction::DeleteUser(parse_id(id)?),
            ["groups"] => AdminAction::Groups { page: 0 },
            ["groups", page] => AdminAction::Groups {
                page: parse_page(page)?,
            },
            ["groupstats", title] if !title.is_empty() => AdminAction::GroupStats {
                title: title.to_string(),
            },
            ["reports"] => AdminAction::Reports,
            ["audit"] => AdminAction::Audit,
            ["settings"] => AdminAction::Settings,
            ["settings", "welcome"] => AdminAction::SettingsWelcome,
            ["settings", "lang", lang] => AdminAction::SettingsLanguage(Language::parse(lang)?),
            _ => return None,
        };
        Some(action)
    }
}

impl ReportAction {
    pub fn encode(&self) -> String {
        match self {
            ReportAction::Groups { period, page } => format!("rpt|{}|{page}", period.as_str()),
            ReportAction::Generate { period, title } => {
                with_title(&format!("genrpt|{}", period.as_str()), title, "")
            }
        }
    }
}

impl SettingsAction {
    pub fn encode(&self) -> String {
        match self {
            SettingsAction::Main => "settings|main".to_string(),
            SettingsAction::Back => "settings|back".to_string(),
            SettingsAction::Notifications => "settings|notifications".to_string(),
            SettingsAction::DateFormat => "settings|date_format".to_string(),
            SettingsAction::PageSize => "settings|page_size".to_string(),
            SettingsAction::AutoReport => "settings|auto_report".to_string(),
            SettingsAction::Language => "settings|language".to_string(),
            SettingsAction::SetNotifications(b) => format!("setnotif|{}", on_off(*b)),
            SettingsAction::SetDateFormat(d) => format!("setdate|{}", d.as_str()),
            SettingsAction::SetPageSize(n) => format!("setpage|{n}"),
            SettingsAction::SetAutoReport(b) => format!("setauto|{}", on_off(*b)),
            SettingsAction::SetLanguage(l) => format!("setlang|{}", l.as_str()),
        }
    }

    fn decode_menu(verb: &str) -> Option<Self> {
        Some(match verb {
            "main" => SettingsAction::Main,
            "back" => SettingsAction::Back,
            "notifications" => SettingsAction::Notifications,
            "date_format" => SettingsAction::DateFormat,
            "page_size" => SettingsAction::PageSize,
            "auto_report" => SettingsAction::AutoReport,
            "language" => SettingsAction::Language,
            _ => return None,
        })
    }

    fn decode_set(verb: &str, value: &str) -> Option<Self> {
        let flag = || match value {
            "on" => Some(true),
            "off" => Some(false),
            _ => None,
        };
        Some(match verb {
            "setnotif" => SettingsAction::SetNotifications(flag()?),
            "setauto" => SettingsAction::SetAutoReport(flag()?),
            "setdate" => SettingsAction::SetDateFormat(DateFormat::parse(value)?),
            "setlang" => SettingsAction::SetLanguage(Language::parse(value)?),
            "setpage" => {
                let n: u8 = value.parse().ok()?;
                if !PAGE_SIZE_OPTIONS.contains(&n) {
                    return None;
                }
                SettingsAction::SetPageSize(n)
            }
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(s: &str) -> Action {
        Action::decode(s).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn decodes_the_catalogue() {
        assert_eq!(decode("noop"), Action::Noop);
        assert_eq!(decode("cancel"), Action::Cancel);
        assert_eq!(
            decode("admin|role|user|2"),
            AdminAction::RoleList {
                role: Role::User,
                page: 2
            }
            .into()
        );
        assert_eq!(
            decode("admin|setrole|blocked|17"),
            AdminAction::SetRole {
                role: Role::Blocked,
                id: 17
            }
            .into()
        );
        assert_eq!(
            decode("admin|addgroup|3|Ops Team"),
            AdminAction::AddGroup {
                id: 3,
                title: "Ops Team".into(),
                page: 0
            }
            .into()
        );
        assert_eq!(decode("admin|groups"), AdminAction::Groups { page: 0 }.into());
        assert_eq!(
            decode("admin|settings|lang|en"),
            AdminAction::SettingsLanguage(Language::En).into()
        );
        assert_eq!(
            decode("rpt|weekly"),
            ReportAction::Groups {
                period: ReportPeriod::Weekly,
                page: 0
            }
            .into()
        );
        assert_eq!(
            decode("setpage|15"),
            SettingsAction::SetPageSize(15).into()
        );
        assert_eq!(
            decode("setnotif|off"),
            SettingsAction::SetNotifications(false).into()
        );
    }

    #[test]
    fn legacy_report_alias_decodes_to_generate() {
        assert_eq!(
            decode("report|monthly|Ops"),
            decode("genrpt|monthly|Ops")
        );
    }

    #[test]
    fn structurally_wrong_strings_are_rejected() {
        for bad in [
            "",
            "admin",
            "admin|role|user",
            "admin|role|wizard|0",
            "admin|user|abc",
            "admin|deleteuser",
            "admin|deleteuser|1|2",
            "admin|addgroup|1|",
            "rpt|daily",
            "genrpt|weekly",
            "setpage|7",
            "setnotif|maybe",
            "settings|colors",
            "unknown|thing",
        ] {
            assert!(Action::decode(bad).is_err(), "{bad:?} decoded");
        }
    }

    #[test]
    fn negative_pages_mean_first_page() {
        assert_eq!(
            decode("admin|usergroups|4|-3"),
            AdminAction::UserGroups { id: 4, page: 0 }.into()
        );
    }

    #[test]
    fn every_variant_round_trips() {
        let samples: Vec<Action> = vec![
            AdminAction::Back.into(),
            AdminAction::Access.into(),
            AdminAction::Search.into(),
            AdminAction::AddUser(Role::Admin).into(),
            AdminAction::User(9).into(),
            AdminAction::UserGroups { id: 9, page: 1 }.into(),
            AdminAction::RemoveGroup {
                id: 9,
                title: "Sales".into(),
                page: 2,
            }
            .into(),
            AdminAction::ChangeRole(9).into(),
            AdminAction::ConfirmDelete(9).into(),
            AdminAction::DeleteUser(9).into(),
            AdminAction::Groups { page: 3 }.into(),
            AdminAction::GroupStats {
                title: "Sales".into(),
            }
            .into(),
            AdminAction::Reports.into(),
            AdminAction::Audit.into(),
            AdminAction::Settings.into(),
            AdminAction::SettingsWelcome.into(),
            ReportAction::Generate {
                period: ReportPeriod::Monthly,
                title: "Sales".into(),
            }
            .into(),
            SettingsAction::Main.into(),
            SettingsAction::Back.into(),
            SettingsAction::Language.into(),
            SettingsAction::SetDateFormat(DateFormat::Miladi).into(),
            SettingsAction::SetAutoReport(true).into(),
            SettingsAction::SetLanguage(Language::Fa).into(),
        ];
        for a in samples {
            assert_eq!(Action::decode(&a.encode()), Ok(a.clone()), "{a}");
        }
    }

    #[test]
    fn long_titles_fit_the_callback_limit() {
        let title = "گروه هماهنگی پروژه‌های زیرساخت | تیم عملیات شبانه و پشتیبانی";
        let action = Action::from(AdminAction::RemoveGroup {
            id: 1_234_567_890,
            title: title.into(),
            page: 12,
        });
        let data = action.encode();
        assert!(data.len() <= CALLBACK_DATA_MAX_BYTES, "{} bytes", data.len());

        let Action::Admin(AdminAction::RemoveGroup { title: token, page, .. }) = decode(&data)
        else {
            panic!("wrong variant");
        };
        assert_eq!(page, 12);
        assert!(!token.contains(DELIM));

        let candidates = vec!["Other".to_string(), title.to_string()];
        assert_eq!(resolve_title(&token, &candidates).as_deref(), Some(title));
    }

    #[test]
    fn ambiguous_prefixes_resolve_to_nothing() {
        let candidates = vec![
            "Regional Sales Team North".to_string(),
            "Regional Sales Team South".to_string(),
        ];
        assert_eq!(resolve_title("Regional Sales", &candidates), None);
        assert_eq!(
            resolve_title("Regional Sales Team South", &candidates).as_deref(),
            Some("Regional Sales Team South")
        );
        assert_eq!(resolve_title("", &candidates), None);
    }

    #[test]
    fn namespace_is_first_token() {
        assert_eq!(namespace("admin|deleteuser|3"), "admin");
        assert_eq!(namespace("noop"), "noop");
        assert_eq!(namespace(""), "");
    }
}
