//! Role and capability model.
//!
//! Access decisions are always capability-set membership. `Role::level` exists
//! only to order roles for display.

use std::collections::BTreeSet;

use crate::domain::UserRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Owner,
    Admin,
    User,
    Blocked,
}

impl Role {
    /// Display order, highest first.
    pub const ALL: [Role; 4] = [Role::Owner, Role::Admin, Role::User, Role::Blocked];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::User => "user",
            Role::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Some(Role::Owner),
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            "blocked" => Some(Role::Blocked),
            _ => None,
        }
    }

    /// Display-only ranking. Never use this for access checks.
    pub fn level(self) -> u8 {
        match self {
            Role::Owner => 4,
            Role::Admin => 3,
            Role::User => 1,
            Role::Blocked => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Owner => "Owner",
            Role::Admin => "Admin",
            Role::User => "User",
            Role::Blocked => "Blocked",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Role::Owner => "👑",
            Role::Admin => "🛡",
            Role::User => "👤",
            Role::Blocked => "🚫",
        }
    }

    /// `is_active` / `is_admin` flags written alongside this role.
    pub fn stored_flags(self) -> (bool, bool) {
        match self {
            Role::Owner | Role::Admin => (true, true),
            Role::User => (true, false),
            Role::Blocked => (false, false),
        }
    }

    pub fn base_capabilities(self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Owner => &[
                ManageUsers,
                ManageGroups,
                ViewAllGroups,
                ViewReports,
                RequestReports,
                EditPermissions,
                ViewAuditLogs,
                ExportData,
                DeleteData,
                AiPriorityProcessing,
            ],
            Role::Admin => &[
                ManageUsers,
                ManageGroups,
                ViewAllGroups,
                ViewReports,
                RequestReports,
                EditPermissions,
                ViewAuditLogs,
                ExportData,
                AiPriorityProcessing,
            ],
            Role::User => &[ViewReports, RequestReports],
            Role::Blocked => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    ManageUsers,
    ManageGroups,
    ViewAllGroups,
    ViewReports,
    RequestReports,
    EditPermissions,
    ViewAuditLogs,
    ExportData,
    DeleteData,
    AiPriorityProcessing,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ManageUsers => "manage_users",
            Capability::ManageGroups => "manage_groups",
            Capability::ViewAllGroups => "view_all_groups",
            Capability::ViewReports => "view_reports",
            Capability::RequestReports => "request_reports",
            Capability::EditPermissions => "edit_permissions",
            Capability::ViewAuditLogs => "view_audit_logs",
            Capability::ExportData => "export_data",
            Capability::DeleteData => "delete_data",
            Capability::AiPriorityProcessing => "ai_priority_processing",
        }
    }
}

/// Capability strings held by a user.
///
/// Extra grants may name capabilities this build does not know about; they are
/// kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn for_role(role: Role) -> Self {
        Self(
            role.base_capabilities()
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        )
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.0.contains(cap.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Role actually applied to a record.
pub fn effective_role(record: Option<&UserRecord>) -> Role {
    let Some(record) = record else {
        return Role::Blocked;
    };
    if !record.is_active {
        return Role::Blocked;
    }
    if let Some(role) = Role::parse(&record.role) {
        return role;
    }
    if record.is_admin {
        Role::Admin
    } else {
        Role::User
    }
}

/// Base set for the effective role plus any extra grants. Blocked users get
/// nothing, extras included.
pub fn permissions_of(record: Option<&UserRecord>) -> PermissionSet {
    let role = effective_role(record);
    if role == Role::Blocked {
        return PermissionSet::default();
    }

    let mut perms = PermissionSet::for_role(role);
    if let Some(extra) = record.and_then(|r| r.extra_permissions.as_ref()) {
        for p in extra {
            let p = p.trim();
            if !p.is_empty() {
                perms.0.insert(p.to_string());
            }
        }
    }
    perms
}

pub fn can_see_all_groups(record: &UserRecord) -> bool {
    // The legacy flag never lets a blocked user through.
    let perms = permissions_of(Some(record));
    perms.has(Capability::ViewAllGroups) || (!perms.is_empty() && record.allow_all_groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(role: &str, extra: Option<Vec<&str>>) -> UserRecord {
        UserRecord {
            id: 1,
            handle: Some("alice".into()),
            telegram_id: Some(10),
            role: role.to_string(),
            is_active: true,
            is_admin: false,
            allow_all_groups: false,
            extra_permissions: extra.map(|v| v.into_iter().map(String::from).collect()),
            created_at: None,
        }
    }

    #[test]
    fn base_sets_match_role_table() {
        for role in Role::ALL {
            let perms = permissions_of(Some(&record(role.as_str(), None)));
            assert_eq!(perms, PermissionSet::for_role(role), "role {role:?}");
        }
        let admin = PermissionSet::for_role(Role::Admin);
        let owner = PermissionSet::for_role(Role::Owner);
        assert!(owner.has(Capability::DeleteData));
        assert!(!admin.has(Capability::DeleteData));
        assert_eq!(owner.len(), admin.len() + 1);
    }

    #[test]
    fn blocked_ignores_extra_permissions() {
        let r = record("blocked", Some(vec!["manage_users", "view_all_groups"]));
        assert!(permissions_of(Some(&r)).is_empty());

        let mut inactive = record("admin", Some(vec!["manage_users"]));
        inactive.is_active = false;
        assert!(permissions_of(Some(&inactive)).is_empty());
        assert_eq!(effective_role(Some(&inactive)), Role::Blocked);
    }

    #[test]
    fn extras_extend_the_base_set() {
        let r = record("user", Some(vec!["view_audit_logs", "custom_flag"]));
        let perms = permissions_of(Some(&r));
        assert!(perms.has(Capability::ViewAuditLogs));
        assert!(perms.has(Capability::RequestReports));
        assert!(perms.iter().any(|p| p == "custom_flag"));
    }

    #[test]
    fn missing_record_is_blocked() {
        assert_eq!(effective_role(None), Role::Blocked);
        assert!(permissions_of(None).is_empty());
    }

    #[test]
    fn unknown_role_falls_back_on_legacy_admin_flag() {
        let mut r = record("supervisor", None);
        assert_eq!(effective_role(Some(&r)), Role::User);
        r.is_admin = true;
        assert_eq!(effective_role(Some(&r)), Role::Admin);
        r.role = " OWNER ".into();
        assert_eq!(effective_role(Some(&r)), Role::Owner);
    }

    #[test]
    fn legacy_allow_all_groups_flag() {
        let mut r = record("user", None);
        assert!(!can_see_all_groups(&r));
        r.allow_all_groups = true;
        assert!(can_see_all_groups(&r));
        r.role = "blocked".into();
        assert!(!can_see_all_groups(&r));
        assert!(can_see_all_groups(&record("admin", None)));
    }

    #[test]
    fn display_levels_are_ordered() {
        let levels: Vec<u8> = Role::ALL.iter().map(|r| r.level()).collect();
        assert!(levels.windows(2).all(|w| w[0] > w[1]));
    }
}
