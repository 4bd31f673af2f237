//! Role and permission model - ordered role tiers with additive defaults.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;

/// User role. Exactly one per user, from a closed set.
///
/// Tiers are ordered; each tier's default permission set is a strict
/// superset of the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Support,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Support => "support",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(Role::Customer),
            "support" => Some(Role::Support),
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    /// Position in the tier order, lowest privilege first.
    pub fn tier(&self) -> u8 {
        match self {
            Role::Customer => 0,
            Role::Support => 1,
            Role::Admin => 2,
            Role::SuperAdmin => 3,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission keys, from a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewOwnData,
    EditOwnData,
    DeleteOwnData,
    ExportOwnData,
    ViewCustomerData,
    EditCustomerData,
    ViewAuditLogs,
    ManageUsers,
    ManageRoles,
    DataExport,
    DataDelete,
    ViewSecurityEvents,
    ManageSecuritySettings,
    SystemAdmin,
}

impl Permission {
    /// Every defined permission; super-admin holds all of them.
    pub const ALL: &'static [Permission] = &[
        Permission::ViewOwnData,
        Permission::EditOwnData,
        Permission::DeleteOwnData,
        Permission::ExportOwnData,
        Permission::ViewCustomerData,
        Permission::EditCustomerData,
        Permission::ViewAuditLogs,
        Permission::ManageUsers,
        Permission::ManageRoles,
        Permission::DataExport,
        Permission::DataDelete,
        Permission::ViewSecurityEvents,
        Permission::ManageSecuritySettings,
        Permission::SystemAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewOwnData => "view_own_data",
            Permission::EditOwnData => "edit_own_data",
            Permission::DeleteOwnData => "delete_own_data",
            Permission::ExportOwnData => "export_own_data",
            Permission::ViewCustomerData => "view_customer_data",
            Permission::EditCustomerData => "edit_customer_data",
            Permission::ViewAuditLogs => "view_audit_logs",
            Permission::ManageUsers => "manage_users",
            Permission::ManageRoles => "manage_roles",
            Permission::DataExport => "data_export",
            Permission::DataDelete => "data_delete",
            Permission::ViewSecurityEvents => "view_security_events",
            Permission::ManageSecuritySettings => "manage_security_settings",
            Permission::SystemAdmin => "system_admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permissions each tier adds on top of the previous one.
const CUSTOMER_TIER: &[Permission] = &[
    Permission::ViewOwnData,
    Permission::EditOwnData,
    Permission::DeleteOwnData,
    Permission::ExportOwnData,
];

const SUPPORT_TIER: &[Permission] = &[
    Permission::ViewCustomerData,
    Permission::EditCustomerData,
    Permission::ViewAuditLogs,
];

const ADMIN_TIER: &[Permission] = &[
    Permission::ManageUsers,
    Permission::ManageRoles,
    Permission::DataExport,
    Permission::DataDelete,
    Permission::ViewSecurityEvents,
    Permission::ManageSecuritySettings,
];

/// Default permission set per role, computed once by folding the tiers so
/// role definitions cannot drift apart.
static ROLE_DEFAULTS: Lazy<HashMap<Role, HashSet<Permission>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    let mut acc: HashSet<Permission> = HashSet::new();

    acc.extend(CUSTOMER_TIER.iter().copied());
    map.insert(Role::Customer, acc.clone());

    acc.extend(SUPPORT_TIER.iter().copied());
    map.insert(Role::Support, acc.clone());

    acc.extend(ADMIN_TIER.iter().copied());
    map.insert(Role::Admin, acc);

    map.insert(Role::SuperAdmin, Permission::ALL.iter().copied().collect());
    map
});

/// Default permissions granted by a role.
pub fn role_permissions(role: Role) -> &'static HashSet<Permission> {
    &ROLE_DEFAULTS[&role]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_strict_supersets() {
        let customer = role_permissions(Role::Customer);
        let support = role_permissions(Role::Support);
        let admin = role_permissions(Role::Admin);
        let super_admin = role_permissions(Role::SuperAdmin);

        assert!(customer.is_subset(support) && customer.len() < support.len());
        assert!(support.is_subset(admin) && support.len() < admin.len());
        assert!(admin.is_subset(super_admin) && admin.len() < super_admin.len());
    }

    #[test]
    fn super_admin_holds_every_permission() {
        let super_admin = role_permissions(Role::SuperAdmin);
        for p in Permission::ALL {
            assert!(super_admin.contains(p), "missing {}", p);
        }
    }

    #[test]
    fn role_codes_round_trip() {
        for role in [Role::Customer, Role::Support, Role::Admin, Role::SuperAdmin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn permission_codes_round_trip() {
        for p in Permission::ALL {
            assert_eq!(Permission::parse(p.as_str()), Some(*p));
        }
    }
}
