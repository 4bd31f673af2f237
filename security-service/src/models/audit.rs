//! Security audit log model - immutable records of security-relevant actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::rbac::{Permission, Role};

/// Audited action types, from a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAction {
    Login,
    Logout,
    PasswordChange,
    MfaEnabled,
    MfaDisabled,
    RoleChange,
    PermissionGrant,
    PermissionRevoke,
    DataAccess,
    DataExport,
    DataDeletion,
    AdminAction,
    SecurityBreach,
    UnauthorizedAccess,
}

impl SecurityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityAction::Login => "login",
            SecurityAction::Logout => "logout",
            SecurityAction::PasswordChange => "password_change",
            SecurityAction::MfaEnabled => "mfa_enabled",
            SecurityAction::MfaDisabled => "mfa_disabled",
            SecurityAction::RoleChange => "role_change",
            SecurityAction::PermissionGrant => "permission_grant",
            SecurityAction::PermissionRevoke => "permission_revoke",
            SecurityAction::DataAccess => "data_access",
            SecurityAction::DataExport => "data_export",
            SecurityAction::DataDeletion => "data_deletion",
            SecurityAction::AdminAction => "admin_action",
            SecurityAction::SecurityBreach => "security_breach",
            SecurityAction::UnauthorizedAccess => "unauthorized_access",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "login" => Some(SecurityAction::Login),
            "logout" => Some(SecurityAction::Logout),
            "password_change" => Some(SecurityAction::PasswordChange),
            "mfa_enabled" => Some(SecurityAction::MfaEnabled),
            "mfa_disabled" => Some(SecurityAction::MfaDisabled),
            "role_change" => Some(SecurityAction::RoleChange),
            "permission_grant" => Some(SecurityAction::PermissionGrant),
            "permission_revoke" => Some(SecurityAction::PermissionRevoke),
            "data_access" => Some(SecurityAction::DataAccess),
            "data_export" => Some(SecurityAction::DataExport),
            "data_deletion" => Some(SecurityAction::DataDeletion),
            "admin_action" => Some(SecurityAction::AdminAction),
            "security_breach" => Some(SecurityAction::SecurityBreach),
            "unauthorized_access" => Some(SecurityAction::UnauthorizedAccess),
            _ => None,
        }
    }
}

impl std::fmt::Display for SecurityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk classification attached to every audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
        _ => None,
        }
    }
}

/// Structured detail payload per audited action.
///
/// Closed and serialized with a `kind` tag so audit queries stay type-safe;
/// new variants are added additively.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditDetails {
    FailedLogin {
        email: String,
        reason: String,
    },
    RoleChange {
        previous: Role,
        assigned: Role,
    },
    PermissionGrant {
        permission: Permission,
    },
    PermissionRevoke {
        permission: Permission,
        /// True when the revocation was recorded as a denial overriding a
        /// role default rather than the removal of an explicit grant.
        denial: bool,
    },
    MfaChallenge {
        /// Accepted second factor; absent when the challenge failed.
        method: Option<MfaMethod>,
    },
    AccessDenied {
        required: String,
    },
    Note {
        message: String,
    },
}

/// Second-factor methods accepted by an MFA challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MfaMethod {
    Totp,
    BackupCode,
}

/// Audit log entity. Append-only; rows are never updated once written.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SecurityAuditLog {
    pub log_id: Uuid,
    /// Acting user; absent for pre-authentication failures.
    pub user_id: Option<Uuid>,
    pub action: SecurityAction,
    /// Target resource, e.g. `user:<id>` or a route path.
    pub resource: String,
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
    pub details: Option<AuditDetails>,
    pub risk_level: RiskLevel,
    pub created_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_codes_round_trip() {
        for action in [
            SecurityAction::Login,
            SecurityAction::PermissionGrant,
            SecurityAction::SecurityBreach,
            SecurityAction::UnauthorizedAccess,
        ] {
            assert_eq!(SecurityAction::parse(action.as_str()), Some(action));
        }
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn details_serialize_with_kind_tag() {
        let details = AuditDetails::PermissionGrant {
            permission: Permission::DataExport,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["kind"], "permission_grant");
        assert_eq!(json["permission"], "data_export");
    }
}
