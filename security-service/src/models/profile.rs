//! User security profile - per-user authentication and authorization state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::rbac::{Permission, Role};

/// Security profile for a user.
///
/// Created lazily on the first authentication-related action. Never hard
/// deleted; anonymization clears MFA material and stamps `anonymized_utc`
/// while the row (and the audit trail referencing it) survives.
#[derive(Debug, Clone)]
pub struct UserSecurityProfile {
    pub user_id: Uuid,
    pub role: Role,
    /// Explicit grants beyond the role defaults.
    pub explicit_permissions: Vec<Permission>,
    /// Explicit denials; these override role defaults.
    pub denied_permissions: Vec<Permission>,
    pub mfa_enabled: bool,
    /// TOTP secret, ChaCha20-Poly1305 sealed (`nonce || ciphertext`).
    pub mfa_secret: Option<Vec<u8>>,
    /// SHA-256 digests of the outstanding single-use backup codes.
    pub backup_code_hashes: Vec<String>,
    pub failed_login_count: i32,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub password_changed_utc: Option<DateTime<Utc>>,
    /// Per-user override of the configured session timeout.
    pub session_timeout_minutes: Option<i64>,
    pub created_utc: DateTime<Utc>,
    pub anonymized_utc: Option<DateTime<Utc>>,
}

impl UserSecurityProfile {
    /// Fresh profile with the lowest-privilege role and no MFA.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Customer,
            explicit_permissions: Vec::new(),
            denied_permissions: Vec::new(),
            mfa_enabled: false,
            mfa_secret: None,
            backup_code_hashes: Vec::new(),
            failed_login_count: 0,
            last_login_utc: None,
            password_changed_utc: None,
            session_timeout_minutes: None,
            created_utc: Utc::now(),
            anonymized_utc: None,
        }
    }

    /// Disabling MFA clears the secret and backup codes together; there is
    /// no valid partial state.
    pub fn clear_mfa(&mut self) {
        self.mfa_enabled = false;
        self.mfa_secret = None;
        self.backup_code_hashes.clear();
    }
}
