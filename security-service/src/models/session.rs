//! Session security model - server-side session records with client binding.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Authenticated session entity.
///
/// The identifier is opaque and unguessable; IP and user-agent are captured
/// at creation and used for hijack detection. `mfa_verified` only ever moves
/// false -> true for the lifetime of the session.
#[derive(Debug, Clone, FromRow)]
pub struct SessionSecurity {
    pub session_id: String,
    pub user_id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub created_utc: DateTime<Utc>,
    pub last_activity_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub active: bool,
    pub mfa_verified: bool,
}

impl SessionSecurity {
    pub fn new(
        session_id: String,
        user_id: Uuid,
        ip_address: String,
        user_agent: String,
        timeout_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            ip_address,
            user_agent,
            created_utc: now,
            last_activity_utc: now,
            expiry_utc: now + Duration::minutes(timeout_minutes),
            active: true,
            mfa_verified: false,
        }
    }

    /// Valid for request authentication: active and not past expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expiry_utc > now
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_utc <= now
    }
}

/// Session info for API responses; never exposes the raw identifier of
/// sessions other than the caller's own.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionInfo {
    pub user_id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub created_utc: DateTime<Utc>,
    pub last_activity_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub mfa_verified: bool,
    pub is_current: bool,
}

impl From<SessionSecurity> for SessionInfo {
    fn from(s: SessionSecurity) -> Self {
        Self {
            user_id: s.user_id,
            ip_address: s.ip_address,
            user_agent: s.user_agent,
            created_utc: s.created_utc,
            last_activity_utc: s.last_activity_utc,
            expiry_utc: s.expiry_utc,
            mfa_verified: s.mfa_verified,
            is_current: false, // Set by caller
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_valid_and_unverified() {
        let s = SessionSecurity::new(
            "abc".to_string(),
            Uuid::new_v4(),
            "10.0.0.1".to_string(),
            "test-agent".to_string(),
            30,
        );
        assert!(s.is_valid_at(Utc::now()));
        assert!(!s.mfa_verified);
    }

    #[test]
    fn session_past_expiry_is_invalid() {
        let mut s = SessionSecurity::new(
            "abc".to_string(),
            Uuid::new_v4(),
            "10.0.0.1".to_string(),
            "test-agent".to_string(),
            30,
        );
        s.expiry_utc = Utc::now() - Duration::minutes(1);
        assert!(!s.is_valid_at(Utc::now()));
        assert!(s.is_expired_at(Utc::now()));
    }
}
