//! Storage abstraction for the security entities.
//!
//! The services only see the [`SecurityStore`] trait; production runs on
//! PostgreSQL ([`PgStore`]), tests and local development on [`MemoryStore`].

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ConsentPurpose, DataConsent, EventSeverity, SecurityAction, SecurityAlert, SecurityAuditLog,
    SecurityEvent, SecurityEventType, SessionSecurity, UserSecurityProfile,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Audit log query filter; results come back newest-first.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<SecurityAction>,
    pub limit: Option<i64>,
}

/// Security event query filter; results come back newest-first.
#[derive(Debug, Clone, Default)]
pub struct SecurityEventFilter {
    pub user_id: Option<Uuid>,
    pub event_type: Option<SecurityEventType>,
    pub severity: Option<EventSeverity>,
    pub limit: Option<i64>,
}

#[async_trait]
pub trait SecurityStore: Send + Sync {
    // ==================== Profiles ====================

    async fn find_profile(&self, user_id: Uuid)
        -> Result<Option<UserSecurityProfile>, StoreError>;

    /// Insert or fully replace a profile row.
    async fn upsert_profile(&self, profile: &UserSecurityProfile) -> Result<(), StoreError>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &SessionSecurity) -> Result<(), StoreError>;

    async fn find_session(&self, session_id: &str) -> Result<Option<SessionSecurity>, StoreError>;

    /// Fully replace a session row (last activity, expiry, flags).
    async fn update_session(&self, session: &SessionSecurity) -> Result<(), StoreError>;

    async fn active_sessions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<SessionSecurity>, StoreError>;

    /// Idempotent deactivation; the row is kept for the audit trail.
    async fn deactivate_session(&self, session_id: &str) -> Result<(), StoreError>;

    /// Deactivate every active session of a user, optionally sparing one.
    /// Returns the number of sessions deactivated.
    async fn deactivate_user_sessions(
        &self,
        user_id: Uuid,
        except_session_id: Option<&str>,
    ) -> Result<u64, StoreError>;

    /// Deactivate all sessions past expiry. Returns the number swept.
    async fn deactivate_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Blank the IP/user-agent binding on a user's sessions (anonymization).
    async fn scrub_session_pii(&self, user_id: Uuid) -> Result<u64, StoreError>;

    // ==================== Audit logs ====================

    async fn insert_audit_log(&self, log: &SecurityAuditLog) -> Result<(), StoreError>;

    async fn find_audit_logs(
        &self,
        filter: &AuditLogFilter,
    ) -> Result<Vec<SecurityAuditLog>, StoreError>;

    /// Failed login attempts recorded from an IP since the given instant.
    async fn count_failed_logins_from_ip(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn purge_audit_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    // ==================== Security events & alerts ====================

    async fn insert_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError>;

    async fn find_security_events(
        &self,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>, StoreError>;

    async fn purge_security_events_before(&self, cutoff: DateTime<Utc>)
        -> Result<u64, StoreError>;

    async fn insert_alert(&self, alert: &SecurityAlert) -> Result<(), StoreError>;

    /// Returns false when the alert does not exist.
    async fn acknowledge_alert(&self, alert_id: Uuid) -> Result<bool, StoreError>;

    async fn unacknowledged_alerts(&self, limit: i64) -> Result<Vec<SecurityAlert>, StoreError>;

    // ==================== Consents ====================

    /// Insert or replace the consent record for `(user, purpose)`.
    async fn upsert_consent(&self, consent: &DataConsent) -> Result<(), StoreError>;

    async fn find_consent(
        &self,
        user_id: Uuid,
        purpose: ConsentPurpose,
    ) -> Result<Option<DataConsent>, StoreError>;

    async fn consents_for_user(&self, user_id: Uuid) -> Result<Vec<DataConsent>, StoreError>;

    /// Returns false when no unrevoked consent existed.
    async fn revoke_consent(
        &self,
        user_id: Uuid,
        purpose: ConsentPurpose,
    ) -> Result<bool, StoreError>;

    // ==================== Health ====================

    async fn health_check(&self) -> Result<(), StoreError>;
}
