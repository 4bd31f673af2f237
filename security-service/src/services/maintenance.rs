//! Recurring maintenance and data lifecycle.
//!
//! All sweeps are idempotent and convergent, so overlapping runs (timer vs.
//! operator-triggered, or multiple instances) are safe.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::middleware::rate_limit::RateLimiters;
use crate::models::{AuditDetails, SecurityAction};
use crate::store::SecurityStore;

use super::{ensure_profile, AuditLogger, ServiceError, SessionManager};

/// How long audit data is kept before the purge drops it.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub audit_log_days: i64,
    pub security_event_days: i64,
}

/// Counts from one cleanup pass.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct CleanupReport {
    pub expired_sessions: u64,
    pub purged_audit_logs: u64,
    pub purged_security_events: u64,
    pub evicted_rate_counters: u64,
}

#[derive(Clone)]
pub struct MaintenanceService {
    store: Arc<dyn SecurityStore>,
    sessions: SessionManager,
    audit: AuditLogger,
    rate_limiters: RateLimiters,
    retention: RetentionPolicy,
}

impl MaintenanceService {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        sessions: SessionManager,
        audit: AuditLogger,
        rate_limiters: RateLimiters,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            sessions,
            audit,
            rate_limiters,
            retention,
        }
    }

    /// Sweep expired sessions, purge audit data past retention and drop
    /// stale rate-limit counters.
    pub async fn run_cleanup(&self) -> Result<CleanupReport, ServiceError> {
        let now = Utc::now();

        let expired_sessions = self.sessions.cleanup_expired_sessions().await?;
        let purged_audit_logs = self
            .store
            .purge_audit_logs_before(now - Duration::days(self.retention.audit_log_days))
            .await?;
        let purged_security_events = self
            .store
            .purge_security_events_before(now - Duration::days(self.retention.security_event_days))
            .await?;
        let evicted_rate_counters = self.rate_limiters.evict_expired_at(now);

        let report = CleanupReport {
            expired_sessions,
            purged_audit_logs,
            purged_security_events,
            evicted_rate_counters,
        };
        tracing::info!(
            expired_sessions = report.expired_sessions,
            purged_audit_logs = report.purged_audit_logs,
            purged_security_events = report.purged_security_events,
            evicted_rate_counters = report.evicted_rate_counters,
            "Maintenance cleanup completed"
        );
        Ok(report)
    }

    /// Anonymize a user instead of deleting them: clear MFA material, blank
    /// session bindings and deactivate sessions. Audit rows are immutable
    /// and stay; they age out through the retention purge.
    pub async fn anonymize_user(
        &self,
        user_id: Uuid,
        actor_id: Uuid,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<(), ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;
        profile.clear_mfa();
        profile.session_timeout_minutes = None;
        profile.anonymized_utc = Some(Utc::now());
        self.store.upsert_profile(&profile).await?;

        let scrubbed = self.store.scrub_session_pii(user_id).await?;

        self.audit
            .log_security_action(
                Some(actor_id),
                SecurityAction::DataDeletion,
                format!("user:{}", user_id),
                ip_address,
                user_agent,
                true,
                Some(AuditDetails::Note {
                    message: format!("User anonymized; {} sessions scrubbed", scrubbed),
                }),
            )
            .await?;
        Ok(())
    }
}
