//! Session lifecycle management.
//!
//! Sessions are opaque server-side records bound to the IP and user-agent
//! observed at creation. A session identifier presented from a different
//! network invalidates the session on the spot.

use chrono::{Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    EventDetails, EventSeverity, SecurityEventType, SessionSecurity, UserSecurityProfile,
};
use crate::store::SecurityStore;

use super::{ensure_profile, AuditLogger, ServiceError};

/// Session identifier entropy in bytes (hex-encoded on the wire).
const SESSION_ID_LEN: usize = 32;

/// Active sessions older than this are flagged as suspicious.
const MAX_SESSION_AGE_HOURS: i64 = 24;
/// More distinct concurrently-bound IPs than this is suspicious.
const MAX_DISTINCT_IPS: usize = 2;
/// More distinct user-agent strings than this is suspicious.
const MAX_DISTINCT_USER_AGENTS: usize = 3;

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SecurityStore>,
    audit: AuditLogger,
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_LEN];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl SessionManager {
    pub fn new(store: Arc<dyn SecurityStore>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    /// Create a session after successful primary authentication.
    ///
    /// Also touches the profile: stamps the login, resets the failed-login
    /// counter, and creates the profile on a user's first login.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        ip_address: &str,
        user_agent: &str,
        timeout_minutes: i64,
    ) -> Result<SessionSecurity, ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;
        profile.last_login_utc = Some(Utc::now());
        profile.failed_login_count = 0;
        self.store.upsert_profile(&profile).await?;

        let session = SessionSecurity::new(
            generate_session_id(),
            user_id,
            ip_address.to_string(),
            user_agent.to_string(),
            timeout_minutes,
        );
        self.store.insert_session(&session).await?;

        tracing::info!(user_id = %user_id, "Session created");
        Ok(session)
    }

    /// Look up an active, unexpired session and touch its last activity.
    ///
    /// When `presented_ip` differs from the bound IP the session is
    /// invalidated immediately and validation fails; a stolen identifier
    /// replayed from another network must not survive the attempt.
    pub async fn validate_session(
        &self,
        session_id: &str,
        presented_ip: Option<&str>,
    ) -> Result<Option<SessionSecurity>, ServiceError> {
        let Some(mut session) = self.store.find_session(session_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if !session.is_valid_at(now) {
            return Ok(None);
        }

        if let Some(ip) = presented_ip {
            if ip != session.ip_address {
                self.store.deactivate_session(session_id).await?;
                tracing::warn!(
                    user_id = %session.user_id,
                    bound_ip = %session.ip_address,
                    presented_ip = %ip,
                    "Session IP mismatch, session invalidated"
                );
                if let Err(e) = self
                    .audit
                    .create_security_event(
                        SecurityEventType::SuspiciousActivity,
                        EventSeverity::Medium,
                        Some(session.user_id),
                        Some(ip.to_string()),
                        "Session presented from a different network and was invalidated",
                        Some(EventDetails::IpMismatch {
                            bound_ip: session.ip_address.clone(),
                            presented_ip: ip.to_string(),
                        }),
                    )
                    .await
                {
                    tracing::error!(error = %e, "Failed to record IP-mismatch event");
                }
                return Ok(None);
            }
        }

        session.last_activity_utc = now;
        self.store.update_session(&session).await?;
        Ok(Some(session))
    }

    /// Idempotent deactivation; the row stays for the audit trail.
    pub async fn invalidate_session(&self, session_id: &str) -> Result<(), ServiceError> {
        self.store.deactivate_session(session_id).await?;
        Ok(())
    }

    /// Deactivate every active session of a user, optionally sparing one
    /// (the caller's own). Returns the number invalidated.
    pub async fn invalidate_all_user_sessions(
        &self,
        user_id: Uuid,
        except_session_id: Option<&str>,
    ) -> Result<u64, ServiceError> {
        let count = self
            .store
            .deactivate_user_sessions(user_id, except_session_id)
            .await?;
        tracing::info!(user_id = %user_id, count, "User sessions invalidated");
        Ok(count)
    }

    /// Slide the expiry forward from now; activity-based renewal.
    pub async fn extend_session(
        &self,
        session_id: &str,
        minutes: i64,
    ) -> Result<Option<SessionSecurity>, ServiceError> {
        let Some(mut session) = self.store.find_session(session_id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        if !session.is_valid_at(now) {
            return Ok(None);
        }
        session.expiry_utc = now + Duration::minutes(minutes);
        self.store.update_session(&session).await?;
        Ok(Some(session))
    }

    /// Mark the session MFA-verified. Irreversible for the session's
    /// remaining lifetime.
    pub async fn verify_mfa_for_session(&self, session_id: &str) -> Result<bool, ServiceError> {
        let Some(mut session) = self.store.find_session(session_id).await? else {
            return Ok(false);
        };
        if !session.is_valid_at(Utc::now()) {
            return Ok(false);
        }
        session.mfa_verified = true;
        self.store.update_session(&session).await?;
        Ok(true)
    }

    /// Advisory heuristic scan over a user's active sessions.
    ///
    /// Flags: more than two distinct bound IPs concurrently active, any
    /// session older than 24 hours, more than three distinct user-agent
    /// strings. Returns the deduplicated union; nothing is invalidated.
    pub async fn detect_suspicious_sessions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<SessionSecurity>, ServiceError> {
        let sessions = self.store.active_sessions_for_user(user_id).await?;
        let now = Utc::now();

        let distinct_ips: HashSet<&str> =
            sessions.iter().map(|s| s.ip_address.as_str()).collect();
        let distinct_agents: HashSet<&str> =
            sessions.iter().map(|s| s.user_agent.as_str()).collect();
        let whole_set_suspicious = distinct_ips.len() > MAX_DISTINCT_IPS
            || distinct_agents.len() > MAX_DISTINCT_USER_AGENTS;

        let mut flagged_ids = HashSet::new();
        let mut flagged = Vec::new();
        for session in sessions {
            let too_old = now - session.created_utc > Duration::hours(MAX_SESSION_AGE_HOURS);
            if (whole_set_suspicious || too_old) && flagged_ids.insert(session.session_id.clone()) {
                flagged.push(session);
            }
        }
        Ok(flagged)
    }

    /// On-demand suspicious-activity check: run the heuristic scan and log a
    /// high-severity event when anything is implicated.
    pub async fn report_suspicious_activity(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<SessionSecurity>, ServiceError> {
        let flagged = self.detect_suspicious_sessions(user_id).await?;
        if !flagged.is_empty() {
            let distinct_ips: HashSet<&str> =
                flagged.iter().map(|s| s.ip_address.as_str()).collect();
            let distinct_agents: HashSet<&str> =
                flagged.iter().map(|s| s.user_agent.as_str()).collect();
            self.audit
                .create_security_event(
                    SecurityEventType::SuspiciousActivity,
                    EventSeverity::High,
                    Some(user_id),
                    None,
                    format!("{} suspicious active sessions detected", flagged.len()),
                    Some(EventDetails::SuspiciousSessions {
                        session_count: flagged.len(),
                        distinct_ips: distinct_ips.len(),
                        distinct_user_agents: distinct_agents.len(),
                    }),
                )
                .await?;
        }
        Ok(flagged)
    }

    /// Bulk-deactivate sessions past expiry; meant for the recurring
    /// maintenance sweep, not the request path.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, ServiceError> {
        let count = self.store.deactivate_expired_sessions(Utc::now()).await?;
        if count > 0 {
            tracing::info!(count, "Expired sessions swept");
        }
        Ok(count)
    }

    pub async fn active_sessions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<SessionSecurity>, ServiceError> {
        Ok(self.store.active_sessions_for_user(user_id).await?)
    }

    /// Profile snapshot (created on first touch) for login policy decisions
    /// such as the per-user timeout override and MFA enrollment state.
    pub async fn profile(&self, user_id: Uuid) -> Result<UserSecurityProfile, ServiceError> {
        ensure_profile(self.store.as_ref(), user_id).await
    }

    /// Stamp a password change and invalidate every other session of the
    /// user; a changed password must not leave old sessions usable.
    pub async fn record_password_change(
        &self,
        user_id: Uuid,
        keep_session_id: Option<&str>,
    ) -> Result<u64, ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;
        profile.password_changed_utc = Some(Utc::now());
        self.store.upsert_profile(&profile).await?;

        let invalidated = self
            .store
            .deactivate_user_sessions(user_id, keep_session_id)
            .await?;
        tracing::info!(user_id = %user_id, invalidated, "Password change recorded");
        Ok(invalidated)
    }
}
