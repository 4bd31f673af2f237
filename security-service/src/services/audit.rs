//! Audit logging with automated risk scoring.
//!
//! Every security-relevant action lands here. High-risk entries additionally
//! synthesize a `suspicious_activity` security event, and critical events
//! produce a durable operator alert.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuditDetails, EventDetails, EventSeverity, RiskLevel, SecurityAction, SecurityAlert,
    SecurityAuditLog, SecurityEvent, SecurityEventType,
};
use crate::store::{AuditLogFilter, SecurityEventFilter, SecurityStore};

use super::{ensure_profile, ServiceError};

/// Failed logins from one IP inside the window that trip the brute-force
/// signal. The signal does not block anything by itself; blocking is the
/// rate limiter's call.
pub const BRUTE_FORCE_THRESHOLD: u64 = 5;
pub const BRUTE_FORCE_WINDOW_MINUTES: i64 = 15;

/// Consumer of critical-severity events.
///
/// The alert row existing is the guarantee; delivery is best-effort.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, alert: &SecurityAlert, event: &SecurityEvent);
}

/// Default sink: surface the alert in the service log.
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn notify(&self, alert: &SecurityAlert, event: &SecurityEvent) {
        tracing::warn!(
            alert_id = %alert.alert_id,
            event_type = %event.event_type.as_str(),
            severity = %event.severity.as_str(),
            description = %event.description,
            "Security alert raised"
        );
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn SecurityStore>,
    alerts: Arc<dyn AlertSink>,
}

/// Risk before factoring in the outcome.
fn base_risk(action: SecurityAction) -> RiskLevel {
    match action {
        SecurityAction::RoleChange
        | SecurityAction::PermissionGrant
        | SecurityAction::PermissionRevoke
        | SecurityAction::DataDeletion
        | SecurityAction::AdminAction
        | SecurityAction::SecurityBreach => RiskLevel::High,
        SecurityAction::MfaDisabled
        | SecurityAction::PasswordChange
        | SecurityAction::DataExport => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

/// Failed actions are always at least medium risk.
pub fn risk_level_for(action: SecurityAction, success: bool) -> RiskLevel {
    let base = base_risk(action);
    if success {
        base
    } else {
        base.max(RiskLevel::Medium)
    }
}

impl AuditLogger {
    pub fn new(store: Arc<dyn SecurityStore>, alerts: Arc<dyn AlertSink>) -> Self {
        Self { store, alerts }
    }

    /// Record a security action, compute its risk level and synthesize a
    /// suspicious-activity event for high-risk entries.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_security_action(
        &self,
        user_id: Option<Uuid>,
        action: SecurityAction,
        resource: impl Into<String>,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
        success: bool,
        details: Option<AuditDetails>,
    ) -> Result<SecurityAuditLog, ServiceError> {
        let risk_level = risk_level_for(action, success);
        let log = SecurityAuditLog {
            log_id: Uuid::new_v4(),
            user_id,
            action,
            resource: resource.into(),
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            success,
            details,
            risk_level,
            created_utc: Utc::now(),
        };
        self.store.insert_audit_log(&log).await?;

        tracing::info!(
            action = %action.as_str(),
            resource = %log.resource,
            success,
            risk_level = %risk_level.as_str(),
            "Security action audited"
        );

        if risk_level >= RiskLevel::High {
            let severity = match risk_level {
                RiskLevel::Critical => EventSeverity::Critical,
                _ => EventSeverity::High,
            };
            self.create_security_event(
                SecurityEventType::SuspiciousActivity,
                severity,
                user_id,
                Some(log.ip_address.clone()),
                format!("High-risk action '{}' on {}", action.as_str(), log.resource),
                Some(EventDetails::HighRiskAction {
                    action: action.as_str().to_string(),
                    risk_level: risk_level.as_str().to_string(),
                }),
            )
            .await?;
        }

        Ok(log)
    }

    /// Record a failed primary login and raise the brute-force signal when
    /// the rolling per-IP window crosses the threshold.
    ///
    /// The event fires exactly when the count reaches the threshold, so a
    /// sustained burst yields one event per rolling window rather than one
    /// per failure.
    pub async fn log_failed_login(
        &self,
        user_id: Option<Uuid>,
        email: &str,
        ip_address: &str,
        user_agent: &str,
        reason: &str,
    ) -> Result<(), ServiceError> {
        self.log_security_action(
            user_id,
            SecurityAction::Login,
            "auth:login",
            ip_address,
            user_agent,
            false,
            Some(AuditDetails::FailedLogin {
                email: email.to_string(),
                reason: reason.to_string(),
            }),
        )
        .await?;

        if let Some(user_id) = user_id {
            let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;
            profile.failed_login_count += 1;
            self.store.upsert_profile(&profile).await?;
        }

        let since = Utc::now() - Duration::minutes(BRUTE_FORCE_WINDOW_MINUTES);
        let failures = self
            .store
            .count_failed_logins_from_ip(ip_address, since)
            .await?;

        if failures == BRUTE_FORCE_THRESHOLD {
            self.create_security_event(
                SecurityEventType::BruteForceAttempt,
                EventSeverity::High,
                None,
                Some(ip_address.to_string()),
                format!(
                    "{} failed logins from {} within {} minutes",
                    failures, ip_address, BRUTE_FORCE_WINDOW_MINUTES
                ),
                Some(EventDetails::BruteForce {
                    failure_count: failures,
                    window_minutes: BRUTE_FORCE_WINDOW_MINUTES,
                }),
            )
            .await?;
        }

        Ok(())
    }

    /// Persist a detected condition; critical severity also writes a durable
    /// alert and pings the sink.
    pub async fn create_security_event(
        &self,
        event_type: SecurityEventType,
        severity: EventSeverity,
        user_id: Option<Uuid>,
        ip_address: Option<String>,
        description: impl Into<String>,
        details: Option<EventDetails>,
    ) -> Result<SecurityEvent, ServiceError> {
        let event = SecurityEvent::new(event_type, severity, user_id, ip_address, description, details);
        self.store.insert_security_event(&event).await?;

        tracing::warn!(
            event_type = %event_type.as_str(),
            severity = %severity.as_str(),
            description = %event.description,
            "Security event recorded"
        );

        if severity == EventSeverity::Critical {
            let alert = SecurityAlert::for_event(&event);
            self.store.insert_alert(&alert).await?;
            self.alerts.notify(&alert, &event).await;
        }

        Ok(event)
    }

    pub async fn get_audit_logs(
        &self,
        filter: &AuditLogFilter,
    ) -> Result<Vec<SecurityAuditLog>, ServiceError> {
        Ok(self.store.find_audit_logs(filter).await?)
    }

    pub async fn get_security_events(
        &self,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        Ok(self.store.find_security_events(filter).await?)
    }

    pub async fn unacknowledged_alerts(
        &self,
        limit: i64,
    ) -> Result<Vec<SecurityAlert>, ServiceError> {
        Ok(self.store.unacknowledged_alerts(limit).await?)
    }

    /// Returns false when the alert does not exist.
    pub async fn acknowledge_alert(&self, alert_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.store.acknowledge_alert(alert_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_actions_are_at_least_medium() {
        assert_eq!(
            risk_level_for(SecurityAction::Login, false),
            RiskLevel::Medium
        );
        assert_eq!(
            risk_level_for(SecurityAction::DataAccess, false),
            RiskLevel::Medium
        );
        // Failure never lowers an already-high base risk.
        assert_eq!(
            risk_level_for(SecurityAction::AdminAction, false),
            RiskLevel::High
        );
    }

    #[test]
    fn high_risk_set_matches_policy() {
        for action in [
            SecurityAction::RoleChange,
            SecurityAction::PermissionGrant,
            SecurityAction::PermissionRevoke,
            SecurityAction::DataDeletion,
            SecurityAction::AdminAction,
            SecurityAction::SecurityBreach,
        ] {
            assert_eq!(risk_level_for(action, true), RiskLevel::High);
        }
        for action in [
            SecurityAction::MfaDisabled,
            SecurityAction::PasswordChange,
            SecurityAction::DataExport,
        ] {
            assert_eq!(risk_level_for(action, true), RiskLevel::Medium);
        }
        assert_eq!(risk_level_for(SecurityAction::Login, true), RiskLevel::Low);
        assert_eq!(risk_level_for(SecurityAction::Logout, true), RiskLevel::Low);
    }
}
