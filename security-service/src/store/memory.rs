//! In-memory store backing tests and local development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    ConsentPurpose, DataConsent, SecurityAlert, SecurityAuditLog, SecurityEvent, SessionSecurity,
    UserSecurityProfile,
};

use super::{AuditLogFilter, SecurityEventFilter, SecurityStore, StoreError};

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, UserSecurityProfile>,
    sessions: HashMap<String, SessionSecurity>,
    audit_logs: Vec<SecurityAuditLog>,
    events: Vec<SecurityEvent>,
    alerts: Vec<SecurityAlert>,
    consents: HashMap<(Uuid, ConsentPurpose), DataConsent>,
}

/// Behaviourally equivalent to [`super::PgStore`], minus persistence.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecurityStore for MemoryStore {
    async fn find_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserSecurityProfile>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &UserSecurityProfile) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn insert_session(&self, session: &SessionSecurity) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<SessionSecurity>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.sessions.get(session_id).cloned())
    }

    async fn update_session(&self, session: &SessionSecurity) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn active_sessions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<SessionSecurity>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut sessions: Vec<SessionSecurity> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.active)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(sessions)
    }

    async fn deactivate_session(&self, session_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.active = false;
        }
        Ok(())
    }

    async fn deactivate_user_sessions(
        &self,
        user_id: Uuid,
        except_session_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0;
        for session in inner.sessions.values_mut() {
            if session.user_id == user_id
                && session.active
                && except_session_id != Some(session.session_id.as_str())
            {
                session.active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn deactivate_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0;
        for session in inner.sessions.values_mut() {
            if session.active && session.expiry_utc <= now {
                session.active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn scrub_session_pii(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0;
        for session in inner.sessions.values_mut() {
            if session.user_id == user_id {
                session.ip_address = String::new();
                session.user_agent = String::new();
                session.active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert_audit_log(&self, log: &SecurityAuditLog) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.audit_logs.push(log.clone());
        Ok(())
    }

    async fn find_audit_logs(
        &self,
        filter: &AuditLogFilter,
    ) -> Result<Vec<SecurityAuditLog>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut logs: Vec<SecurityAuditLog> = inner
            .audit_logs
            .iter()
            .filter(|log| {
                filter.user_id.map_or(true, |u| log.user_id == Some(u))
                    && filter.action.map_or(true, |a| log.action == a)
            })
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        if let Some(limit) = filter.limit {
            logs.truncate(limit.max(0) as usize);
        }
        Ok(logs)
    }

    async fn count_failed_logins_from_ip(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .audit_logs
            .iter()
            .filter(|log| {
                log.action == crate::models::SecurityAction::Login
                    && !log.success
                    && log.ip_address == ip_address
                    && log.created_utc >= since
            })
            .count() as u64)
    }

    async fn purge_audit_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.audit_logs.len();
        inner.audit_logs.retain(|log| log.created_utc >= cutoff);
        Ok((before - inner.audit_logs.len()) as u64)
    }

    async fn insert_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.events.push(event.clone());
        Ok(())
    }

    async fn find_security_events(
        &self,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut events: Vec<SecurityEvent> = inner
            .events
            .iter()
            .filter(|event| {
                filter.user_id.map_or(true, |u| event.user_id == Some(u))
                    && filter.event_type.map_or(true, |t| event.event_type == t)
                    && filter.severity.map_or(true, |s| event.severity == s)
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        if let Some(limit) = filter.limit {
            events.truncate(limit.max(0) as usize);
        }
        Ok(events)
    }

    async fn purge_security_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.events.len();
        inner.events.retain(|event| event.created_utc >= cutoff);
        Ok((before - inner.events.len()) as u64)
    }

    async fn insert_alert(&self, alert: &SecurityAlert) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.alerts.push(alert.clone());
        Ok(())
    }

    async fn acknowledge_alert(&self, alert_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap();
        match inner.alerts.iter_mut().find(|a| a.alert_id == alert_id) {
            Some(alert) => {
                if !alert.acknowledged {
                    alert.acknowledged = true;
                    alert.acknowledged_utc = Some(Utc::now());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unacknowledged_alerts(&self, limit: i64) -> Result<Vec<SecurityAlert>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut alerts: Vec<SecurityAlert> = inner
            .alerts
            .iter()
            .filter(|a| !a.acknowledged)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        alerts.truncate(limit.max(0) as usize);
        Ok(alerts)
    }

    async fn upsert_consent(&self, consent: &DataConsent) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner
            .consents
            .insert((consent.user_id, consent.purpose), consent.clone());
        Ok(())
    }

    async fn find_consent(
        &self,
        user_id: Uuid,
        purpose: ConsentPurpose,
    ) -> Result<Option<DataConsent>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.consents.get(&(user_id, purpose)).cloned())
    }

    async fn consents_for_user(&self, user_id: Uuid) -> Result<Vec<DataConsent>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut consents: Vec<DataConsent> = inner
            .consents
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        consents.sort_by(|a, b| b.granted_utc.cmp(&a.granted_utc));
        Ok(consents)
    }

    async fn revoke_consent(
        &self,
        user_id: Uuid,
        purpose: ConsentPurpose,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap();
        match inner.consents.get_mut(&(user_id, purpose)) {
            Some(consent) if consent.revoked_utc.is_none() => {
                consent.revoked_utc = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
