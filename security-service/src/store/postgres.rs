//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::models::{
    AuditDetails, ConsentPurpose, DataConsent, EventDetails, EventSeverity, Permission, RiskLevel,
    Role, SecurityAction, SecurityAlert, SecurityAuditLog, SecurityEvent, SecurityEventType,
    SessionSecurity, UserSecurityProfile,
};

use super::{AuditLogFilter, SecurityEventFilter, SecurityStore, StoreError};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_permissions(raw: Vec<String>) -> Result<Vec<Permission>, StoreError> {
    raw.iter()
        .map(|s| {
            Permission::parse(s)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown permission '{}'", s)))
        })
        .collect()
}

fn permissions_to_strings(permissions: &[Permission]) -> Vec<String> {
    permissions.iter().map(|p| p.as_str().to_string()).collect()
}

fn row_to_profile(row: &PgRow) -> Result<UserSecurityProfile, StoreError> {
    let role_code: String = row.try_get("role")?;
    let role = Role::parse(&role_code)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown role '{}'", role_code)))?;
    Ok(UserSecurityProfile {
        user_id: row.try_get("user_id")?,
        role,
        explicit_permissions: parse_permissions(row.try_get("explicit_permissions")?)?,
        denied_permissions: parse_permissions(row.try_get("denied_permissions")?)?,
        mfa_enabled: row.try_get("mfa_enabled")?,
        mfa_secret: row.try_get("mfa_secret")?,
        backup_code_hashes: row.try_get("backup_code_hashes")?,
        failed_login_count: row.try_get("failed_login_count")?,
        last_login_utc: row.try_get("last_login_utc")?,
        password_changed_utc: row.try_get("password_changed_utc")?,
        session_timeout_minutes: row.try_get("session_timeout_minutes")?,
        created_utc: row.try_get("created_utc")?,
        anonymized_utc: row.try_get("anonymized_utc")?,
    })
}

fn row_to_audit_log(row: &PgRow) -> Result<SecurityAuditLog, StoreError> {
    let action_code: String = row.try_get("action")?;
    let action = SecurityAction::parse(&action_code)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown action '{}'", action_code)))?;
    let risk_code: String = row.try_get("risk_level")?;
    let risk_level = RiskLevel::parse(&risk_code)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown risk level '{}'", risk_code)))?;
    let details: Option<serde_json::Value> = row.try_get("details")?;
    let details: Option<AuditDetails> = details.map(serde_json::from_value).transpose()?;
    Ok(SecurityAuditLog {
        log_id: row.try_get("log_id")?,
        user_id: row.try_get("user_id")?,
        action,
        resource: row.try_get("resource")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        success: row.try_get("success")?,
        details,
        risk_level,
        created_utc: row.try_get("created_utc")?,
    })
}

fn row_to_event(row: &PgRow) -> Result<SecurityEvent, StoreError> {
    let type_code: String = row.try_get("event_type")?;
    let event_type = SecurityEventType::parse(&type_code)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown event type '{}'", type_code)))?;
    let severity_code: String = row.try_get("severity")?;
    let severity = EventSeverity::parse(&severity_code)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown severity '{}'", severity_code)))?;
    let details: Option<serde_json::Value> = row.try_get("details")?;
    let details: Option<EventDetails> = details.map(serde_json::from_value).transpose()?;
    Ok(SecurityEvent {
        event_id: row.try_get("event_id")?,
        event_type,
        severity,
        user_id: row.try_get("user_id")?,
        ip_address: row.try_get("ip_address")?,
        description: row.try_get("description")?,
        details,
        resolved: row.try_get("resolved")?,
        created_utc: row.try_get("created_utc")?,
    })
}

fn row_to_alert(row: &PgRow) -> Result<SecurityAlert, StoreError> {
    let severity_code: String = row.try_get("severity")?;
    let severity = EventSeverity::parse(&severity_code)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown severity '{}'", severity_code)))?;
    Ok(SecurityAlert {
        alert_id: row.try_get("alert_id")?,
        event_id: row.try_get("event_id")?,
        severity,
        summary: row.try_get("summary")?,
        acknowledged: row.try_get("acknowledged")?,
        created_utc: row.try_get("created_utc")?,
        acknowledged_utc: row.try_get("acknowledged_utc")?,
    })
}

fn row_to_consent(row: &PgRow) -> Result<DataConsent, StoreError> {
    let purpose_code: String = row.try_get("purpose")?;
    let purpose = ConsentPurpose::parse(&purpose_code)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown purpose '{}'", purpose_code)))?;
    Ok(DataConsent {
        consent_id: row.try_get("consent_id")?,
        user_id: row.try_get("user_id")?,
        purpose,
        legal_basis: row.try_get("legal_basis")?,
        retention_days: row.try_get("retention_days")?,
        granted_utc: row.try_get("granted_utc")?,
        revoked_utc: row.try_get("revoked_utc")?,
    })
}

#[async_trait]
impl SecurityStore for PgStore {
    // ==================== Profiles ====================

    async fn find_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserSecurityProfile>, StoreError> {
        let row = sqlx::query("SELECT * FROM user_security_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_profile).transpose()
    }

    async fn upsert_profile(&self, profile: &UserSecurityProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_security_profiles (
                user_id, role, explicit_permissions, denied_permissions,
                mfa_enabled, mfa_secret, backup_code_hashes, failed_login_count,
                last_login_utc, password_changed_utc, session_timeout_minutes,
                created_utc, anonymized_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (user_id) DO UPDATE SET
                role = EXCLUDED.role,
                explicit_permissions = EXCLUDED.explicit_permissions,
                denied_permissions = EXCLUDED.denied_permissions,
                mfa_enabled = EXCLUDED.mfa_enabled,
                mfa_secret = EXCLUDED.mfa_secret,
                backup_code_hashes = EXCLUDED.backup_code_hashes,
                failed_login_count = EXCLUDED.failed_login_count,
                last_login_utc = EXCLUDED.last_login_utc,
                password_changed_utc = EXCLUDED.password_changed_utc,
                session_timeout_minutes = EXCLUDED.session_timeout_minutes,
                anonymized_utc = EXCLUDED.anonymized_utc
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.role.as_str())
        .bind(permissions_to_strings(&profile.explicit_permissions))
        .bind(permissions_to_strings(&profile.denied_permissions))
        .bind(profile.mfa_enabled)
        .bind(&profile.mfa_secret)
        .bind(&profile.backup_code_hashes)
        .bind(profile.failed_login_count)
        .bind(profile.last_login_utc)
        .bind(profile.password_changed_utc)
        .bind(profile.session_timeout_minutes)
        .bind(profile.created_utc)
        .bind(profile.anonymized_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &SessionSecurity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO security_sessions (
                session_id, user_id, ip_address, user_agent,
                created_utc, last_activity_utc, expiry_utc, active, mfa_verified
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.user_id)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_utc)
        .bind(session.last_activity_utc)
        .bind(session.expiry_utc)
        .bind(session.active)
        .bind(session.mfa_verified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<SessionSecurity>, StoreError> {
        let session = sqlx::query_as::<_, SessionSecurity>(
            "SELECT * FROM security_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn update_session(&self, session: &SessionSecurity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE security_sessions SET
                last_activity_utc = $2,
                expiry_utc = $3,
                active = $4,
                mfa_verified = $5
            WHERE session_id = $1
            "#,
        )
        .bind(&session.session_id)
        .bind(session.last_activity_utc)
        .bind(session.expiry_utc)
        .bind(session.active)
        .bind(session.mfa_verified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn active_sessions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<SessionSecurity>, StoreError> {
        let sessions = sqlx::query_as::<_, SessionSecurity>(
            r#"
            SELECT * FROM security_sessions
            WHERE user_id = $1 AND active = TRUE
            ORDER BY created_utc DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn deactivate_session(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE security_sessions SET active = FALSE WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_user_sessions(
        &self,
        user_id: Uuid,
        except_session_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE security_sessions SET active = FALSE
            WHERE user_id = $1 AND active = TRUE
              AND ($2::text IS NULL OR session_id <> $2)
            "#,
        )
        .bind(user_id)
        .bind(except_session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn deactivate_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE security_sessions SET active = FALSE WHERE active = TRUE AND expiry_utc <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn scrub_session_pii(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE security_sessions
            SET ip_address = '', user_agent = '', active = FALSE
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ==================== Audit logs ====================

    async fn insert_audit_log(&self, log: &SecurityAuditLog) -> Result<(), StoreError> {
        let details = log.details.as_ref().map(serde_json::to_value).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO security_audit_logs (
                log_id, user_id, action, resource, ip_address, user_agent,
                success, details, risk_level, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(log.log_id)
        .bind(log.user_id)
        .bind(log.action.as_str())
        .bind(&log.resource)
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .bind(log.success)
        .bind(details)
        .bind(log.risk_level.as_str())
        .bind(log.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_audit_logs(
        &self,
        filter: &AuditLogFilter,
    ) -> Result<Vec<SecurityAuditLog>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM security_audit_logs
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR action = $2)
            ORDER BY created_utc DESC
            LIMIT $3
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.action.map(|a| a.as_str()))
        .bind(filter.limit.unwrap_or(100))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_audit_log).collect()
    }

    async fn count_failed_logins_from_ip(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM security_audit_logs
            WHERE action = 'login' AND success = FALSE
              AND ip_address = $1 AND created_utc >= $2
            "#,
        )
        .bind(ip_address)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn purge_audit_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM security_audit_logs WHERE created_utc < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ==================== Security events & alerts ====================

    async fn insert_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError> {
        let details = event.details.as_ref().map(serde_json::to_value).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO security_events (
                event_id, event_type, severity, user_id, ip_address,
                description, details, resolved, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.event_id)
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(event.user_id)
        .bind(&event.ip_address)
        .bind(&event.description)
        .bind(details)
        .bind(event.resolved)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_security_events(
        &self,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM security_events
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR event_type = $2)
              AND ($3::text IS NULL OR severity = $3)
            ORDER BY created_utc DESC
            LIMIT $4
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.event_type.map(|t| t.as_str()))
        .bind(filter.severity.map(|s| s.as_str()))
        .bind(filter.limit.unwrap_or(100))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    async fn purge_security_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM security_events WHERE created_utc < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_alert(&self, alert: &SecurityAlert) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO security_alerts (
                alert_id, event_id, severity, summary,
                acknowledged, created_utc, acknowledged_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(alert.alert_id)
        .bind(alert.event_id)
        .bind(alert.severity.as_str())
        .bind(&alert.summary)
        .bind(alert.acknowledged)
        .bind(alert.created_utc)
        .bind(alert.acknowledged_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn acknowledge_alert(&self, alert_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE security_alerts
            SET acknowledged = TRUE, acknowledged_utc = NOW()
            WHERE alert_id = $1 AND acknowledged = FALSE
            "#,
        )
        .bind(alert_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // Distinguish "absent" from "already acknowledged".
        let exists: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM security_alerts WHERE alert_id = $1")
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(exists.is_some())
    }

    async fn unacknowledged_alerts(&self, limit: i64) -> Result<Vec<SecurityAlert>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM security_alerts
            WHERE acknowledged = FALSE
            ORDER BY created_utc DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_alert).collect()
    }

    // ==================== Consents ====================

    async fn upsert_consent(&self, consent: &DataConsent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO data_consents (
                consent_id, user_id, purpose, legal_basis,
                retention_days, granted_utc, revoked_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, purpose) DO UPDATE SET
                consent_id = EXCLUDED.consent_id,
                legal_basis = EXCLUDED.legal_basis,
                retention_days = EXCLUDED.retention_days,
                granted_utc = EXCLUDED.granted_utc,
                revoked_utc = EXCLUDED.revoked_utc
            "#,
        )
        .bind(consent.consent_id)
        .bind(consent.user_id)
        .bind(consent.purpose.as_str())
        .bind(&consent.legal_basis)
        .bind(consent.retention_days)
        .bind(consent.granted_utc)
        .bind(consent.revoked_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_consent(
        &self,
        user_id: Uuid,
        purpose: ConsentPurpose,
    ) -> Result<Option<DataConsent>, StoreError> {
        let row = sqlx::query("SELECT * FROM data_consents WHERE user_id = $1 AND purpose = $2")
            .bind(user_id)
            .bind(purpose.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_consent).transpose()
    }

    async fn consents_for_user(&self, user_id: Uuid) -> Result<Vec<DataConsent>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM data_consents WHERE user_id = $1 ORDER BY granted_utc DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_consent).collect()
    }

    async fn revoke_consent(
        &self,
        user_id: Uuid,
        purpose: ConsentPurpose,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE data_consents SET revoked_utc = NOW()
            WHERE user_id = $1 AND purpose = $2 AND revoked_utc IS NULL
            "#,
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Health ====================

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
