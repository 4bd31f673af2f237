//! Security event and alert models - detected conditions, not user actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Detected security condition types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    /// Burst of failed logins from one source
    BruteForceAttempt,
    /// Suspicious session pattern detected
    SuspiciousActivity,
    /// Attempted access without the required capability
    UnauthorizedAccess,
    /// Behavior outside the user's established pattern
    AnomalousBehavior,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::BruteForceAttempt => "brute_force_attempt",
            SecurityEventType::SuspiciousActivity => "suspicious_activity",
            SecurityEventType::UnauthorizedAccess => "unauthorized_access",
            SecurityEventType::AnomalousBehavior => "anomalous_behavior",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "brute_force_attempt" => Some(SecurityEventType::BruteForceAttempt),
            "suspicious_activity" => Some(SecurityEventType::SuspiciousActivity),
            "unauthorized_access" => Some(SecurityEventType::UnauthorizedAccess),
            "anomalous_behavior" => Some(SecurityEventType::AnomalousBehavior),
            _ => None,
        }
    }
}

/// Event severity. `Critical` additionally produces a [`SecurityAlert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Low => "low",
            EventSeverity::Medium => "medium",
            EventSeverity::High => "high",
            EventSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(EventSeverity::Low),
            "medium" => Some(EventSeverity::Medium),
            "high" => Some(EventSeverity::High),
            "critical" => Some(EventSeverity::Critical),
            _ => None,
        }
    }
}

/// Structured metadata per event type; closed like [`super::AuditDetails`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetails {
    BruteForce {
        failure_count: u64,
        window_minutes: i64,
    },
    SuspiciousSessions {
        session_count: usize,
        distinct_ips: usize,
        distinct_user_agents: usize,
    },
    IpMismatch {
        bound_ip: String,
        presented_ip: String,
    },
    RateLimitExceeded {
        path: String,
        limit: u32,
        window_minutes: i64,
    },
    HighRiskAction {
        action: String,
        risk_level: String,
    },
}

/// Detected security condition.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SecurityEvent {
    pub event_id: Uuid,
    pub event_type: SecurityEventType,
    pub severity: EventSeverity,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub description: String,
    pub details: Option<EventDetails>,
    pub resolved: bool,
    pub created_utc: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        event_type: SecurityEventType,
        severity: EventSeverity,
        user_id: Option<Uuid>,
        ip_address: Option<String>,
        description: impl Into<String>,
        details: Option<EventDetails>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            severity,
            user_id,
            ip_address,
            description: description.into(),
            details,
            resolved: false,
            created_utc: Utc::now(),
        }
    }
}

/// Durable operator-facing record for a critical event.
///
/// Fire-and-forget: the record existing is the guarantee, delivery through
/// any alerting sink is best-effort.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SecurityAlert {
    pub alert_id: Uuid,
    pub event_id: Uuid,
    pub severity: EventSeverity,
    pub summary: String,
    pub acknowledged: bool,
    pub created_utc: DateTime<Utc>,
    pub acknowledged_utc: Option<DateTime<Utc>>,
}

impl SecurityAlert {
    pub fn for_event(event: &SecurityEvent) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            event_id: event.event_id,
            severity: event.severity,
            summary: event.description.clone(),
            acknowledged: false,
            created_utc: Utc::now(),
            acknowledged_utc: None,
        }
    }
}
