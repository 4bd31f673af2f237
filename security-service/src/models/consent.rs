//! Data consent model - time-bounded, per-purpose processing authorization.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Processing purposes a user can consent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsentPurpose {
    Marketing,
    Analytics,
    Personalization,
    LegalCompliance,
    DataProcessing,
}

impl ConsentPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentPurpose::Marketing => "marketing",
            ConsentPurpose::Analytics => "analytics",
            ConsentPurpose::Personalization => "personalization",
            ConsentPurpose::LegalCompliance => "legal_compliance",
            ConsentPurpose::DataProcessing => "data_processing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "marketing" => Some(ConsentPurpose::Marketing),
            "analytics" => Some(ConsentPurpose::Analytics),
            "personalization" => Some(ConsentPurpose::Personalization),
            "legal_compliance" => Some(ConsentPurpose::LegalCompliance),
            "data_processing" => Some(ConsentPurpose::DataProcessing),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConsentPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consent grant record.
///
/// A consent is active only while unrevoked and inside its retention window;
/// an expired or revoked consent reads as absent, never as an error.
#[derive(Debug, Clone)]
pub struct DataConsent {
    pub consent_id: Uuid,
    pub user_id: Uuid,
    pub purpose: ConsentPurpose,
    pub legal_basis: String,
    pub retention_days: i64,
    pub granted_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
}

impl DataConsent {
    pub fn new(
        user_id: Uuid,
        purpose: ConsentPurpose,
        legal_basis: impl Into<String>,
        retention_days: i64,
    ) -> Self {
        Self {
            consent_id: Uuid::new_v4(),
            user_id,
            purpose,
            legal_basis: legal_basis.into(),
            retention_days,
            granted_utc: Utc::now(),
            revoked_utc: None,
        }
    }

    pub fn expires_utc(&self) -> DateTime<Utc> {
        self.granted_utc + Duration::days(self.retention_days)
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_utc.is_none() && now < self.expires_utc()
    }
}
