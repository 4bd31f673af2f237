//! Data consent management.
//!
//! Consent is time-bounded: active only while unrevoked and inside its
//! retention window. Expired consent reads as absent, never as an error.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ConsentPurpose, DataConsent};
use crate::store::SecurityStore;

use super::ServiceError;

#[derive(Clone)]
pub struct ConsentService {
    store: Arc<dyn SecurityStore>,
}

impl ConsentService {
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        Self { store }
    }

    /// Grant (or refresh) consent for a purpose. Re-granting restarts the
    /// retention window.
    pub async fn grant_consent(
        &self,
        user_id: Uuid,
        purpose: ConsentPurpose,
        legal_basis: &str,
        retention_days: i64,
    ) -> Result<DataConsent, ServiceError> {
        if retention_days <= 0 {
            return Err(ServiceError::Validation(
                "retention_days must be positive".to_string(),
            ));
        }
        let consent = DataConsent::new(user_id, purpose, legal_basis, retention_days);
        self.store.upsert_consent(&consent).await?;
        tracing::info!(user_id = %user_id, purpose = %purpose, "Consent granted");
        Ok(consent)
    }

    /// Returns false when there was no unrevoked consent to revoke.
    pub async fn revoke_consent(
        &self,
        user_id: Uuid,
        purpose: ConsentPurpose,
    ) -> Result<bool, ServiceError> {
        let revoked = self.store.revoke_consent(user_id, purpose).await?;
        if revoked {
            tracing::info!(user_id = %user_id, purpose = %purpose, "Consent revoked");
        }
        Ok(revoked)
    }

    /// The active consent record for a purpose, if any.
    pub async fn active_consent(
        &self,
        user_id: Uuid,
        purpose: ConsentPurpose,
    ) -> Result<Option<DataConsent>, ServiceError> {
        let consent = self.store.find_consent(user_id, purpose).await?;
        Ok(consent.filter(|c| c.is_active_at(Utc::now())))
    }

    pub async fn list_consents(&self, user_id: Uuid) -> Result<Vec<DataConsent>, ServiceError> {
        Ok(self.store.consents_for_user(user_id).await?)
    }
}
