//! Consent management handlers.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use service_core::error::AppError;

use crate::middleware::SecurityContext;
use crate::models::{ConsentPurpose, DataConsent};
use crate::AppState;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GrantConsentRequest {
    pub purpose: ConsentPurpose,
    #[validate(length(min = 1, max = 200))]
    pub legal_basis: Option<String>,
    #[validate(range(min = 1, max = 3650))]
    pub retention_days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsentResponse {
    pub purpose: ConsentPurpose,
    pub legal_basis: String,
    pub granted_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
    pub active: bool,
}

impl From<DataConsent> for ConsentResponse {
    fn from(c: DataConsent) -> Self {
        let active = c.is_active_at(Utc::now());
        Self {
            purpose: c.purpose,
            legal_basis: c.legal_basis,
            granted_utc: c.granted_utc,
            expires_utc: c.granted_utc + chrono::Duration::days(c.retention_days),
            active,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

const DEFAULT_LEGAL_BASIS: &str = "consent";
const DEFAULT_RETENTION_DAYS: i64 = 365;

/// List the caller's consent records, active or not.
///
/// GET /consents (authenticated)
#[utoipa::path(
    get,
    path = "/consents",
    responses(
        (status = 200, description = "Consent records", body = [ConsentResponse]),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Consent"
)]
pub async fn list_consents(
    State(state): State<AppState>,
    context: SecurityContext,
) -> Result<Json<Vec<ConsentResponse>>, AppError> {
    let consents = state
        .consent
        .list_consents(context.user_id)
        .await
        .map_err(AppError::from)?;
    Ok(Json(consents.into_iter().map(ConsentResponse::from).collect()))
}

/// Grant or refresh consent for a purpose.
///
/// POST /consents (authenticated)
#[utoipa::path(
    post,
    path = "/consents",
    request_body = GrantConsentRequest,
    responses(
        (status = 201, description = "Consent granted", body = ConsentResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Consent"
)]
pub async fn grant_consent(
    State(state): State<AppState>,
    context: SecurityContext,
    Json(req): Json<GrantConsentRequest>,
) -> Result<(StatusCode, Json<ConsentResponse>), AppError> {
    req.validate()?;
    let consent = state
        .consent
        .grant_consent(
            context.user_id,
            req.purpose,
            req.legal_basis.as_deref().unwrap_or(DEFAULT_LEGAL_BASIS),
            req.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
        )
        .await
        .map_err(AppError::from)?;
    Ok((StatusCode::CREATED, Json(ConsentResponse::from(consent))))
}

/// Revoke consent for a purpose; revoking absent consent is a no-op.
///
/// DELETE /consents/{purpose} (authenticated)
#[utoipa::path(
    delete,
    path = "/consents/{purpose}",
    params(("purpose" = String, Path, description = "Consent purpose")),
    responses(
        (status = 204, description = "Consent revoked or already absent"),
        (status = 400, description = "Unknown purpose"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Consent"
)]
pub async fn revoke_consent(
    State(state): State<AppState>,
    context: SecurityContext,
    Path(purpose): Path<String>,
) -> Result<StatusCode, AppError> {
    let purpose = ConsentPurpose::parse(&purpose)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown purpose '{}'", purpose)))?;
    state
        .consent
        .revoke_consent(context.user_id, purpose)
        .await
        .map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
