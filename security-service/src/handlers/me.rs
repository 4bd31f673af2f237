//! Caller-facing profile routes.

use axum::extract::{Json, State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use service_core::error::AppError;

use crate::middleware::SecurityContext;
use crate::models::{Permission, Role, SecurityAction, SessionInfo};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub mfa_verified: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsentSummary {
    pub purpose: String,
    pub legal_basis: String,
    pub granted_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
    pub active: bool,
}

/// Everything the subsystem holds about the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct DataExportResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub mfa_enabled: bool,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub sessions: Vec<SessionInfo>,
    pub consents: Vec<ConsentSummary>,
    pub exported_utc: DateTime<Utc>,
}

/// The caller's resolved security context.
///
/// GET /me (authenticated)
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current security context", body = MeResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Profile"
)]
pub async fn get_me(context: SecurityContext) -> Json<MeResponse> {
    let mut permissions: Vec<Permission> = context.permissions.iter().copied().collect();
    permissions.sort_by_key(|p| p.as_str());
    Json(MeResponse {
        user_id: context.user_id,
        role: context.role,
        permissions,
        mfa_verified: context.mfa_verified,
    })
}

/// Export the caller's security data; requires active data-processing
/// consent and is audited as a data export.
///
/// GET /me/export (authenticated + consent)
#[utoipa::path(
    get,
    path = "/me/export",
    responses(
        (status = 200, description = "Security data export", body = DataExportResponse),
        (status = 401, description = "Not authenticated"),
        (status = 451, description = "Consent missing or expired")
    ),
    tag = "Profile"
)]
pub async fn export_data(
    State(state): State<AppState>,
    context: SecurityContext,
) -> Result<Json<DataExportResponse>, AppError> {
    let now = Utc::now();
    let profile = state
        .sessions
        .profile(context.user_id)
        .await
        .map_err(AppError::from)?;
    let sessions = state
        .sessions
        .active_sessions(context.user_id)
        .await
        .map_err(AppError::from)?;
    let consents = state
        .consent
        .list_consents(context.user_id)
        .await
        .map_err(AppError::from)?;

    if let Err(e) = state
        .audit
        .log_security_action(
            Some(context.user_id),
            SecurityAction::DataExport,
            format!("user:{}", context.user_id),
            context.audit_ip(),
            context.audit_user_agent(),
            true,
            None,
        )
        .await
    {
        tracing::error!(error = %e, "Failed to audit data export");
    }

    Ok(Json(DataExportResponse {
        user_id: context.user_id,
        role: profile.role,
        mfa_enabled: profile.mfa_enabled,
        last_login_utc: profile.last_login_utc,
        sessions: sessions
            .into_iter()
            .map(|s| {
                let is_current = s.session_id == context.session_id;
                let mut info = SessionInfo::from(s);
                info.is_current = is_current;
                info
            })
            .collect(),
        consents: consents
            .into_iter()
            .map(|c| ConsentSummary {
                purpose: c.purpose.as_str().to_string(),
                legal_basis: c.legal_basis.clone(),
                granted_utc: c.granted_utc,
                expires_utc: c.expires_utc(),
                active: c.is_active_at(now),
            })
            .collect(),
        exported_utc: now,
    }))
}
