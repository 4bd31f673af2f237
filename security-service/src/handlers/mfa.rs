//! MFA enrollment and challenge handlers.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use service_core::error::AppError;

use crate::middleware::SecurityContext;
use crate::models::MfaMethod;
use crate::AppState;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MfaSetupRequest {
    /// Account label shown in the authenticator app; defaults to the user id.
    #[validate(length(min = 1, max = 120))]
    pub account_label: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MfaSetupResponse {
    pub secret_base32: String,
    pub provisioning_uri: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MfaEnableRequest {
    #[validate(length(min = 16, max = 128))]
    pub secret_base32: String,
    #[validate(length(min = 6, max = 8))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BackupCodesResponse {
    /// Single-use codes; shown exactly once.
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MfaChallengeRequest {
    #[validate(length(min = 6, max = 16))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MfaChallengeResponse {
    pub verified: bool,
    pub method: MfaMethod,
}

// ============================================================================
// Handlers
// ============================================================================

/// Generate enrollment material. Nothing is stored until the first code
/// verifies on enable.
///
/// POST /auth/mfa/setup (authenticated)
#[utoipa::path(
    post,
    path = "/auth/mfa/setup",
    request_body = MfaSetupRequest,
    responses(
        (status = 200, description = "Enrollment material", body = MfaSetupResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "MFA"
)]
pub async fn setup(
    State(state): State<AppState>,
    context: SecurityContext,
    Json(req): Json<MfaSetupRequest>,
) -> Result<Json<MfaSetupResponse>, AppError> {
    req.validate()?;
    let label = req
        .account_label
        .unwrap_or_else(|| context.user_id.to_string());

    let enrollment = state.mfa.generate_enrollment(&label);
    Ok(Json(MfaSetupResponse {
        secret_base32: enrollment.secret_base32,
        provisioning_uri: enrollment.provisioning_uri,
    }))
}

/// Enable MFA after the user proves possession of the secret. Returns the
/// one-time backup codes.
///
/// POST /auth/mfa/enable (authenticated)
#[utoipa::path(
    post,
    path = "/auth/mfa/enable",
    request_body = MfaEnableRequest,
    responses(
        (status = 200, description = "MFA enabled", body = BackupCodesResponse),
        (status = 401, description = "Code rejected"),
        (status = 409, description = "Already enabled")
    ),
    tag = "MFA"
)]
pub async fn enable(
    State(state): State<AppState>,
    context: SecurityContext,
    Json(req): Json<MfaEnableRequest>,
) -> Result<Json<BackupCodesResponse>, AppError> {
    req.validate()?;

    let backup_codes = state
        .mfa
        .enable_mfa(
            context.user_id,
            &req.secret_base32,
            &req.code,
            &context.audit_ip(),
            &context.audit_user_agent(),
        )
        .await
        .map_err(AppError::from)?;

    Ok(Json(BackupCodesResponse { backup_codes }))
}

/// Verify a TOTP or backup code and mark the session MFA-verified.
///
/// POST /auth/mfa/challenge (authenticated)
#[utoipa::path(
    post,
    path = "/auth/mfa/challenge",
    request_body = MfaChallengeRequest,
    responses(
        (status = 200, description = "Challenge passed", body = MfaChallengeResponse),
        (status = 401, description = "Code rejected"),
        (status = 429, description = "Rate limited")
    ),
    tag = "MFA"
)]
pub async fn challenge(
    State(state): State<AppState>,
    context: SecurityContext,
    Json(req): Json<MfaChallengeRequest>,
) -> Result<Json<MfaChallengeResponse>, AppError> {
    req.validate()?;

    let method = state
        .mfa
        .verify_challenge(
            context.user_id,
            &req.code,
            &context.audit_ip(),
            &context.audit_user_agent(),
        )
        .await
        .map_err(AppError::from)?;

    state
        .sessions
        .verify_mfa_for_session(&context.session_id)
        .await
        .map_err(AppError::from)?;

    Ok(Json(MfaChallengeResponse {
        verified: true,
        method,
    }))
}

/// Disable MFA; requires a fully MFA-verified session.
///
/// POST /auth/mfa/disable (authenticated + MFA)
#[utoipa::path(
    post,
    path = "/auth/mfa/disable",
    responses(
        (status = 204, description = "MFA disabled"),
        (status = 401, description = "MFA verification required")
    ),
    tag = "MFA"
)]
pub async fn disable(
    State(state): State<AppState>,
    context: SecurityContext,
) -> Result<StatusCode, AppError> {
    state
        .mfa
        .disable_mfa(
            context.user_id,
            &context.audit_ip(),
            &context.audit_user_agent(),
        )
        .await
        .map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the outstanding backup codes.
///
/// POST /auth/mfa/backup-codes (authenticated + MFA)
#[utoipa::path(
    post,
    path = "/auth/mfa/backup-codes",
    responses(
        (status = 200, description = "Fresh backup codes", body = BackupCodesResponse),
        (status = 401, description = "MFA verification required")
    ),
    tag = "MFA"
)]
pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    context: SecurityContext,
) -> Result<Json<BackupCodesResponse>, AppError> {
    let backup_codes = state
        .mfa
        .regenerate_backup_codes(context.user_id)
        .await
        .map_err(AppError::from)?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}
