//! Session lifecycle handlers.
//!
//! Primary credential verification happens in the outer application; it
//! reports outcomes here over the internal-key routes. Everything else is
//! driven by the authenticated session itself.

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use service_core::error::AppError;

use crate::middleware::{SecurityContext, SESSION_COOKIE};
use crate::models::{AuditDetails, RiskLevel, SecurityAction, SessionInfo};
use crate::AppState;

use super::client_meta;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to open a session for a user whose credentials the caller has
/// already verified.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSessionRequest {
    pub user_id: Uuid,
    /// Extends the session to the configured remember-me lifetime.
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub expiry_utc: DateTime<Utc>,
    /// True when the user has MFA enrolled and still has to pass a
    /// challenge before MFA-guarded routes open up.
    pub mfa_required: bool,
}

/// Failed primary-login report.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginFailureRequest {
    pub user_id: Option<Uuid>,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub reason: String,
}

/// Password-change report from the outer application.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordChangeRequest {
    pub user_id: Uuid,
    /// Session to keep alive (the one the change was made from); every
    /// other session of the user is invalidated.
    pub keep_session_id: Option<String>,
}

/// Generic security-action report for actions performed outside this
/// service (data access, exports, admin actions, detected breaches).
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordActionRequest {
    pub user_id: Option<Uuid>,
    pub action: SecurityAction,
    #[validate(length(min = 1, max = 300))]
    pub resource: String,
    pub success: bool,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordActionResponse {
    pub risk_level: RiskLevel,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutAllResponse {
    pub invalidated: u64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ExtendSessionRequest {
    /// New lifetime from now; defaults to the remember-me lifetime.
    #[validate(range(min = 1, max = 43200))]
    pub minutes: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExtendSessionResponse {
    pub expiry_utc: DateTime<Utc>,
}

// ============================================================================
// Handlers
// ============================================================================

fn session_cookie(session_id: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, session_id);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie
}

/// Open a session after successful primary authentication.
///
/// POST /internal/sessions (internal key)
#[utoipa::path(
    post,
    path = "/internal/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 401, description = "Missing or invalid service key"),
        (status = 429, description = "Rate limited")
    ),
    security(("internal_api_key" = [])),
    tag = "Sessions"
)]
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, CookieJar, Json<CreateSessionResponse>), AppError> {
    req.validate()?;
    let (ip, user_agent) = client_meta(&headers);

    let profile = state.sessions.profile(req.user_id).await.map_err(AppError::from)?;
    let timeout_minutes = profile.session_timeout_minutes.unwrap_or(if req.remember_me {
        state.config.security.extended_session_minutes
    } else {
        state.config.security.session_timeout_minutes
    });

    let session = state
        .sessions
        .create_session(req.user_id, &ip, &user_agent, timeout_minutes)
        .await
        .map_err(AppError::from)?;

    if let Err(e) = state
        .audit
        .log_security_action(
            Some(req.user_id),
            SecurityAction::Login,
            "auth:login",
            &ip,
            &user_agent,
            true,
            None,
        )
        .await
    {
        tracing::error!(error = %e, "Failed to audit login");
    }

    let response = CreateSessionResponse {
        session_id: session.session_id.clone(),
        expiry_utc: session.expiry_utc,
        mfa_required: profile.mfa_enabled,
    };
    let jar = jar.add(session_cookie(session.session_id));
    Ok((StatusCode::CREATED, jar, Json(response)))
}

/// Record a failed primary login; feeds brute-force detection.
///
/// POST /internal/login-failures (internal key)
#[utoipa::path(
    post,
    path = "/internal/login-failures",
    request_body = LoginFailureRequest,
    responses(
        (status = 204, description = "Failure recorded"),
        (status = 401, description = "Missing or invalid service key")
    ),
    security(("internal_api_key" = [])),
    tag = "Sessions"
)]
pub async fn record_login_failure(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginFailureRequest>,
) -> Result<StatusCode, AppError> {
    req.validate()?;
    let (ip, user_agent) = client_meta(&headers);

    state
        .audit
        .log_failed_login(req.user_id, &req.email, &ip, &user_agent, &req.reason)
        .await
        .map_err(AppError::from)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Record a password change: stamp the profile, audit, and invalidate
/// every other session of the user.
///
/// POST /internal/password-changes (internal key)
#[utoipa::path(
    post,
    path = "/internal/password-changes",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password change recorded"),
        (status = 401, description = "Missing or invalid service key")
    ),
    security(("internal_api_key" = [])),
    tag = "Sessions"
)]
pub async fn record_password_change(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PasswordChangeRequest>,
) -> Result<StatusCode, AppError> {
    req.validate()?;
    let (ip, user_agent) = client_meta(&headers);

    state
        .sessions
        .record_password_change(req.user_id, req.keep_session_id.as_deref())
        .await
        .map_err(AppError::from)?;

    if let Err(e) = state
        .audit
        .log_security_action(
            Some(req.user_id),
            SecurityAction::PasswordChange,
            format!("user:{}", req.user_id),
            &ip,
            &user_agent,
            true,
            None,
        )
        .await
    {
        tracing::error!(error = %e, "Failed to audit password change");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Record a security action performed outside this service.
///
/// POST /internal/audit-events (internal key)
#[utoipa::path(
    post,
    path = "/internal/audit-events",
    request_body = RecordActionRequest,
    responses(
        (status = 201, description = "Action recorded", body = RecordActionResponse),
        (status = 401, description = "Missing or invalid service key")
    ),
    security(("internal_api_key" = [])),
    tag = "Sessions"
)]
pub async fn record_security_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordActionRequest>,
) -> Result<(StatusCode, Json<RecordActionResponse>), AppError> {
    req.validate()?;
    let (ip, user_agent) = client_meta(&headers);

    let log = state
        .audit
        .log_security_action(
            req.user_id,
            req.action,
            req.resource,
            &ip,
            &user_agent,
            req.success,
            req.note.map(|message| AuditDetails::Note { message }),
        )
        .await
        .map_err(AppError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(RecordActionResponse {
            risk_level: log.risk_level,
        }),
    ))
}

/// End the current session.
///
/// POST /auth/logout (authenticated)
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Session invalidated"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Sessions"
)]
pub async fn logout(
    State(state): State<AppState>,
    context: SecurityContext,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar), AppError> {
    state
        .sessions
        .invalidate_session(&context.session_id)
        .await
        .map_err(AppError::from)?;

    if let Err(e) = state
        .audit
        .log_security_action(
            Some(context.user_id),
            SecurityAction::Logout,
            "auth:logout",
            context.audit_ip(),
            context.audit_user_agent(),
            true,
            None,
        )
        .await
    {
        tracing::error!(error = %e, "Failed to audit logout");
    }

    let jar = jar.remove(session_cookie(String::new()));
    Ok((StatusCode::NO_CONTENT, jar))
}

/// Invalidate every other session of the calling user.
///
/// POST /auth/logout-all (authenticated)
#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "Other sessions invalidated", body = LogoutAllResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Sessions"
)]
pub async fn logout_all(
    State(state): State<AppState>,
    context: SecurityContext,
) -> Result<Json<LogoutAllResponse>, AppError> {
    let invalidated = state
        .sessions
        .invalidate_all_user_sessions(context.user_id, Some(&context.session_id))
        .await
        .map_err(AppError::from)?;
    Ok(Json(LogoutAllResponse { invalidated }))
}

/// Slide the current session's expiry forward (remember-me renewal).
///
/// POST /auth/sessions/extend (authenticated)
#[utoipa::path(
    post,
    path = "/auth/sessions/extend",
    request_body = ExtendSessionRequest,
    responses(
        (status = 200, description = "Expiry extended", body = ExtendSessionResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Sessions"
)]
pub async fn extend_session(
    State(state): State<AppState>,
    context: SecurityContext,
    Json(req): Json<ExtendSessionRequest>,
) -> Result<Json<ExtendSessionResponse>, AppError> {
    req.validate()?;
    let minutes = req
        .minutes
        .unwrap_or(state.config.security.extended_session_minutes);

    let session = state
        .sessions
        .extend_session(&context.session_id, minutes)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::from(crate::services::ServiceError::SessionNotFound))?;

    Ok(Json(ExtendSessionResponse {
        expiry_utc: session.expiry_utc,
    }))
}

/// List the calling user's active sessions.
///
/// GET /auth/sessions (authenticated)
#[utoipa::path(
    get,
    path = "/auth/sessions",
    responses(
        (status = 200, description = "Active sessions", body = [SessionInfo]),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Sessions"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    context: SecurityContext,
) -> Result<Json<Vec<SessionInfo>>, AppError> {
    let sessions = state
        .sessions
        .active_sessions(context.user_id)
        .await
        .map_err(AppError::from)?;

    let infos = sessions
        .into_iter()
        .map(|s| {
            let is_current = s.session_id == context.session_id;
            let mut info = SessionInfo::from(s);
            info.is_current = is_current;
            info
        })
        .collect();
    Ok(Json(infos))
}
