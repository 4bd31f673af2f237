//! Authentication guard and the per-request security context.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::collections::HashSet;
use std::net::SocketAddr;
use uuid::Uuid;

use service_core::error::ErrorBody;
use service_core::middleware::tracing::request_id_of;

use crate::models::{Permission, Role};
use crate::AppState;

/// Cookie carrying the session identifier.
pub const SESSION_COOKIE: &str = "session_id";

/// Resolved security state for one request, attached as a request extension
/// by [`require_authentication`].
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub user_id: Uuid,
    pub session_id: String,
    pub role: Role,
    pub permissions: HashSet<Permission>,
    pub mfa_verified: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

impl SecurityContext {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Exact role match, not hierarchical.
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    /// IP for audit entries; falls back to a placeholder so denials are
    /// still recorded when the client address is unknown.
    pub fn audit_ip(&self) -> String {
        self.ip_address.clone().unwrap_or_else(|| "unknown".into())
    }

    pub fn audit_user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| "unknown".into())
    }
}

/// Leftmost `x-forwarded-for` entry, if any.
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Client IP: leftmost `x-forwarded-for` entry, else the socket address.
pub fn client_ip(req: &Request) -> Option<String> {
    forwarded_client_ip(req.headers()).or_else(|| {
        req.extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|axum::extract::ConnectInfo(addr)| addr.ip().to_string())
    })
}

pub fn user_agent_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Session token from the session cookie or a bearer Authorization header.
fn session_token(req: &Request) -> Option<String> {
    let jar = CookieJar::from_headers(req.headers());
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

pub(crate) fn unauthorized(message: &str, request_id: Option<String>) -> Response {
    ErrorBody::new("UNAUTHORIZED", message)
        .with_request_id(request_id)
        .into_response_with(StatusCode::UNAUTHORIZED, None)
}

pub(crate) fn internal_error(request_id: Option<String>) -> Response {
    ErrorBody::new("INTERNAL", "Internal server error")
        .with_request_id(request_id)
        .into_response_with(StatusCode::INTERNAL_SERVER_ERROR, None)
}

/// Middleware to require an authenticated session.
///
/// Validates the session (invalidating it on an IP mismatch), resolves the
/// user's role and effective permissions, and attaches a [`SecurityContext`]
/// for downstream guards and handlers. Denies with 401 otherwise.
pub async fn require_authentication(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let request_id = request_id_of(req.headers());

    let Some(token) = session_token(&req) else {
        return unauthorized("Missing session credentials", request_id);
    };

    let presented_ip = client_ip(&req);
    let session = match state
        .sessions
        .validate_session(&token, presented_ip.as_deref())
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Session validation failed");
            return internal_error(request_id);
        }
    };
    let Some(session) = session else {
        return unauthorized("Invalid or expired session", request_id);
    };

    let (profile, permissions) = match state.rbac.resolve(session.user_id).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(error = %e, "Permission resolution failed");
            return internal_error(request_id);
        }
    };

    let context = SecurityContext {
        user_id: session.user_id,
        session_id: session.session_id.clone(),
        role: profile.role,
        permissions,
        mfa_verified: session.mfa_verified,
        ip_address: presented_ip,
        user_agent: user_agent_of(req.headers()),
        request_id,
    };
    req.extensions_mut().insert(context);

    next.run(req).await
}

/// Extractor to easily get the security context in handlers.
#[axum::async_trait]
impl<S> FromRequestParts<S> for SecurityContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<SecurityContext>().cloned().ok_or_else(|| {
            internal_error(request_id_of(&parts.headers))
        })
    }
}
