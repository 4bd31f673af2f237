//! Permission and role guards.
//!
//! 401 when unauthenticated, 403 when authenticated but lacking the
//! capability; every denial is durably audited as an unauthorized-access
//! action. A failed audit write never turns a denial into a pass.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use service_core::error::ErrorBody;
use service_core::middleware::tracing::request_id_of;

use crate::models::{AuditDetails, Permission, Role, SecurityAction};
use crate::AppState;

use super::auth::{unauthorized, SecurityContext};

fn forbidden(message: &str, request_id: Option<String>) -> Response {
    ErrorBody::new("FORBIDDEN", message)
        .with_request_id(request_id)
        .into_response_with(StatusCode::FORBIDDEN, None)
}

async fn audit_denial(state: &AppState, context: &SecurityContext, path: &str, required: String) {
    if let Err(e) = state
        .audit
        .log_security_action(
            Some(context.user_id),
            SecurityAction::UnauthorizedAccess,
            path,
            context.audit_ip(),
            context.audit_user_agent(),
            false,
            Some(AuditDetails::AccessDenied { required }),
        )
        .await
    {
        tracing::error!(error = %e, "Failed to audit authorization denial");
    }
}

/// Middleware to require an effective permission.
pub async fn require_permission(
    State((state, permission)): State<(AppState, Permission)>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = request_id_of(req.headers());

    let Some(context) = req.extensions().get::<SecurityContext>().cloned() else {
        return unauthorized("Missing session credentials", request_id);
    };

    if context.has_permission(permission) {
        return next.run(req).await;
    }

    let path = req.uri().path().to_string();
    audit_denial(
        &state,
        &context,
        &path,
        format!("permission:{}", permission),
    )
    .await;

    forbidden(
        &format!("Missing required permission '{}'", permission),
        request_id,
    )
}

/// Middleware to require an exact role.
pub async fn require_role(
    State((state, role)): State<(AppState, Role)>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = request_id_of(req.headers());

    let Some(context) = req.extensions().get::<SecurityContext>().cloned() else {
        return unauthorized("Missing session credentials", request_id);
    };

    if context.has_role(role) {
        return next.run(req).await;
    }

    let path = req.uri().path().to_string();
    audit_denial(&state, &context, &path, format!("role:{}", role)).await;

    forbidden(&format!("Missing required role '{}'", role), request_id)
}
