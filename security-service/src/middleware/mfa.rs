//! MFA guard: authenticated *and* MFA-verified for this session.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use service_core::error::ErrorBody;
use service_core::middleware::tracing::request_id_of;

use super::auth::{unauthorized, SecurityContext};

/// Must be layered inside [`super::auth::require_authentication`]; denies
/// with 401 until the session has passed an MFA challenge.
pub async fn require_mfa(req: Request, next: Next) -> Response {
    let request_id = request_id_of(req.headers());

    let Some(context) = req.extensions().get::<SecurityContext>() else {
        return unauthorized("Missing session credentials", request_id);
    };

    if !context.mfa_verified {
        return ErrorBody::new(
            "MFA_REQUIRED",
            "Multi-factor verification required for this session",
        )
        .with_request_id(request_id)
        .into_response_with(StatusCode::UNAUTHORIZED, None);
    }

    next.run(req).await
}
