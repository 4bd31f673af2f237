//! Consent guard: 451 without an active, unexpired consent record.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use service_core::error::ErrorBody;
use service_core::middleware::tracing::request_id_of;

use crate::models::ConsentPurpose;
use crate::AppState;

use super::auth::{internal_error, unauthorized, SecurityContext};

/// Middleware to require active consent for a processing purpose.
///
/// Expired or revoked consent reads as absence and denies the same way.
pub async fn require_consent(
    State((state, purpose)): State<(AppState, ConsentPurpose)>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = request_id_of(req.headers());

    let Some(context) = req.extensions().get::<SecurityContext>() else {
        return unauthorized("Missing session credentials", request_id);
    };

    let consent = match state.consent.active_consent(context.user_id, purpose).await {
        Ok(consent) => consent,
        Err(e) => {
            tracing::error!(error = %e, "Consent lookup failed");
            return internal_error(request_id);
        }
    };

    if consent.is_none() {
        return ErrorBody::new(
            "CONSENT_REQUIRED",
            format!("Active consent required for purpose '{}'", purpose),
        )
        .with_details(serde_json::json!({ "purpose": purpose.as_str() }))
        .with_request_id(request_id)
        .into_response_with(StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS, None);
    }

    next.run(req).await
}
