//! Internal service-key guard.
//!
//! The outer application performs primary credential verification and then
//! reports authentication outcomes to this service; those reporting routes
//! are only reachable with the shared internal key.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use service_core::error::ErrorBody;
use service_core::middleware::tracing::request_id_of;

use crate::AppState;

pub const INTERNAL_API_KEY_HEADER: &str = "x-internal-api-key";

pub async fn internal_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let presented = headers
        .get(INTERNAL_API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let expected = state.config.security.internal_api_key.as_bytes();
    if !presented.is_empty() && bool::from(presented.as_bytes().ct_eq(expected)) {
        next.run(request).await
    } else {
        tracing::warn!("Rejected internal call with missing or invalid service key");
        ErrorBody::new("UNAUTHORIZED", "Invalid or missing service key")
            .with_request_id(request_id_of(&headers))
            .into_response_with(StatusCode::UNAUTHORIZED, None)
    }
}
