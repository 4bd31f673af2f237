//! HTTP glue over the security services.

pub mod admin;
pub mod auth;
pub mod consent;
pub mod me;
pub mod metrics;
pub mod mfa;

use axum::http::HeaderMap;

use crate::middleware::auth::{forwarded_client_ip, user_agent_of};

/// `(ip, user_agent)` for audit attribution, with placeholders when the
/// client did not supply them.
pub(crate) fn client_meta(headers: &HeaderMap) -> (String, String) {
    (
        forwarded_client_ip(headers).unwrap_or_else(|| "unknown".to_string()),
        user_agent_of(headers).unwrap_or_else(|| "unknown".to_string()),
    )
}
