//! Request guards composing the security services.
//!
//! Each guard short-circuits to a structured denial response and otherwise
//! forwards, attaching what downstream needs via request extensions.

pub mod auth;
pub mod authz;
pub mod consent;
pub mod internal;
pub mod mfa;
pub mod rate_limit;

pub use auth::{require_authentication, SecurityContext, SESSION_COOKIE};
pub use authz::{require_permission, require_role};
pub use consent::require_consent;
pub use internal::internal_auth_middleware;
pub use mfa::require_mfa;
pub use rate_limit::{rate_limit_middleware, RateLimiters, WindowRateLimiter};
