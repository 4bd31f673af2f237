//! Services layer for the security subsystem.
//!
//! Thin orchestration over the store: audit logging with risk scoring,
//! session lifecycle, RBAC resolution, MFA, consent and maintenance.

pub mod audit;
pub mod consent;
pub mod error;
pub mod maintenance;
pub mod mfa;
pub mod rbac;
pub mod session;

pub use audit::{AlertSink, AuditLogger, TracingAlertSink};
pub use consent::ConsentService;
pub use error::ServiceError;
pub use maintenance::{CleanupReport, MaintenanceService};
pub use mfa::MfaService;
pub use rbac::RbacResolver;
pub use session::SessionManager;

use crate::models::UserSecurityProfile;
use crate::store::SecurityStore;
use uuid::Uuid;

/// Load a user's security profile, creating the default one on first touch.
///
/// Profiles come into existence on the first authentication-related action
/// and are never hard-deleted afterwards.
pub(crate) async fn ensure_profile(
    store: &dyn SecurityStore,
    user_id: Uuid,
) -> Result<UserSecurityProfile, ServiceError> {
    if let Some(profile) = store.find_profile(user_id).await? {
        return Ok(profile);
    }
    let profile = UserSecurityProfile::new(user_id);
    store.upsert_profile(&profile).await?;
    Ok(profile)
}
