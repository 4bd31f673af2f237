//! Role/permission resolution and mutation.
//!
//! Effective permissions = (role defaults ∪ explicit grants) − explicit
//! denials. Revoking a role-derived permission records a denial, so role
//! defaults can be overridden per user without demoting the role. Every
//! state-changing mutation is audited against the acting administrator,
//! never the target user.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    role_permissions, AuditDetails, Permission, Role, SecurityAction, UserSecurityProfile,
};
use crate::store::SecurityStore;

use super::{ensure_profile, AuditLogger, ServiceError};

#[derive(Clone)]
pub struct RbacResolver {
    store: Arc<dyn SecurityStore>,
    audit: AuditLogger,
}

/// Resolve the effective permission set for a profile.
pub fn effective_permissions(profile: &UserSecurityProfile) -> HashSet<Permission> {
    let mut permissions: HashSet<Permission> = role_permissions(profile.role).clone();
    permissions.extend(profile.explicit_permissions.iter().copied());
    for denied in &profile.denied_permissions {
        permissions.remove(denied);
    }
    permissions
}

impl RbacResolver {
    pub fn new(store: Arc<dyn SecurityStore>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    pub async fn resolve(
        &self,
        user_id: Uuid,
    ) -> Result<(UserSecurityProfile, HashSet<Permission>), ServiceError> {
        let profile = ensure_profile(self.store.as_ref(), user_id).await?;
        let permissions = effective_permissions(&profile);
        Ok((profile, permissions))
    }

    pub async fn has_permission(
        &self,
        user_id: Uuid,
        permission: Permission,
    ) -> Result<bool, ServiceError> {
        let (_, permissions) = self.resolve(user_id).await?;
        Ok(permissions.contains(&permission))
    }

    /// Exact role match; tiers do not satisfy each other here even though
    /// their permission sets nest.
    pub async fn has_role(&self, user_id: Uuid, role: Role) -> Result<bool, ServiceError> {
        let profile = ensure_profile(self.store.as_ref(), user_id).await?;
        Ok(profile.role == role)
    }

    /// Assign a role; a no-op assignment emits no audit entry.
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role: Role,
        actor_id: Uuid,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<(), ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;
        if profile.role == role {
            return Ok(());
        }
        let previous = profile.role;
        profile.role = role;
        self.store.upsert_profile(&profile).await?;

        self.audit
            .log_security_action(
                Some(actor_id),
                SecurityAction::RoleChange,
                format!("user:{}", user_id),
                ip_address,
                user_agent,
                true,
                Some(AuditDetails::RoleChange {
                    previous,
                    assigned: role,
                }),
            )
            .await?;
        Ok(())
    }

    /// Grant a permission. Lifts an explicit denial first; granting an
    /// already-effective permission is a no-op without an audit entry.
    pub async fn grant_permission(
        &self,
        user_id: Uuid,
        permission: Permission,
        actor_id: Uuid,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<(), ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;

        let was_denied = profile.denied_permissions.contains(&permission);
        profile.denied_permissions.retain(|p| *p != permission);

        let already_effective = effective_permissions(&profile).contains(&permission);
        if !was_denied && already_effective {
            return Ok(());
        }
        if !already_effective && !profile.explicit_permissions.contains(&permission) {
            profile.explicit_permissions.push(permission);
        }
        self.store.upsert_profile(&profile).await?;

        self.audit
            .log_security_action(
                Some(actor_id),
                SecurityAction::PermissionGrant,
                format!("user:{}", user_id),
                ip_address,
                user_agent,
                true,
                Some(AuditDetails::PermissionGrant { permission }),
            )
            .await?;
        Ok(())
    }

    /// Revoke a permission. Removes an explicit grant and, when the
    /// permission is role-derived, records a denial overriding the role
    /// default. Revoking an absent permission is a no-op.
    pub async fn revoke_permission(
        &self,
        user_id: Uuid,
        permission: Permission,
        actor_id: Uuid,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<(), ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;

        let had_explicit = profile.explicit_permissions.contains(&permission);
        profile.explicit_permissions.retain(|p| *p != permission);

        let role_derived = role_permissions(profile.role).contains(&permission);
        let already_denied = profile.denied_permissions.contains(&permission);
        let records_denial = role_derived && !already_denied;
        if records_denial {
            profile.denied_permissions.push(permission);
        }

        if !had_explicit && !records_denial {
            return Ok(());
        }
        self.store.upsert_profile(&profile).await?;

        self.audit
            .log_security_action(
                Some(actor_id),
                SecurityAction::PermissionRevoke,
                format!("user:{}", user_id),
                ip_address,
                user_agent,
                true,
                Some(AuditDetails::PermissionRevoke {
                    permission,
                    denial: records_denial,
                }),
            )
            .await?;
        Ok(())
    }
}
