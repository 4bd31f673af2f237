//! TOTP enrollment, challenge verification and backup codes.
//!
//! Secrets are sealed at rest with [`SecretCipher`]; backup codes are stored
//! as SHA-256 digests and consumed on first use.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditDetails, MfaMethod, SecurityAction};
use crate::store::SecurityStore;
use crate::totp::{crypto::SecretCipher, Totp};

use super::{ensure_profile, AuditLogger, ServiceError};

pub const BACKUP_CODE_COUNT: usize = 10;
/// Backup codes are 8 uppercase hex characters.
const BACKUP_CODE_BYTES: usize = 4;

/// Enrollment material returned to the user exactly once.
#[derive(Debug)]
pub struct MfaEnrollment {
    pub secret_base32: String,
    pub provisioning_uri: String,
}

#[derive(Clone)]
pub struct MfaService {
    store: Arc<dyn SecurityStore>,
    audit: AuditLogger,
    totp: Totp,
    cipher: SecretCipher,
}

fn generate_backup_codes() -> Vec<String> {
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            let mut bytes = [0u8; BACKUP_CODE_BYTES];
            OsRng.fill_bytes(&mut bytes);
            hex::encode(bytes).to_ascii_uppercase()
        })
        .collect()
}

fn hash_backup_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().to_ascii_uppercase().as_bytes());
    hex::encode(hasher.finalize())
}

impl MfaService {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        audit: AuditLogger,
        totp: Totp,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            store,
            audit,
            totp,
            cipher,
        }
    }

    /// Generate a fresh secret and provisioning URI for authenticator apps.
    /// Nothing is persisted until the first code verifies via
    /// [`MfaService::enable_mfa`].
    pub fn generate_enrollment(&self, account_hint: &str) -> MfaEnrollment {
        let secret = self.totp.generate_secret();
        MfaEnrollment {
            secret_base32: Totp::encode_secret(&secret),
            provisioning_uri: self.totp.provisioning_uri(account_hint, &secret),
        }
    }

    /// Enable MFA once the user proves possession of the secret. Returns the
    /// single-use backup codes; they are only ever visible here.
    pub async fn enable_mfa(
        &self,
        user_id: Uuid,
        secret_base32: &str,
        code: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;
        if profile.mfa_enabled {
            return Err(ServiceError::MfaAlreadyEnabled);
        }

        let secret = Totp::decode_secret(secret_base32)?;
        if !Totp::verify(&secret, code) {
            return Err(ServiceError::InvalidCode);
        }

        let backup_codes = generate_backup_codes();
        profile.mfa_enabled = true;
        profile.mfa_secret = Some(self.cipher.seal(&secret, user_id)?);
        profile.backup_code_hashes = backup_codes.iter().map(|c| hash_backup_code(c)).collect();
        self.store.upsert_profile(&profile).await?;

        self.audit
            .log_security_action(
                Some(user_id),
                SecurityAction::MfaEnabled,
                format!("user:{}", user_id),
                ip_address,
                user_agent,
                true,
                None,
            )
            .await?;

        Ok(backup_codes)
    }

    /// Disable MFA; the secret and backup codes are cleared together.
    pub async fn disable_mfa(
        &self,
        user_id: Uuid,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<(), ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;
        if !profile.mfa_enabled {
            return Ok(());
        }
        profile.clear_mfa();
        self.store.upsert_profile(&profile).await?;

        self.audit
            .log_security_action(
                Some(user_id),
                SecurityAction::MfaDisabled,
                format!("user:{}", user_id),
                ip_address,
                user_agent,
                true,
                None,
            )
            .await?;
        Ok(())
    }

    /// Replace the outstanding backup codes. Requires MFA to be enabled.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<String>, ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;
        if !profile.mfa_enabled {
            return Err(ServiceError::MfaNotEnabled);
        }
        let backup_codes = generate_backup_codes();
        profile.backup_code_hashes = backup_codes.iter().map(|c| hash_backup_code(c)).collect();
        self.store.upsert_profile(&profile).await?;
        tracing::info!(user_id = %user_id, "Backup codes regenerated");
        Ok(backup_codes)
    }

    /// Verify a TOTP code against the user's sealed secret.
    pub async fn verify_totp_for_user(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<bool, ServiceError> {
        let profile = ensure_profile(self.store.as_ref(), user_id).await?;
        let Some(sealed) = profile.mfa_secret.as_deref() else {
            return Err(ServiceError::MfaNotEnabled);
        };
        let secret = self.cipher.open(sealed, user_id)?;
        Ok(Totp::verify(&secret, code))
    }

    /// Case-insensitive single-use backup code check; a matching code is
    /// removed permanently.
    pub async fn verify_backup_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<bool, ServiceError> {
        let mut profile = ensure_profile(self.store.as_ref(), user_id).await?;
        if !profile.mfa_enabled {
            return Err(ServiceError::MfaNotEnabled);
        }
        let digest = hash_backup_code(code);
        let Some(position) = profile
            .backup_code_hashes
            .iter()
            .position(|h| *h == digest)
        else {
            return Ok(false);
        };
        profile.backup_code_hashes.remove(position);
        self.store.upsert_profile(&profile).await?;
        Ok(true)
    }

    /// Full MFA challenge: TOTP first, then backup codes. Both outcomes are
    /// audited; failures surface as [`ServiceError::InvalidCode`].
    pub async fn verify_challenge(
        &self,
        user_id: Uuid,
        code: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<MfaMethod, ServiceError> {
        let method = if self.verify_totp_for_user(user_id, code).await? {
            Some(MfaMethod::Totp)
        } else if self.verify_backup_code(user_id, code).await? {
            Some(MfaMethod::BackupCode)
        } else {
            None
        };

        if let Err(e) = self
            .audit
            .log_security_action(
                Some(user_id),
                SecurityAction::Login,
                "auth:mfa-challenge",
                ip_address,
                user_agent,
                method.is_some(),
                Some(AuditDetails::MfaChallenge { method }),
            )
            .await
        {
            tracing::error!(error = %e, "Failed to audit MFA challenge");
        }

        method.ok_or(ServiceError::InvalidCode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_codes_are_uppercase_hex() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn backup_code_hash_is_case_insensitive() {
        assert_eq!(hash_backup_code("a1b2c3d4"), hash_backup_code("A1B2C3D4"));
        assert_ne!(hash_backup_code("a1b2c3d4"), hash_backup_code("a1b2c3d5"));
    }
}
