use service_core::error::AppError;
use thiserror::Error;

use crate::store::StoreError;
use crate::totp::TotpError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("TOTP error: {0}")]
    Totp(#[from] TotpError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::totp::crypto::CryptoError),

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("MFA is not enabled for this user")]
    MfaNotEnabled,

    #[error("MFA is already enabled for this user")]
    MfaAlreadyEnabled,

    #[error("Session not found or no longer valid")]
    SessionNotFound,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Totp(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::Crypto(e) => AppError::InternalError(anyhow::anyhow!(e)),
            ServiceError::InvalidCode => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid verification code"))
            }
            ServiceError::MfaNotEnabled => {
                AppError::BadRequest(anyhow::anyhow!("MFA is not enabled for this user"))
            }
            ServiceError::MfaAlreadyEnabled => {
                AppError::Conflict(anyhow::anyhow!("MFA is already enabled for this user"))
            }
            ServiceError::SessionNotFound => {
                AppError::Unauthorized(anyhow::anyhow!("Session not found or no longer valid"))
            }
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
        }
    }
}
