//! Time-based one-time passwords (RFC 6238).
//!
//! HMAC-SHA1 over the big-endian time-step counter with dynamic truncation,
//! 6-digit zero-padded codes, 30-second steps and a ±1-step drift window.
//! Kept behind this module so the algorithm can be swapped without touching
//! callers.

pub mod crypto;

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Secret entropy in bytes.
pub const SECRET_LEN: usize = 20;

const DIGITS: u32 = 6;
const STEP_SECONDS: i64 = 30;
const SKEW_STEPS: i64 = 1;

#[derive(Debug, Error)]
pub enum TotpError {
    #[error("invalid base32 secret")]
    InvalidSecret,
}

/// TOTP generator/verifier bound to an issuer label.
#[derive(Debug, Clone)]
pub struct Totp {
    issuer: String,
}

impl Totp {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Generate a fresh shared secret from the OS CSPRNG.
    pub fn generate_secret(&self) -> Vec<u8> {
        let mut secret = vec![0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        secret
    }

    pub fn encode_secret(secret: &[u8]) -> String {
        BASE32_NOPAD.encode(secret)
    }

    pub fn decode_secret(encoded: &str) -> Result<Vec<u8>, TotpError> {
        BASE32_NOPAD
            .decode(encoded.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| TotpError::InvalidSecret)
    }

    /// Provisioning URI for standard authenticator apps.
    pub fn provisioning_uri(&self, account: &str, secret: &[u8]) -> String {
        let label = format!("{}:{}", self.issuer, account);
        format!(
            "otpauth://totp/{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
            urlencoding::encode(&label),
            Self::encode_secret(secret),
            urlencoding::encode(&self.issuer),
            DIGITS,
            STEP_SECONDS,
        )
    }

    /// The code valid at the given unix time.
    pub fn code_at(secret: &[u8], unix_time: i64) -> String {
        let counter = (unix_time / STEP_SECONDS) as u64;
        Self::hotp(secret, counter)
    }

    /// Verify a submitted code at the given unix time, accepting the current
    /// step and one step on either side.
    pub fn verify_at(secret: &[u8], submitted: &str, unix_time: i64) -> bool {
        let step = unix_time / STEP_SECONDS;
        let mut matched = false;
        for skew in -SKEW_STEPS..=SKEW_STEPS {
            let counter = step + skew;
            if counter < 0 {
                continue;
            }
            let candidate = Self::hotp(secret, counter as u64);
            matched |= bool::from(candidate.as_bytes().ct_eq(submitted.as_bytes()));
        }
        matched
    }

    /// Verify against the current wall clock.
    pub fn verify(secret: &[u8], submitted: &str) -> bool {
        Self::verify_at(secret, submitted, chrono::Utc::now().timestamp())
    }

    /// HMAC-based one-time password with dynamic truncation (RFC 4226).
    fn hotp(secret: &[u8], counter: u64) -> String {
        let mut mac =
            HmacSha1::new_from_slice(secret).expect("HMAC accepts keys of any length");
        mac.update(&counter.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let bin_code = ((digest[offset] as u32 & 0x7f) << 24)
            | ((digest[offset + 1] as u32) << 16)
            | ((digest[offset + 2] as u32) << 8)
            | (digest[offset + 3] as u32);

        format!(
            "{:0width$}",
            bin_code % 10u32.pow(DIGITS),
            width = DIGITS as usize
        )
    }
}
