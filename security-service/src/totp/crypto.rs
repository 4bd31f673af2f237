//! At-rest sealing of TOTP secrets.
//!
//! ChaCha20-Poly1305 with the owning user id as AAD, so a sealed secret
//! cannot be replayed onto another user's row. Layout: `nonce (12 bytes) ||
//! ciphertext`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use uuid::Uuid;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_LEN} bytes hex-encoded")]
    InvalidKey,

    #[error("encryption failure")]
    Encrypt,

    #[error("decryption failure")]
    Decrypt,
}

/// Sealing key for MFA secrets.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: ChaCha20Poly1305,
}

impl SecretCipher {
    /// Build from a 64-character hex key (32 bytes).
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CryptoError> {
        let key_bytes = hex::decode(hex_key.trim()).map_err(|_| CryptoError::InvalidKey)?;
        if key_bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey);
        }
        let key = Key::from_slice(&key_bytes);
        Ok(Self {
            cipher: ChaCha20Poly1305::new(key),
        })
    }

    pub fn seal(&self, plaintext: &[u8], user_id: Uuid) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: user_id.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8], user_id: Uuid) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: user_id.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> SecretCipher {
        SecretCipher::from_hex_key(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn seal_open_round_trip() {
        let cipher = test_cipher();
        let user_id = Uuid::new_v4();
        let sealed = cipher.seal(b"super-secret", user_id).unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"super-secret");
        assert_eq!(cipher.open(&sealed, user_id).unwrap(), b"super-secret");
    }

    #[test]
    fn sealed_secret_is_bound_to_user() {
        let cipher = test_cipher();
        let sealed = cipher.seal(b"super-secret", Uuid::new_v4()).unwrap();
        assert!(cipher.open(&sealed, Uuid::new_v4()).is_err());
    }

    #[test]
    fn rejects_short_keys() {
        assert!(SecretCipher::from_hex_key("abcd").is_err());
        assert!(SecretCipher::from_hex_key("not-hex").is_err());
    }
}
