// src/utils/crypto.rs

use crate::error::{AppError, Result};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Encryption-at-rest for stored secrets.
pub trait SecretSealer: Send + Sync {
    fn seal(&self, plaintext: &str) -> Result<String>;
    fn unseal(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM sealer keyed by the SHA-256 digest of a passphrase.
///
/// Output is base64 of `nonce || ciphertext || tag`, with a fresh random nonce per call.
pub struct KeySealer {
    cipher: Aes256Gcm,
}

impl KeySealer {
    pub fn new(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        // A SHA-256 digest is always a valid AES-256 key length.
        let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(digest.as_slice()));
        Self { cipher }
    }
}

impl std::fmt::Debug for KeySealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySealer").finish_non_exhaustive()
    }
}

impl SecretSealer for KeySealer {
    fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::EncryptionFailure {
                message: e.to_string(),
            })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    fn unseal(&self, ciphertext: &str) -> Result<String> {
        let data = STANDARD
            .decode(ciphertext)
            .map_err(|e| AppError::DecryptionFailure {
                message: format!("invalid encoding: {e}"),
            })?;

        if data.len() < NONCE_LEN {
            return Err(AppError::DecryptionFailure {
                message: "ciphertext too short".to_string(),
            });
        }

        let (nonce, body) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| AppError::DecryptionFailure {
                message: "authentication failed".to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|e| AppError::DecryptionFailure {
            message: format!("plaintext is not UTF-8: {e}"),
        })
    }
}

/// Short, log-safe rendering of a secret.
pub fn preview_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_hides_the_middle_of_the_key() {
        let preview = preview_key("sk-1234567890abcdef");
        assert_eq!(preview, "sk-1...cdef");
        assert_eq!(preview_key("short"), "****");
    }

    #[test]
    fn sealing_twice_uses_fresh_nonces() {
        let sealer = KeySealer::new("passphrase");
        let a = sealer.seal("sk-secret").unwrap();
        let b = sealer.seal("sk-secret").unwrap();
        assert_ne!(a, b);
    }
}
