//! Authenticated sealing of small payloads
//!
//! Payloads are encrypted with AES-256-GCM under a key derived from the
//! configured secret. The sealed form is `nonce || ciphertext || tag`, and an
//! associated-data label binds a sealed value to its context (for cookies,
//! the cookie name). Any modification, a different key or a different label
//! makes opening fail.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// AES-GCM nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Malformed sealed value: {0}")]
    Malformed(String),

    /// Wrong key, wrong label, or the value was modified
    #[error("Authentication of sealed value failed")]
    AuthenticationFailed,
}

/// 256-bit AES-GCM key used to seal and open payloads
pub struct SealingKey {
    cipher: Aes256Gcm,
}

impl SealingKey {
    /// Create a key from exactly 32 raw bytes
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != 32 {
            return Err(CryptoError::InvalidKey(
                "Key must be 32 bytes (256 bits)".into(),
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        Ok(Self { cipher })
    }

    /// Derive a key from an arbitrary-length secret (SHA-256)
    pub fn from_secret(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::InvalidKey("Secret must not be empty".into()));
        }

        let mut hasher = Sha256::new();
        hasher.update(secret);
        let key = hasher.finalize();
        Self::new(&key)
    }

    /// Encrypt `plaintext`, binding it to `label`
    pub fn seal(&self, plaintext: &[u8], label: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: label,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt and authenticate a value produced by [`SealingKey::seal`]
    pub fn open(&self, sealed: &[u8], label: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Malformed("value too short".into()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: label,
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    /// Seal and encode as unpadded URL-safe base64 (cookie-safe)
    pub fn seal_to_string(&self, plaintext: &[u8], label: &[u8]) -> Result<String, CryptoError> {
        self.seal(plaintext, label)
            .map(|sealed| URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Decode from URL-safe base64 and open
    pub fn open_str(&self, encoded: &str, label: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CryptoError::Malformed(format!("invalid base64: {}", e)))?;
        self.open(&sealed, label)
    }
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey(<redacted>)")
    }
}
